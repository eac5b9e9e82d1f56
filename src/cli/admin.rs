//! Administrative commands

use clap::Args;

use crate::infrastructure::services::SplitService;

#[derive(Args, Clone)]
pub struct ExperimentArgs {
    /// Experiment name
    pub name: String,
}

#[derive(Args, Clone)]
pub struct WinnerArgs {
    /// Experiment name
    pub name: String,

    /// Alternative to force for every visitor
    pub alternative: String,
}

pub async fn list(service: &SplitService) -> anyhow::Result<()> {
    let experiments = service.experiments();

    for experiment in experiments.all().await? {
        let started = experiments
            .start_time(experiment.name())
            .await?
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        let winner = experiments
            .winner(&experiment)?
            .map(|w| w.name().to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{} (version {}, started {}, winner {})",
            experiment.key(),
            experiment.version(),
            started,
            winner
        );

        for alternative in experiment.alternatives() {
            println!(
                "  {:<20} weight {:.3}  participants {:>6}  completed {:>6}  rate {:.2}%",
                alternative.name(),
                alternative.weight(),
                alternative.participant_count(),
                alternative.completed_count(None),
                alternative.conversion_rate(None) * 100.0
            );

            for (goal, count) in alternative.goal_completions() {
                println!("    goal {:<15} completed {:>6}", goal, count);
            }
        }
    }

    Ok(())
}

pub async fn declare(service: &SplitService) -> anyhow::Result<()> {
    for experiment in service.declare().await? {
        println!("{}", experiment.key());
    }
    Ok(())
}

pub async fn set_winner(service: &SplitService, args: WinnerArgs) -> anyhow::Result<()> {
    let experiment = service.set_winner(&args.name, &args.alternative).await?;
    println!("{} winner: {}", experiment.key(), args.alternative);
    Ok(())
}

pub async fn clear_winner(service: &SplitService, args: ExperimentArgs) -> anyhow::Result<()> {
    let experiment = service.clear_winner(&args.name).await?;
    println!("{} winner cleared", experiment.key());
    Ok(())
}

pub async fn reset(service: &SplitService, args: ExperimentArgs) -> anyhow::Result<()> {
    let experiment = service.reset(&args.name).await?;
    println!("{} reset", experiment.key());
    Ok(())
}

pub async fn delete(service: &SplitService, args: ExperimentArgs) -> anyhow::Result<()> {
    let experiment = service.delete(&args.name).await?;
    println!("{} deleted", experiment.name());
    Ok(())
}
