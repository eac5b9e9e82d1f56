//! CLI module for the split engine
//!
//! Administrative subcommands run against the configured backing store:
//! - `experiments`: list persisted experiments with their counters
//! - `declare`: persist every configured experiment
//! - `winner` / `clear-winner`: force or release a winning alternative
//! - `reset` / `delete`: wipe counters or remove an experiment
//! - `assign` / `complete`: drive one visitor through an experiment

pub mod admin;
pub mod visitor;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::debug;

use crate::config::AppConfig;
use crate::infrastructure::logging;
use crate::infrastructure::observability::register_default_metrics;
use crate::infrastructure::services::{Registry, SplitService};
use crate::infrastructure::store::StoreFactory;

/// Split - A/B testing engine administration
#[derive(Parser)]
#[command(name = "split-engine")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List persisted experiments
    Experiments,

    /// Persist every configured experiment
    Declare,

    /// Force an alternative as the winner
    Winner(admin::WinnerArgs),

    /// Release the winner of an experiment
    ClearWinner(admin::ExperimentArgs),

    /// Reset the counters of an experiment
    Reset(admin::ExperimentArgs),

    /// Remove an experiment and its counters
    Delete(admin::ExperimentArgs),

    /// Assign a visitor to an alternative
    Assign(visitor::AssignArgs),

    /// Complete an experiment or metric for a visitor
    Complete(visitor::CompleteArgs),
}

/// Run a parsed command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().unwrap_or_default();
    logging::init_logging(&config.logging);
    register_default_metrics();

    let service = build_service(&config).await?;

    match cli.command {
        Command::Experiments => admin::list(&service).await,
        Command::Declare => admin::declare(&service).await,
        Command::Winner(args) => admin::set_winner(&service, args).await,
        Command::ClearWinner(args) => admin::clear_winner(&service, args).await,
        Command::Reset(args) => admin::reset(&service, args).await,
        Command::Delete(args) => admin::delete(&service, args).await,
        Command::Assign(args) => visitor::assign(&service, args).await,
        Command::Complete(args) => visitor::complete(&service, args).await,
    }
}

/// Wire the store, registry and service from configuration
pub async fn build_service(config: &AppConfig) -> anyhow::Result<SplitService> {
    let store = StoreFactory::create(&config.store).await?;

    let registry = Registry::new(store)
        .with_settings(config.split.settings())
        .with_exclusion_rules(config.split.exclusion_rules()?);

    if !config.split.experiments.is_null() {
        registry.declare_experiments(&config.split.experiments)?;
    }

    debug!(backend = %config.store.backend, "Split service ready");
    Ok(SplitService::new(Arc::new(registry)))
}
