//! Visitor commands, using the backing store as the visitor store

use std::collections::HashMap;
use std::sync::Arc;

use clap::Args;

use crate::domain::experiment::{DeclaredAlternative, ExperimentDescriptor};
use crate::domain::visitor::RequestContext;
use crate::infrastructure::exclusion::RequestExclusion;
use crate::infrastructure::services::{CompleteOptions, SplitService};
use crate::infrastructure::visitor::RedisVisitorStore;

#[derive(Args, Clone)]
pub struct VisitorArgs {
    /// Visitor identifier
    #[arg(long)]
    pub visitor: String,

    /// Request user agent, checked against the bot table
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Request address, checked against the ignored addresses
    #[arg(long)]
    pub ip: Option<String>,
}

#[derive(Args, Clone)]
pub struct AssignArgs {
    /// Experiment name
    pub name: String,

    /// Alternatives, control first; empty uses the configured experiment
    pub alternatives: Vec<String>,

    #[command(flatten)]
    pub visitor: VisitorArgs,

    /// Force an alternative, as `experiment=alternative`
    #[arg(long = "override", value_parser = parse_override)]
    pub overrides: Vec<(String, String)>,
}

#[derive(Args, Clone)]
pub struct CompleteArgs {
    /// Experiment or metric name
    pub name: String,

    /// Goals to count
    #[arg(long = "goal")]
    pub goals: Vec<String>,

    #[command(flatten)]
    pub visitor: VisitorArgs,

    /// Mark the visitor finished instead of forgetting the assignment
    #[arg(long)]
    pub keep: bool,
}

fn parse_override(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, alternative)| (name.to_string(), alternative.to_string()))
        .ok_or_else(|| format!("expected experiment=alternative, got '{}'", raw))
}

fn exclusion(service: &SplitService, args: &VisitorArgs) -> RequestExclusion {
    let mut exclusion = RequestExclusion::new(service.registry().exclusion_rules());

    if let Some(user_agent) = &args.user_agent {
        exclusion = exclusion.with_user_agent(user_agent);
    }
    if let Some(ip) = &args.ip {
        exclusion = exclusion.with_ip(ip);
    }

    exclusion
}

pub async fn assign(service: &SplitService, args: AssignArgs) -> anyhow::Result<()> {
    let store = Arc::clone(service.registry().repository().store());
    let visitor = RedisVisitorStore::new(store, &args.visitor.visitor);
    let exclusion = exclusion(service, &args.visitor);
    let overrides: HashMap<String, String> = args.overrides.into_iter().collect();
    let override_for = |name: &str| overrides.get(name).cloned();

    let ctx = RequestContext::new(&visitor)
        .with_overrides(&override_for)
        .with_exclusion(&exclusion);

    let mut alternatives = args
        .alternatives
        .iter()
        .map(|name| DeclaredAlternative::named(name.as_str()));
    let control = alternatives.next();

    let chosen = service
        .assign(args.name.as_str(), control, alternatives.collect(), &ctx)
        .await?;

    println!("{}", chosen);
    Ok(())
}

pub async fn complete(service: &SplitService, args: CompleteArgs) -> anyhow::Result<()> {
    let store = Arc::clone(service.registry().repository().store());
    let visitor = RedisVisitorStore::new(store, &args.visitor.visitor);
    let exclusion = exclusion(service, &args.visitor);
    let ctx = RequestContext::new(&visitor).with_exclusion(&exclusion);

    let options = if args.keep {
        CompleteOptions::without_reset()
    } else {
        CompleteOptions::default()
    };

    service
        .complete(
            ExperimentDescriptor::new(&args.name).with_goals(args.goals),
            options,
            &ctx,
        )
        .await?;

    Ok(())
}
