use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::watch;

use splitbot_cache::cache::TtlPolicy;
use splitbot_cache::clock::{Clock, SystemClock};
use splitbot_cache::cost::{ComplexityScorer, CostOptimizer, OptimizationRequest, UserTier};
use splitbot_cache::retention::DataCategory;
use splitbot_cache::telemetry::init_tracing;
use splitbot_cache::{AssistantCore, CoreConfig};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "splitbot-cache")]
#[command(about = "Operator tools for the assistant's cache and retention core")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one expiry reconciliation sweep against the configured backend
    Reconcile,

    /// Run the reconciler periodically until Ctrl-C
    Watch,

    /// Score the complexity of a request text
    Score {
        /// Request text
        text: String,
    },

    /// Show the TTL a response would get right now
    Ttl {
        /// Model id
        #[arg(short, long)]
        model: String,

        /// Response size in tokens
        #[arg(short, long, default_value = "0")]
        tokens: u32,

        /// Region code (defaults to the configured region)
        #[arg(short, long)]
        region: Option<String>,
    },

    /// Show the cost optimizer's advice for a request
    Optimize {
        /// Request text
        #[arg(long)]
        text: String,

        /// Spend so far today
        #[arg(long)]
        usage: f64,

        /// Daily budget
        #[arg(long)]
        budget: f64,

        /// Treat the user as free tier
        #[arg(long)]
        free: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("splitbot_cache=info");

    let cli = Cli::parse();
    let config = CoreConfig::from_env()?;

    match cli.command {
        Commands::Reconcile => {
            let core = AssistantCore::from_config(config).await?;
            let report = core.reconcile().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Watch => {
            let core = AssistantCore::from_config(config).await?;
            let (tx, rx) = watch::channel(false);
            let handle = core.spawn_reconciler(rx);
            println!(
                "Reconciling every {:?}, press Ctrl-C to stop",
                core.config().reconcile_interval
            );
            tokio::signal::ctrl_c().await?;
            tx.send(true)?;
            handle.await?;
            println!("{}", core.metrics());
        }

        Commands::Score { text } => {
            let scorer = ComplexityScorer::default();
            println!("Score: {}", scorer.score(&text));
            println!("Signals: {:?}", scorer.signals(&text));
        }

        Commands::Ttl {
            model,
            tokens,
            region,
        } => {
            let region = region.unwrap_or_else(|| config.cache.default_region.clone());
            let zones = config.cache.zones().map_err(anyhow::Error::msg)?;
            let now_local = SystemClock.now_in(zones.zone_for(&region));
            let policy = TtlPolicy::from_config(&config.cache);
            let decision = policy.decide(&model, tokens, &now_local);

            println!("Region: {} ({})", region, now_local.format("%Y-%m-%d %H:%M %Z"));
            match policy.classifier().active_window(&now_local) {
                Some(window) => println!("Peak window: {}", window.name),
                None => println!("Peak window: none"),
            }
            println!("Model tier: {:?}", policy.models().tier_of(&model));
            println!("TTL: {}s (rule: {})", decision.ttl_seconds, decision.rule);
        }

        Commands::Optimize {
            text,
            usage,
            budget,
            free,
        } => {
            let policy = config.retention_policy()?;
            let optimizer = CostOptimizer::new(
                ComplexityScorer::default(),
                config.optimizer.clone(),
                Arc::new(SystemClock),
                policy.max_age(DataCategory::Analytics),
            );
            let decision = optimizer.optimize(&OptimizationRequest {
                user_id: "cli".to_string(),
                text,
                daily_usage: usage,
                daily_budget: budget,
                tier: if free { UserTier::Free } else { UserTier::Premium },
            });
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
    }

    Ok(())
}
