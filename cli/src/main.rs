//! Guard staging CLI - operator commands for the annotation workflow

mod client;
mod messages;

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::client::StagingClient;

#[derive(Parser)]
#[command(name = "guard-staging")]
#[command(about = "Operator CLI for the guard staging server")]
#[command(version)]
struct Cli {
    /// Server URL
    #[arg(short, long, env = "GUARD_STAGING_URL", default_value = "http://localhost:3000")]
    server: String,

    /// Identity forwarded as x-guard-user
    #[arg(short, long, env = "GUARD_STAGING_USER", default_value = "ops")]
    user: String,

    /// Role forwarded as x-guard-role
    #[arg(short, long, env = "GUARD_STAGING_ROLE", default_value = "system_admin")]
    role: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TaskType {
    Keywords,
    Rules,
}

impl TaskType {
    fn as_str(&self) -> &'static str {
        match self {
            TaskType::Keywords => "keywords",
            TaskType::Rules => "rules",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Claim a batch of pending proposals
    Claim {
        #[arg(short, long, value_enum)]
        task_type: TaskType,

        /// Batch size (server caps it)
        #[arg(short, long)]
        batch_size: Option<u32>,
    },

    /// Return expired claims to the pending pool
    ReleaseExpired {
        /// Keep sweeping every SECS seconds
        #[arg(long, value_name = "SECS")]
        every: Option<u64>,
    },

    /// Status breakdown for one task type
    Overview {
        #[arg(short, long, value_enum)]
        task_type: TaskType,
    },

    /// Progress of the current user's batch
    MyStats {
        #[arg(short, long, value_enum)]
        task_type: TaskType,
    },

    /// Per-annotator decision counts
    Annotators {
        #[arg(short, long, value_enum)]
        task_type: TaskType,
    },

    /// List proposals
    List {
        #[arg(short, long, value_enum)]
        task_type: TaskType,

        /// Filter by status (PENDING, CLAIMED, REVIEWED, IGNORED, SYNCED)
        #[arg(long)]
        status: Option<String>,

        /// Only proposals claimed by the current user
        #[arg(long)]
        mine: bool,

        #[arg(short, long, default_value_t = 50)]
        limit: i64,
    },

    /// Promote every reviewed proposal into production
    SyncAll {
        #[arg(short, long, value_enum)]
        task_type: TaskType,

        /// Scenario to sync into (global when omitted)
        #[arg(long)]
        scenario: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "guard_staging_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let client = StagingClient::new(&cli.server, &cli.user, &cli.role)?;

    match cli.command {
        Commands::Claim {
            task_type,
            batch_size,
        } => run_claim(&client, task_type, batch_size).await,
        Commands::ReleaseExpired { every } => run_release(&client, every).await,
        Commands::Overview { task_type } => run_overview(&client, task_type).await,
        Commands::MyStats { task_type } => run_my_stats(&client, task_type).await,
        Commands::Annotators { task_type } => run_annotators(&client, task_type).await,
        Commands::List {
            task_type,
            status,
            mine,
            limit,
        } => run_list(&client, task_type, status.as_deref(), mine, limit).await,
        Commands::SyncAll {
            task_type,
            scenario,
        } => run_sync_all(&client, task_type, scenario.as_deref()).await,
    }
}

async fn run_claim(
    client: &StagingClient,
    task_type: TaskType,
    batch_size: Option<u32>,
) -> Result<()> {
    let outcome = client.claim(task_type.as_str(), batch_size).await?;

    if outcome.claimed_count == 0 {
        println!("Nothing to claim.");
        return Ok(());
    }

    println!(
        "Claimed {} {} in batch {} (expires {}, {} min lease)",
        outcome.claimed_count,
        task_type.as_str(),
        outcome.batch_id,
        outcome.expires_at.format("%Y-%m-%d %H:%M:%S"),
        outcome.timeout_minutes
    );
    for id in outcome.claimed_ids {
        println!("  {}", id);
    }
    Ok(())
}

async fn run_release(client: &StagingClient, every: Option<u64>) -> Result<()> {
    let Some(secs) = every else {
        let outcome = client.release_expired().await?;
        println!(
            "Released {} keywords, {} rules",
            outcome.released_keywords, outcome.released_rules
        );
        return Ok(());
    };

    tracing::info!("Sweeping expired claims every {}s", secs);
    let mut interval = tokio::time::interval(Duration::from_secs(secs.max(1)));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                match client.release_expired().await {
                    Ok(outcome) if outcome.released_keywords + outcome.released_rules > 0 => {
                        tracing::info!(
                            keywords = outcome.released_keywords,
                            rules = outcome.released_rules,
                            "released expired claims"
                        );
                    }
                    Ok(_) => tracing::debug!("no expired claims"),
                    Err(e) => tracing::warn!("sweep failed: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Stopping sweep");
                return Ok(());
            }
        }
    }
}

async fn run_overview(client: &StagingClient, task_type: TaskType) -> Result<()> {
    let overview = client.overview(task_type.as_str()).await?;

    println!("{} overview", task_type.as_str());
    println!("{:─<40}", "");
    println!("  pending   {:>8}", overview.pending_count);
    println!("  claimed   {:>8}", overview.claimed_count);
    println!("  reviewed  {:>8}", overview.reviewed_count);
    println!("  ignored   {:>8}", overview.ignored_count);
    println!("  synced    {:>8}", overview.synced_count);
    println!("  total     {:>8}", overview.total_count);
    Ok(())
}

async fn run_my_stats(client: &StagingClient, task_type: TaskType) -> Result<()> {
    let stats = client.my_stats(task_type.as_str()).await?;

    println!(
        "claimed {}, reviewed {}, ignored {}",
        stats.claimed_count, stats.reviewed_count, stats.ignored_count
    );
    match (stats.expires_at, stats.remaining_seconds) {
        (Some(expires_at), Some(remaining)) => println!(
            "batch expires {} ({}m {}s left)",
            expires_at.format("%Y-%m-%d %H:%M:%S"),
            remaining / 60,
            remaining % 60
        ),
        _ => println!("no active batch"),
    }
    Ok(())
}

async fn run_annotators(client: &StagingClient, task_type: TaskType) -> Result<()> {
    let stats = client.annotators(task_type.as_str()).await?;

    if stats.is_empty() {
        println!("No annotations yet.");
        return Ok(());
    }

    println!("{:<24} {:>9} {:>9} {:>9}", "annotator", "reviewed", "ignored", "total");
    println!("{:─<54}", "");
    for stat in stats {
        println!(
            "{:<24} {:>9} {:>9} {:>9}",
            stat.annotator, stat.reviewed_count, stat.ignored_count, stat.total_count
        );
    }
    Ok(())
}

async fn run_list(
    client: &StagingClient,
    task_type: TaskType,
    status: Option<&str>,
    mine: bool,
    limit: i64,
) -> Result<()> {
    let proposals = client.list(task_type.as_str(), status, mine, limit).await?;

    if proposals.is_empty() {
        println!("No proposals found.");
        return Ok(());
    }

    for proposal in proposals {
        println!(
            "  {} {:<9} {:<32} {}",
            proposal.id,
            proposal.status,
            proposal.subject(),
            proposal
                .claimed_by
                .as_deref()
                .or(proposal.annotator.as_deref())
                .unwrap_or("")
        );
    }
    Ok(())
}

async fn run_sync_all(
    client: &StagingClient,
    task_type: TaskType,
    scenario: Option<&str>,
) -> Result<()> {
    let outcome = client.sync_all(task_type.as_str(), scenario).await?;
    println!(
        "Synced {}, skipped {}, failed {}",
        outcome.synced_count, outcome.skipped_count, outcome.failed_count
    );
    if outcome.failed_count > 0 {
        anyhow::bail!("{} proposals failed to sync", outcome.failed_count);
    }
    Ok(())
}
