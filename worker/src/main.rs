//! Sarafi worker binary.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sarafi_fx::{CachedRateProvider, PgRateProvider};
use sarafi_transactions::{PgTransactionStore, TransactionService};
use sarafi_worker::{init_tracing, RecomputeLoop, WorkerConfig};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "sarafi-worker")]
#[command(about = "Recalculates profit for pending exchange transactions")]
struct Args {
    /// Run a single pass and exit
    #[arg(long)]
    once: bool,

    /// Seconds between passes (overrides SARAFI_RECOMPUTE_INTERVAL_SECS)
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Transactions examined per pass (overrides SARAFI_RECOMPUTE_BATCH_SIZE)
    #[arg(long)]
    batch_size: Option<usize>,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = WorkerConfig::from_env();
    if let Some(secs) = args.interval_secs {
        config.recompute_interval = std::time::Duration::from_secs(secs);
    }
    if let Some(size) = args.batch_size {
        config.recompute_batch_size = size;
    }
    if let Some(url) = args.database_url {
        config.database_url = url;
    }

    init_tracing(config.log_format)?;

    info!("Starting Sarafi worker");

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Invalid configuration: {}", e));
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("connecting to database")?;

    let ttl = chrono::Duration::from_std(config.rate_cache_ttl).context("rate cache TTL out of range")?;
    let rates = Arc::new(CachedRateProvider::new(Arc::new(PgRateProvider::new(pool.clone())), ttl));
    let service = Arc::new(TransactionService::new(
        Arc::new(PgTransactionStore::new(pool)),
        rates.clone(),
    ));

    let recompute = RecomputeLoop::new(
        service,
        config.recompute_interval,
        config.recompute_batch_size,
    )
    .with_rate_cache(rates);

    if args.once {
        let report = recompute.run_once().await?;
        info!(
            examined = report.examined,
            calculated = report.calculated,
            still_pending = report.still_pending,
            "Single pass complete"
        );
        return Ok(());
    }

    info!(
        interval_secs = config.recompute_interval.as_secs(),
        batch_size = config.recompute_batch_size,
        "Recompute loop started"
    );

    recompute
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
        })
        .await;

    info!("Worker stopped");
    Ok(())
}
