use anyhow::Result;
use serde_json::json;
use slot_throttler::config::Config;
use slot_throttler::jobs::{run_batch, JobBatch, JobStatus};
use slot_throttler::Throttler;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("slot_throttler={}", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let throttler_config = config
        .throttler_config()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    let throttler = Throttler::new(throttler_config);

    let batch = match &config.jobs {
        Some(path) => JobBatch::from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load jobs from {}: {}", path.display(), e))?,
        None => JobBatch::generate(config.count, config.work, config.fail_every),
    };

    tracing::info!(
        "Running {} jobs with slot_count={}, slot_cooldown={:?}",
        batch.jobs.len(),
        throttler.slot_count(),
        throttler.slot_cooldown()
    );

    let reports = run_batch(&throttler, batch.jobs).await;
    let metrics = throttler.metrics();

    let failed = reports
        .iter()
        .filter(|report| report.status != JobStatus::Succeeded)
        .count();
    tracing::info!(
        "Finished: {} succeeded, {} failed or rejected, {} grants after cooldown, {} queued",
        reports.len() - failed,
        failed,
        metrics.cooldown_waits,
        metrics.queued_waits
    );

    let output = json!({
        "config": throttler.config(),
        "reports": reports,
        "metrics": metrics,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
