use chrono::Local;
use cinelink_core::logging::init_logging;
use cinelink_core::{CoreConfig, Services, Shutdown};

/// Scheduled entry point
///
/// Processes each ultrasound date from today back over the profile's look-back window, newest
/// first. A date that fails is logged and skipped; Ctrl-C stops the run after the current step.
///
/// # Environment Variables
/// - `REGISTRY_URL`, `REGISTRY_USERNAME`, `REGISTRY_PASSWORD`: registry API and credentials
/// - `IMAGING_URL`, `IMAGING_USERNAME`, `IMAGING_PASSWORD`: imaging archive and credentials
/// - `CINELINK_PROFILE`: program profile (default: "config/profile.yaml")
/// - `CINELINK_SCRATCH_DIR`: where frames and videos are written (default: ".")
/// - `CINELINK_LOG_DIR`: enables a per-day log file in this directory
///
/// # Returns
/// * `Ok(())` - If the run completed or was cancelled
/// * `Err(anyhow::Error)` - If configuration or startup fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = CoreConfig::from_lookup(|key| std::env::var(key).ok())?;
    let today = Local::now().date_naive();
    if let Some(path) = init_logging(config.log_dir(), config.registry_name().as_str(), today)? {
        tracing::info!(log_file = %path.display(), "logging to file");
    }

    let services = Services::from_config(&config)?;
    let profile = config.profile();
    tracing::info!(
        from = %today,
        days = profile.lookback_days,
        scratch = %services.scratch.root().display(),
        "++ Starting cinelink run"
    );

    let orchestrator = services.orchestrator(profile, Shutdown::on_ctrl_c());
    let summary = orchestrator.run_lookback(today, profile.lookback_days).await;

    let attached: usize = summary.reports.iter().map(|r| r.videos_attached).sum();
    tracing::info!(
        dates = summary.reports.len(),
        failed = summary.failed_dates.len(),
        attached,
        cancelled = summary.cancelled,
        "-- Finished cinelink run"
    );
    tracing::debug!(summary = %serde_json::to_string(&summary)?, "run summary");

    Ok(())
}
