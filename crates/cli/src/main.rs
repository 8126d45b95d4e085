use anyhow::Context;
use chrono::{Local, NaiveDate};
use cinelink_core::constants::{DEFAULT_PROFILE_PATH, ENV_PROFILE};
use cinelink_core::logging::init_logging;
use cinelink_core::{CoreConfig, ProgramProfile, Services, Shutdown};
use cinelink_types::ArchiveId;
use clap::{Parser, Subcommand};
use registry::FileResourceHandle;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cinelink")]
#[command(about = "Attach archived ultrasound clips to registry encounters")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Process the encounters of one ultrasound date
    Run {
        /// Ultrasound date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
    },
    /// Process several dates, newest first
    Backfill {
        /// Number of dates to process (defaults to the profile's lookback)
        #[arg(long)]
        days: Option<u32>,
        /// Newest date to process (defaults to today)
        #[arg(long)]
        from: Option<NaiveDate>,
    },
    /// Show the storage status of an uploaded file resource
    Status {
        /// File resource id
        file_resource: String,
    },
    /// Show the frame count of an archive instance
    Frames {
        /// Instance id
        instance: String,
    },
    /// Validate a program profile without contacting any server
    CheckProfile {
        /// Profile path (defaults to $CINELINK_PROFILE or config/profile.yaml)
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("Use 'cinelink --help' for commands");
        return Ok(());
    };

    if let Commands::CheckProfile { path } = &command {
        return check_profile(path.clone());
    }

    let config = CoreConfig::from_lookup(|key| std::env::var(key).ok())
        .context("failed to resolve configuration")?;
    let today = Local::now().date_naive();
    if let Some(path) = init_logging(config.log_dir(), config.registry_name().as_str(), today)? {
        tracing::info!(log_file = %path.display(), "logging to file");
    }
    let services = Services::from_config(&config)?;

    match command {
        Commands::Run { date } => {
            let orchestrator = services.orchestrator(config.profile(), Shutdown::on_ctrl_c());
            let report = orchestrator.run_date(date).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Backfill { days, from } => {
            let days = days.unwrap_or(config.profile().lookback_days);
            let from = from.unwrap_or(today);
            let orchestrator = services.orchestrator(config.profile(), Shutdown::on_ctrl_c());
            let summary = orchestrator.run_lookback(from, days).await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Status { file_resource } => {
            let handle = FileResourceHandle::new(file_resource);
            let status = services.registry.storage_status(&handle).await?;
            println!("{handle}: {status}");
        }
        Commands::Frames { instance } => {
            let instance = ArchiveId::parse(&instance)
                .with_context(|| format!("invalid instance id '{instance}'"))?;
            let frames = services.imaging.frame_count(&instance).await?;
            let minimum = config.profile().media.min_frames;
            let verdict = if frames >= minimum { "ok" } else { "below minimum" };
            println!("{instance}: {frames} frames ({verdict}, minimum {minimum})");
        }
        Commands::CheckProfile { .. } => {}
    }

    Ok(())
}

fn check_profile(path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(|| {
        std::env::var(ENV_PROFILE)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_PROFILE_PATH))
    });
    let profile = ProgramProfile::load(&path)?;

    println!("Profile {} is valid", path.display());
    println!(
        "  program {} / stage {} / org unit {}",
        profile.scope.program, profile.scope.program_stage, profile.scope.org_unit
    );
    for classification in profile.slots.classifications() {
        let slots = profile.slots.expected_videos(classification).unwrap_or(0);
        println!("  pathology {classification}: {slots} video slot(s)");
    }
    println!(
        "  min frames {}, {} fps, codec {}, poll every {:?} up to {} times, lookback {} days",
        profile.media.min_frames,
        profile.media.frame_rate,
        profile.media.codec,
        profile.upload.poll_interval,
        profile.upload.max_poll_attempts,
        profile.lookback_days
    );
    Ok(())
}
