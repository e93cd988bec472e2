//! busyd - camera busyness sensor daemon
//!
//! Each cycle this daemon:
//! 1. Captures one frame from the configured camera
//! 2. Scores scene busyness (1..10) with the statistical evaluator
//! 3. Uploads the observation to the remote store
//!
//! Capture and upload failures are per-cycle: the loop keeps its cadence.
//! Only a camera that cannot be opened (or an unexpected error) is fatal,
//! and exits with status 1.

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use busyness_sensor::{
    CameraSource, CycleOutcome, Monitor, MonitorSettings, SensorConfig, StopHandle, UploadClient,
    UploadSettings,
};

#[derive(Debug, Parser)]
#[command(name = "busyd", about = "Camera busyness sensor daemon")]
struct Cli {
    /// API token for the persistence endpoint.
    #[arg(long, env = "BUSY_API_TOKEN", hide_env_values = true)]
    api_token: String,

    /// Account identifier.
    #[arg(long, env = "BUSY_ACCOUNT_ID")]
    account_id: String,

    /// Database identifier.
    #[arg(long, env = "BUSY_DATABASE_ID")]
    database_id: String,

    /// Camera index; maps to /dev/video<N>. Defaults to the configured
    /// device (BUSY_DEVICE or the config file).
    #[arg(long)]
    camera: Option<u32>,

    /// Camera name recorded with every observation.
    #[arg(long, default_value = "camera-0")]
    camera_name: String,

    /// Capture interval in seconds.
    #[arg(long)]
    interval: Option<u64>,

    /// Free-text notes for this monitoring session.
    #[arg(long, default_value = "")]
    notes: String,

    /// Run exactly one cycle instead of continuously.
    #[arg(long)]
    once: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut cfg = SensorConfig::load()?;
    if let Some(index) = cli.camera {
        cfg.capture.device = format!("/dev/video{}", index);
    }
    if let Some(seconds) = cli.interval {
        if seconds == 0 {
            return Err(anyhow!("--interval must be greater than zero"));
        }
        cfg.interval = std::time::Duration::from_secs(seconds);
    }

    let upload = UploadSettings {
        api_base: cfg.api_base.clone(),
        account_id: cli.account_id,
        database_id: cli.database_id,
        api_token: cli.api_token,
    };

    log::info!(
        "busyd {} starting: device={} interval={}s once={}",
        env!("CARGO_PKG_VERSION"),
        cfg.capture.device,
        cfg.interval.as_secs(),
        cli.once
    );

    // Open failure here is the one fatal startup error; no cycle runs.
    let source = CameraSource::open(&cfg.capture).context("failed to initialize camera")?;
    let client = UploadClient::new(&upload);
    log::info!("uploading to {}", client.endpoint());

    let stop = StopHandle::new();
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            log::info!("stop requested");
            stop.stop();
        })
        .context("failed to install signal handler")?;
    }

    let settings = MonitorSettings {
        interval: cfg.interval,
        camera_name: cli.camera_name,
        notes: cli.notes,
    };
    let mut monitor = Monitor::new(source, client, settings, stop);

    if cli.once {
        match monitor.run_once() {
            CycleOutcome::Uploaded => Ok(()),
            CycleOutcome::Failed => Err(anyhow!("monitoring cycle failed")),
        }
    } else {
        monitor.run();
        Ok(())
    }
}
