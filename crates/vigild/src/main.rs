use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vigil_hw::{AudioSounder, Camera, Sounder};

mod alarm;
mod config;
mod monitor;
mod notify;
mod preview;

use alarm::{AlarmCadence, AlarmController};
use config::{Config, Credentials};
use notify::{Notifier, SmtpMailer};
use preview::Preview;

#[derive(Parser)]
#[command(name = "vigild", about = "Vigil presence-detection alarm monitor")]
struct Cli {
    /// V4L2 camera device path
    #[arg(long)]
    device: Option<String>,
    /// Pose model ONNX file
    #[arg(long)]
    model: Option<std::path::PathBuf>,
    /// Credentials file (KEY=value)
    #[arg(long)]
    credentials: Option<std::path::PathBuf>,
    /// Run without the preview window
    #[arg(long)]
    headless: bool,
    /// List available capture devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.list_devices {
        for dev in Camera::list_devices() {
            println!("{}\t{} ({})", dev.path, dev.name, dev.driver);
        }
        return Ok(());
    }

    let mut config = Config::from_env();
    if let Some(device) = cli.device {
        config.camera_device = device;
    }
    if let Some(model) = cli.model {
        config.model_path = model;
    }
    if let Some(credentials) = cli.credentials {
        config.credentials_path = credentials;
    }
    config.headless |= cli.headless;

    tracing::info!(
        device = %config.camera_device,
        model = %config.model_path.display(),
        headless = config.headless,
        "vigild starting"
    );

    // Credentials are validated before any camera or model resource is
    // acquired; a missing key must fail the process here.
    let credentials = Credentials::load(&config.credentials_path)
        .context("failed to load mail credentials")?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;

    let camera = Camera::open(&config.camera_device).context("failed to open camera")?;
    let mut detector =
        vigil_core::PoseDetector::load(&config.model_path.to_string_lossy())
            .context("failed to load pose model")?;

    let sounder: Arc<dyn Sounder> = Arc::new(AudioSounder);
    let alarm = AlarmController::new(Arc::clone(&sounder), AlarmCadence::default());
    let mailer = Arc::new(SmtpMailer::new(&credentials).context("invalid mail addresses")?);
    let notifier = Notifier::new(
        mailer,
        sounder,
        runtime.handle().clone(),
        config.capture_path.clone(),
    );
    let mut session = monitor::Session::new(alarm, notifier);

    let mut preview = if config.headless {
        None
    } else {
        Some(Preview::open(camera.width, camera.height).context("failed to open preview")?)
    };

    let mut capture = camera.start().context("failed to start capture stream")?;
    monitor::run(
        &mut capture,
        &mut detector,
        &mut session,
        preview.as_mut(),
    );

    // In-flight notifications are daemon-like and must not block exit.
    runtime.shutdown_background();

    tracing::info!("vigild exiting");
    Ok(())
}
