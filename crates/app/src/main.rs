use anyhow::Context;
use clap::Parser;
use respeak_app::pipeline::Pipeline;
use respeak_app::recognizer::LoggingRecognizer;
use respeak_app::settings;
use respeak_audio::DeviceResolver;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "respeak", about = "Continuous microphone capture with voice-activity gating")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "RESPEAK_CONFIG")]
    config: Option<PathBuf>,

    /// Override the preferred device name substring.
    #[arg(short, long)]
    device: Option<String>,

    /// List available capture devices and exit.
    #[arg(long)]
    list_devices: bool,
}

fn init_logging() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    if cli.list_devices {
        let resolver = DeviceResolver::new();
        for device in resolver.enumerate().context("enumerating devices")? {
            println!(
                "{}{} ({} ch max)",
                device.name,
                if device.is_default { " [default]" } else { "" },
                device.max_channels
            );
        }
        return Ok(());
    }

    let mut config = settings::load(cli.config.as_deref())?;
    if let Some(device) = cli.device {
        config.preferred_device = Some(device);
    }

    tracing::info!(
        sample_rate_hz = config.sample_rate_hz,
        channels = config.channels,
        chunk_size = config.chunk_size,
        "starting capture pipeline"
    );

    let pipeline =
        Pipeline::start(config, Box::new(LoggingRecognizer::default())).context("starting pipeline")?;

    let mut status_interval = tokio::time::interval(Duration::from_secs(30));
    status_interval.tick().await;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
            _ = status_interval.tick() => {
                let metrics = pipeline.metrics();
                tracing::info!(
                    state = ?pipeline.state(),
                    frames_read = metrics.frames_read(),
                    frames_dropped = metrics.frames_dropped(),
                    queue_depth = metrics.queue_depth(),
                    "pipeline running"
                );
            }
        }
    }

    pipeline.shutdown().context("pipeline terminated with a fault")?;
    tracing::info!("shutdown complete");
    Ok(())
}
