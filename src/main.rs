pub mod channels;
pub mod config;
pub mod engine;
pub mod native;
pub mod shutdown;
pub mod upstream;

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use crate::engine::downloader::{Downloader, Supervisor};
use crate::engine::scheduler::{ChildKilled, Scheduler};
use crate::native::process::ProcessLauncher;
use crate::shutdown::{install_signal_handlers, Shutdown};
use crate::upstream::pot_provider::{PotProviderClient, Readiness};

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ytcd=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting ytcd {}", env!("CARGO_PKG_VERSION"));

    ExitCode::from(exit_status(run().await))
}

async fn run() -> anyhow::Result<()> {
    let shutdown = Shutdown::new();
    install_signal_handlers(&shutdown)?;

    let config = config::load_config()?;
    tracing::info!(
        channels = %config.settings.channels_file.display(),
        downloader = %config.settings.downloader,
        "Loaded configuration"
    );

    // One-time readiness check so the first run doesn't race the pot provider
    // coming up. Container health checks would keep polling forever.
    let pot_provider = PotProviderClient::new(
        config.ping_url(),
        config.settings.ping_timeout(),
        config.settings.ping_retry(),
    )?;
    if pot_provider.wait_until_ready(&shutdown).await == Readiness::ShutdownRequested {
        tracing::info!("Shutdown requested before pot provider came up");
        return Ok(());
    }

    let supervisor = Supervisor::new(Downloader::new(&config), ProcessLauncher);
    let mut scheduler = Scheduler::new(
        config.settings.channels_file.clone(),
        supervisor,
        shutdown.clone(),
    );
    scheduler.run_forever().await
}

/// 0 on clean shutdown, 128+N when a child died from signal N, 1 otherwise.
fn exit_status(result: anyhow::Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(e) => match e.downcast_ref::<ChildKilled>() {
            // Already logged with the channel name where it happened.
            Some(killed) => killed.exit_code(),
            None => {
                tracing::error!("{:#}", e);
                1
            }
        },
    }
}
