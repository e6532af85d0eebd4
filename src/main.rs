use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::cli::{CommonArgs, CommonCommands, utils};
use rotator::RotatorDaemon;
use rotator::http;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "rotatord")]
#[command(about = "rotatord - size and age based log rotation for namespace/pod log trees")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Option<RotatorCommands>,

    #[arg(long, help = "Health and metrics listen address")]
    listen: Option<String>,
}

#[derive(Subcommand)]
enum RotatorCommands {
    #[command(flatten)]
    Common(CommonCommands),
}

impl Default for RotatorCommands {
    fn default() -> Self {
        Self::Common(CommonCommands::Start)
    }
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        info!("Received Ctrl+C");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on CLI arguments
    utils::init_logging(&cli.common);

    let mut config = utils::load_config(cli.common.config.as_ref())?;
    if let Some(listen) = cli.listen {
        config.daemon.listen = listen;
    }

    // Handle common commands that don't require starting the daemon
    let command = cli.command.unwrap_or_default();
    let RotatorCommands::Common(ref common_cmd) = command;
    if utils::handle_common_command(common_cmd, &config).await? {
        return Ok(());
    }

    info!("Starting rotatord");

    let listen = config.daemon.listen.clone();
    let daemon = Arc::new(
        RotatorDaemon::new(config)
            .await
            .context("Failed to initialize rotator")?,
    );
    let listener = http::bind(&listen).await?;

    let shutdown = CancellationToken::new();

    let http_handle = tokio::spawn(http::run_http_server(
        listener,
        daemon.http_state(),
        shutdown.clone(),
    ));

    let scan_handle = {
        let daemon = daemon.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { daemon.run(shutdown).await })
    };

    info!(listen = %listen, "rotatord running");

    wait_for_shutdown_signal().await?;
    info!("Shutting down rotatord");
    shutdown.cancel();

    if let Err(e) = scan_handle.await {
        error!("Scan loop failed: {}", e);
    }
    if !daemon.shutdown().await {
        warn!("Exiting with background tasks still running");
    }
    match http_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("HTTP server failed: {}", e),
        Err(e) => error!("HTTP server task failed: {}", e),
    }

    info!("rotatord stopped");
    Ok(())
}
