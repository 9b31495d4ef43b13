//! Open Capture - camera and microphone capture, recording and stills.
//!
//! This is the main library crate. It provides the capture session and a
//! line-driven front end over it.

pub mod capture;
pub mod commands;
pub mod config;
pub mod photo;
pub mod recorder;
pub mod session;
pub mod surface;
pub mod utils;

pub use config::AppConfig;
pub use session::{CaptureSession, SessionStatus};
pub use utils::error::{AppError, AppResult, ErrorResponse};

use anyhow::Context;
use commands::Command;
use recorder::RecordingEvent;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Run the capture front end until `q`, end of input or Ctrl-C
pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "open_capture=debug,open_capture_lib=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting Open Capture v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::from_env().context("failed to load configuration")?;
    let backend = session::backend_for(&config)?;
    let session = CaptureSession::start(config, backend)
        .await
        .context("failed to start capture session")?;

    let mut events = session.subscribe().await;
    let event_log = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(RecordingEvent::ArtifactReady(artifact)) => println!(
                    "Recording {} ready at {} ({} chunks, {:.0}ms)",
                    artifact.session_index,
                    artifact.locator,
                    artifact.chunk_count,
                    artifact.duration_ms
                ),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("Missed {} recording events", missed)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    println!("Commands: r (toggle recording), p (capture photo), s (status), q (quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                None
            }
        };

        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<Command>() {
            Ok(Command::Quit) => break,
            Ok(command) => command,
            Err(e) => {
                tracing::warn!("{}", e);
                continue;
            }
        };

        let reply = commands::dispatch(&session, command).await;
        println!("{}", serde_json::to_string(&reply)?);
    }

    session.shutdown().await;
    event_log.abort();
    Ok(())
}
