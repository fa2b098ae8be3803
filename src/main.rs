use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use menfess_relay::channels::{BlueskyClient, verify_session};
use menfess_relay::config::Config;
use menfess_relay::error::Error;
use menfess_relay::pipeline::ConversationProcessor;
use menfess_relay::store::{FileStateStore, RuntimeState, StateStore};
use menfess_relay::worker::spawn_interval;

#[tokio::main]
async fn main() {
    // A missing .env file is fine; the real environment still applies.
    let _ = dotenvy::dotenv();

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("[!] {e}");
        std::process::exit(1);
    });

    let _log_guard = init_tracing(config.relay.log_dir.as_deref());

    if let Err(e) = run(config).await {
        error!("{e:#}");
        eprintln!("[!] {e:#}");
        std::process::exit(1);
    }
}

/// Console logging filtered by `RUST_LOG` (default `info`), plus a daily
/// rolling file when a log directory is configured.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "menfess-relay.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}

async fn run(config: Config) -> anyhow::Result<()> {
    eprintln!("🤖 Menfess relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Service: {}", config.account.service);
    eprintln!("   Prefix: {:?}", config.relay.prefix);
    eprintln!("   State: {}\n", config.relay.state_file.display());

    let client = Arc::new(
        BlueskyClient::login(&config.account)
            .await
            .with_context(|| format!("signing in to {}", config.account.identifier))?,
    );

    let self_did = verify_session(client.as_ref(), &config.relay.owner_did).await?;
    info!(did = %self_did, handle = %client.handle().await, "Session verified");

    let relay = Arc::new(config.relay);

    let store: Arc<dyn StateStore> = Arc::new(FileStateStore::new(&relay.state_file));
    let state = RuntimeState::load(store.as_ref())
        .await
        .with_context(|| format!("loading state from {}", relay.state_file.display()))?;
    info!(
        watch = state.watch_enabled,
        require_followback = state.require_followback,
        "Runtime state loaded"
    );

    let processor = ConversationProcessor::new(
        self_did,
        Arc::clone(&relay),
        client.clone(),
        client.clone(),
        store,
        state,
    );

    if relay.report_at_launch {
        if let Err(e) = processor.report_status().await {
            warn!(error = %e, "Failed to send launch report");
        }
    }

    let handle = spawn_interval(relay.poll_delay, processor, |e: Error| {
        error!(error = %e, "Poll cycle failed");
    });
    info!(delay_ms = relay.poll_delay.as_millis() as u64, "Watching inbox");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    info!("Shutting down, waiting for the current cycle to finish");
    handle.shutdown().await.context("interval loop panicked")?;
    Ok(())
}
