//! Cashback engine binary
//!
//! Reads newline-delimited webhook envelopes from stdin, applies them and
//! prints one JSON outcome per line. Background sweeps run until stdin closes
//! or Ctrl-C, then a final analytics snapshot is printed.

use anyhow::Context;
use conversion_engine::{CashbackService, DateRange, EngineConfig, Scheduler};
use std::sync::Arc;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::watch,
};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if std::env::var("LOG_FORMAT").map_or(false, |v| v.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config() -> anyhow::Result<EngineConfig> {
    match std::env::var("CASHBACK_CONFIG") {
        Ok(path) => EngineConfig::from_file(&path)
            .with_context(|| format!("loading config from {}", path)),
        Err(_) => EngineConfig::from_env().context("loading config from environment"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = load_config()?;
    tracing::info!(backend = ?config.storage.backend, "Starting cashback engine");

    let service = Arc::new(CashbackService::from_config(&config).context("assembling service")?);
    service.audit().context("ledger audit failed at startup")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Scheduler::new(service.clone(), config.scheduler.clone()).spawn(shutdown_rx);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let outcome = service.handle_webhook_json(&line).await;
                println!("{}", serde_json::to_string(&outcome)?);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    shutdown_tx.send(true).ok();
    scheduler.await.context("scheduler task panicked")?;

    let analytics = service.get_analytics(None, DateRange::default())?;
    println!("{}", serde_json::to_string_pretty(&analytics)?);

    tracing::info!("Shutting down cashback engine");
    Ok(())
}
