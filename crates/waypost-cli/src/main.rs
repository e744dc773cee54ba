//! waypost - submit locations and keep the offline queues moving.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use waypost_core::app::{AppBuilder, Waypost};
use waypost_core::config::Config;
use waypost_core::domain::{Pass, QueuePayload, SubmitOutcome};
use waypost_core::impls::HttpProbe;

#[derive(Parser)]
#[command(name = "waypost")]
#[command(about = "Offline-resilient location submission")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file. Defaults to <config dir>/waypost/config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Acceptance endpoint (overrides config and WAYPOST_ENDPOINT)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// SQLite database file (overrides config and WAYPOST_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit one location; queued locally if the endpoint cannot confirm it
    Submit {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// Per-call delivery timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Run one drain pass and one replay pass now
    Drain,
    /// Show pending counts for both queues
    Status,
    /// Probe connectivity and drain whenever the endpoint comes back
    Watch,
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(endpoint) = &cli.endpoint {
        config.delivery.endpoint = endpoint.clone();
    }
    if let Some(db) = &cli.db {
        config.storage.database_path = Some(db.clone());
    }
    if let Some(level) = &cli.log_level {
        config.log_level = Some(level.clone());
    }
    config.validate().context("validating configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(config.log_level(), cli.json_logs);

    let app = AppBuilder::from_config(&config)
        .await
        .context("opening local queues")?
        .build()?;

    match cli.command {
        Commands::Submit {
            lat,
            lng,
            timeout_secs,
        } => submit(&app, lat, lng, timeout_secs).await?,
        Commands::Drain => drain(&app).await?,
        Commands::Status => {
            let status = app.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Watch => watch_until_ctrl_c(&app, &config).await?,
    }

    Ok(())
}

async fn submit(
    app: &Waypost,
    lat: f64,
    lng: f64,
    timeout_secs: Option<u64>,
) -> anyhow::Result<()> {
    let outcome = match timeout_secs {
        Some(secs) => {
            app.submit_with_timeout(lat, lng, Duration::from_secs(secs))
                .await?
        }
        None => app.submit(lat, lng).await?,
    };

    let report = match &outcome {
        SubmitOutcome::Delivered(receipt) => json!({
            "outcome": outcome.kind(),
            "location_id": receipt.location_id,
            "accepted_at": receipt.accepted_at,
        }),
        SubmitOutcome::Queued { key, reason } => json!({
            "outcome": outcome.kind(),
            "key": key.to_string(),
            "reason": reason.to_string(),
        }),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn pass_json<P: QueuePayload>(pass: &Pass<P>) -> serde_json::Value {
    match pass {
        Pass::Completed(report) => json!({
            "delivered": report.delivered,
            "remaining": report.remaining,
            "halted_at": report.halted_at.map(|k| k.to_string()),
        }),
        Pass::Coalesced => json!("coalesced"),
    }
}

async fn drain(app: &Waypost) -> anyhow::Result<()> {
    let drained = app.drain().await.context("draining submissions")?;
    let replayed = app.replay().await.context("replaying captured requests")?;
    let report = json!({
        "submissions": pass_json(&drained),
        "requests": pass_json(&replayed),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn watch_until_ctrl_c(app: &Waypost, config: &Config) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let probe = HttpProbe::new(
        config.probe_url(),
        Duration::from_secs(config.sync.probe_interval_secs),
    )?;
    info!(probe_url = probe.url(), "Watching connectivity");
    let probe = probe.spawn(app.signal().clone(), shutdown_rx);
    let sync = app.spawn_sync_loop();

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for ctrl-c")?;
            info!("Shutting down");
        }
        _ = wait_finished(&sync) => {}
    }

    let _ = shutdown_tx.send(true);
    let sync_result = sync.shutdown_and_join().await;
    join_probe(probe).await;
    sync_result.context("sync loop stopped with a storage error")?;
    Ok(())
}

/// A panicked probe is logged, never fatal: the sync loop's result decides
/// the exit status.
async fn join_probe(probe: JoinHandle<()>) -> bool {
    match probe.await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Connectivity probe task failed");
            false
        }
    }
}

async fn wait_finished(sync: &waypost_core::app::SyncLoop) {
    while !sync.is_finished() {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_probe_reports_a_panicked_task() {
        let ok = tokio::spawn(async {});
        assert!(join_probe(ok).await);

        let panicked = tokio::spawn(async {
            panic!("probe crashed");
        });
        assert!(!join_probe(panicked).await);
    }

    #[test]
    fn submit_accepts_negative_coordinates() {
        let cli = Cli::try_parse_from(["waypost", "submit", "--lat", "-6.2", "--lng", "106.8"]).unwrap();
        assert!(matches!(cli.command, Commands::Submit { lat, .. } if lat == -6.2));
    }
}
