//! Archive pending webhook events.
//!
//! Meant to run from cron. Reads `<log_dir>/pending-events.jsonl`, prints a
//! boxed summary and the JSON report, moves the events into
//! `<log_dir>/archive/` and empties the pending log. With `--relay`, the
//! summary is also forwarded to the gateway as a single `summary` event.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hookrelay::{Archiver, ConnectionState, Gateway, RelayConfig};

#[derive(Parser, Debug)]
#[command(name = "archiver", version, about = "Archive pending webhook events")]
struct Args {
    /// Log directory (overrides config and HOOKRELAY_LOG_DIR)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Forward the summary to the gateway
    #[arg(long)]
    relay: bool,

    /// Seconds to wait for the gateway connection when relaying
    #[arg(long, default_value_t = 10)]
    relay_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hookrelay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = RelayConfig::load().context("failed to load configuration")?;
    let log_dir = args.log_dir.unwrap_or_else(|| config.storage.log_dir.clone());

    let report = Archiver::new(&log_dir)
        .run()
        .with_context(|| format!("archive pass over {} failed", log_dir.display()))?;

    if report.is_empty() {
        println!("{}", report.summary);
        return Ok(());
    }

    println!("\n{}\n", report.summary);
    println!("{}", serde_json::to_string_pretty(&report)?);

    if args.relay {
        let gateway = Gateway::from_config(&config.gateway);
        gateway.connect();
        let timeout = Duration::from_secs(args.relay_timeout);

        if gateway.wait_for(ConnectionState::Connected, timeout).await {
            gateway.forward(&report.to_event())?;
            // Give the writer task a moment to flush the frame.
            tokio::time::sleep(Duration::from_millis(200)).await;
            info!(gateway = %gateway.url(), "Summary relayed to gateway");
        } else {
            warn!(gateway = %gateway.url(), "Gateway unreachable, summary not relayed");
        }
    }

    Ok(())
}
