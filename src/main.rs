//! hookrelay server.
//!
//! ## Configuration
//!
//! `config/hookrelay.toml` (or `HOOKRELAY_CONFIG`), then environment
//! overrides, then `--host` / `--port`. A `.env` file is loaded first.
//! `RUST_LOG` controls logging (default: `hookrelay=info`).

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hookrelay::effects::LogEffect;
use hookrelay::ingress::{build_router, AppState};
use hookrelay::shutdown::ShutdownSignal;
use hookrelay::{Dispatcher, Gateway, PendingLog, RelayConfig};

#[derive(Parser, Debug)]
#[command(name = "hookrelay", version, about = "Webhook relay to the automation gateway")]
struct Args {
    /// Address to bind (overrides config and WEBHOOK_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config and WEBHOOK_PORT)
    #[arg(long)]
    port: Option<u16>,
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

    let mut config = RelayConfig::load().context("failed to load configuration")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    let log_dir = &config.storage.log_dir;
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let pending_log = PendingLog::in_dir(log_dir);
    let gateway = Gateway::from_config(&config.gateway);
    gateway.connect();

    let dispatcher = Dispatcher::new()
        .with_effect(Arc::new(pending_log.clone()))
        .with_effect(Arc::new(gateway.clone()))
        .with_effect(Arc::new(LogEffect::new()));

    info!(effects = ?dispatcher.effect_names(), "Dispatcher ready");

    let state = AppState::new(config.github.secret.clone(), dispatcher, gateway);
    let app = build_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!(
        addr = %addr,
        gateway = %config.gateway.url,
        pending_log = %pending_log.path().display(),
        signature_verification = config.github_secret().is_some(),
        "hookrelay listening"
    );

    let shutdown = ShutdownSignal::new();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}
