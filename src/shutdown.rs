//! Graceful shutdown coordination.
//!
//! [`ShutdownSignal`] resolves on SIGINT/SIGTERM (or a manual
//! [`trigger`](ShutdownSignal::trigger)), and a trigger on any clone
//! releases every waiter. The server passes [`ShutdownSignal::wait`] to
//! `axum::serve(..).with_graceful_shutdown` so in-flight webhook requests
//! finish their log append before the process exits.

use tokio::sync::broadcast;
use tracing::{error, info};

#[derive(Clone)]
pub struct ShutdownSignal {
    sender: broadcast::Sender<()>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { sender }
    }

    /// Wait for SIGINT or SIGTERM or a manual trigger, then release the
    /// other waiters.
    pub async fn wait(&self) {
        let mut manual = self.sender.subscribe();

        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C, initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
            _ = manual.recv() => {
                return;
            }
        }

        let _ = self.sender.send(());
    }

    /// Trigger shutdown manually (tests, programmatic stop).
    pub fn trigger(&self) {
        info!("Shutdown triggered programmatically");
        let _ = self.sender.send(());
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
