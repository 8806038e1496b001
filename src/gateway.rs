//! Persistent connection to the automation gateway.
//!
//! A single WebSocket connection is kept open to the gateway. Events are
//! forwarded only while it is up; there is no outbound queue, so an event
//! forwarded while disconnected is dropped here and survives only in the
//! pending log.
//!
//! # State Machine
//!
//! ```text
//!                 connect()
//!  Disconnected ─────────────► Connecting
//!       ▲                          │
//!       │ error / close            │ open
//!       │ (schedule one timer)     ▼
//!       └──────────────────── Connected
//!
//!  timer fires ──► connect()
//! ```
//!
//! Every connection attempt gets a generation number. Close notifications
//! carrying an older generation are ignored, so a late close from a
//! superseded socket cannot tear down its replacement.

use crate::config::GatewayConfig;
use crate::effects::{Effect, EffectError, EffectResult};
use crate::event::Event;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Envelope `kind` for forwarded events.
pub const ENVELOPE_KIND: &str = "webhook_event";

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Forward attempted while the connection is not open
    #[error("gateway is not connected")]
    NotConnected,

    #[error("failed to serialize envelope: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Wire format of a forwarded event.
#[derive(Debug, Serialize)]
struct Envelope<'a> {
    kind: &'static str,
    source: &'a str,
    timestamp: DateTime<Utc>,
    data: &'a Event,
}

struct Shared {
    state: ConnectionState,
    generation: u64,
    /// Writer half of the live connection, present only while connected
    outbound: Option<mpsc::UnboundedSender<Message>>,
    /// Pending reconnect timer
    reconnect: Option<JoinHandle<()>>,
}

struct Inner {
    url: String,
    source: String,
    reconnect_delay: Duration,
    shared: Mutex<Shared>,
    state_tx: watch::Sender<ConnectionState>,
}

/// Handle to the gateway connection. Cheap to clone; all clones share one
/// connection.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("url", &self.inner.url)
            .field("state", &self.state())
            .finish()
    }
}

impl Gateway {
    pub fn new(url: impl Into<String>, source: impl Into<String>, reconnect_delay: Duration) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                source: source.into(),
                reconnect_delay,
                shared: Mutex::new(Shared {
                    state: ConnectionState::Disconnected,
                    generation: 0,
                    outbound: None,
                    reconnect: None,
                }),
                state_tx,
            }),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            config.url.clone(),
            config.source.clone(),
            Duration::from_secs(config.reconnect_delay_secs),
        )
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, shared: &mut Shared, state: ConnectionState) {
        shared.state = state;
        self.inner.state_tx.send_replace(state);
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Whether a reconnect timer is scheduled.
    pub fn reconnect_pending(&self) -> bool {
        self.lock().reconnect.is_some()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Start a connection attempt unless one is already open or in flight.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let generation = {
            let mut shared = self.lock();
            self.begin_attempt(&mut shared)
        };
        if let Some(generation) = generation {
            self.spawn_attempt(generation);
        }
    }

    fn begin_attempt(&self, shared: &mut Shared) -> Option<u64> {
        if shared.state != ConnectionState::Disconnected {
            debug!(state = %shared.state, "Gateway connect skipped");
            return None;
        }
        shared.generation += 1;
        self.set_state(shared, ConnectionState::Connecting);
        Some(shared.generation)
    }

    fn spawn_attempt(&self, generation: u64) {
        info!(url = %self.inner.url, generation, "Connecting to gateway");
        tokio::spawn(self.clone().run_connection(generation));
    }

    /// Mark the current connection closed and schedule a reconnect.
    pub fn on_close(&self) {
        let generation = self.generation();
        self.close_if_current(generation);
    }

    /// Forward an event. Fails immediately unless connected.
    pub fn forward(&self, event: &Event) -> Result<(), GatewayError> {
        let envelope = Envelope {
            kind: ENVELOPE_KIND,
            source: &self.inner.source,
            timestamp: Utc::now(),
            data: event,
        };
        let text = serde_json::to_string(&envelope)?;

        let shared = self.lock();
        if shared.state != ConnectionState::Connected {
            return Err(GatewayError::NotConnected);
        }
        let outbound = shared.outbound.as_ref().ok_or(GatewayError::NotConnected)?;
        outbound
            .send(Message::Text(text))
            .map_err(|_| GatewayError::NotConnected)?;

        debug!(event_type = %event.kind, "Forwarded event to gateway");
        Ok(())
    }

    /// Wait until the connection reaches `state`. Returns false on timeout.
    pub async fn wait_for(&self, state: ConnectionState, timeout: Duration) -> bool {
        let mut rx = self.inner.state_tx.subscribe();
        let reached = tokio::time::timeout(timeout, rx.wait_for(|s| *s == state))
            .await
            .map_or(false, |changed| changed.is_ok());
        reached
    }

    async fn run_connection(self, generation: u64) {
        let ws = match tokio_tungstenite::connect_async(self.inner.url.as_str()).await {
            Ok((ws, _response)) => ws,
            Err(e) => {
                warn!(url = %self.inner.url, error = %e, "Gateway connection failed");
                self.close_if_current(generation);
                return;
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        if !self.open_if_current(generation, tx) {
            debug!(generation, "Superseded gateway connection opened, dropping");
            return;
        }

        let (mut sink, mut stream) = ws.split();
        loop {
            tokio::select! {
                outgoing = rx.recv() => match outgoing {
                    Some(message) => {
                        if let Err(e) = sink.send(message).await {
                            warn!(error = %e, "Gateway send failed");
                            break;
                        }
                    }
                    // Writer dropped by on_close
                    None => break,
                },
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Close(frame))) => {
                        info!(frame = ?frame, "Gateway closed the connection");
                        break;
                    }
                    Some(Ok(message)) => {
                        debug!(message = %message, "Gateway message");
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Gateway connection error");
                        break;
                    }
                    None => break,
                },
            }
        }

        let _ = sink.close().await;
        self.close_if_current(generation);
    }

    fn open_if_current(&self, generation: u64, outbound: mpsc::UnboundedSender<Message>) -> bool {
        let mut shared = self.lock();
        if shared.generation != generation {
            return false;
        }
        shared.outbound = Some(outbound);
        if let Some(timer) = shared.reconnect.take() {
            timer.abort();
        }
        self.set_state(&mut shared, ConnectionState::Connected);
        info!(url = %self.inner.url, generation, "Connected to gateway");
        true
    }

    fn close_if_current(&self, generation: u64) {
        let mut shared = self.lock();
        if shared.generation != generation {
            debug!(generation, current = shared.generation, "Ignoring stale gateway close");
            return;
        }

        shared.outbound = None;
        if shared.state != ConnectionState::Disconnected {
            self.set_state(&mut shared, ConnectionState::Disconnected);
            info!(generation, "Disconnected from gateway");
        }

        if shared.reconnect.is_none() {
            let delay = self.inner.reconnect_delay;
            info!(delay_secs = delay.as_secs_f64(), "Scheduling gateway reconnect");
            let gateway = self.clone();
            shared.reconnect = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let generation = {
                    let mut shared = gateway.lock();
                    shared.reconnect = None;
                    gateway.begin_attempt(&mut shared)
                };
                if let Some(generation) = generation {
                    gateway.spawn_attempt(generation);
                }
            }));
        }
    }
}

#[async_trait]
impl Effect for Gateway {
    fn name(&self) -> &str {
        "gateway"
    }

    async fn execute(&self, event: &Event) -> Result<EffectResult, EffectError> {
        self.forward(event)?;
        Ok(EffectResult::success(
            self.name(),
            format!("Forwarded {} event to {}", event.kind, self.inner.url),
        ))
    }
}
