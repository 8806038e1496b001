//! Effect system for hookrelay.
//!
//! Effects are actions triggered once a webhook has been normalized into an
//! [`Event`]. The [`Effect`] trait defines the interface every sink
//! implements; the [`Dispatcher`](crate::dispatch::Dispatcher) runs them in
//! registration order.
//!
//! ## Built-in Effects
//!
//! - [`PendingLog`](crate::pending_log::PendingLog): durable JSONL append
//! - [`Gateway`](crate::gateway::Gateway): forward to the automation gateway
//! - [`LogEffect`]: human-readable notification line in the service log
//!
//! ## Creating Custom Effects
//!
//! ```rust,ignore
//! use hookrelay::{Effect, EffectResult, EffectError, Event};
//! use async_trait::async_trait;
//!
//! struct MyEffect;
//!
//! #[async_trait]
//! impl Effect for MyEffect {
//!     fn name(&self) -> &str {
//!         "my-effect"
//!     }
//!
//!     async fn execute(&self, event: &Event) -> Result<EffectResult, EffectError> {
//!         Ok(EffectResult::success("my-effect", "Did the thing"))
//!     }
//! }
//! ```

pub mod log;

use crate::event::Event;
use crate::gateway::GatewayError;
use crate::pending_log::PendingLogError;
use async_trait::async_trait;
use thiserror::Error;

pub use log::LogEffect;

/// Errors that can occur during effect execution.
#[derive(Error, Debug)]
pub enum EffectError {
    /// Appending to the pending log failed
    #[error("pending log: {0}")]
    PendingLog(#[from] PendingLogError),

    /// Forwarding to the gateway failed
    #[error("gateway: {0}")]
    Gateway(#[from] GatewayError),

    /// Generic effect failure
    #[error("effect failed: {0}")]
    Failed(String),
}

/// Result of a successful effect execution.
#[derive(Debug, Clone)]
pub struct EffectResult {
    /// Name of the effect that produced this result
    pub effect_name: String,

    /// Human-readable message describing what happened
    pub message: String,
}

impl EffectResult {
    pub fn success(effect_name: &str, message: impl Into<String>) -> Self {
        Self {
            effect_name: effect_name.to_string(),
            message: message.into(),
        }
    }
}

/// A sink for normalized events.
///
/// Effects must be `Send + Sync` so one instance can be shared by every
/// request task.
#[async_trait]
pub trait Effect: Send + Sync {
    /// Unique name of this effect (e.g. "pending-log", "gateway", "log")
    fn name(&self) -> &str;

    /// Execute the effect for the given event.
    async fn execute(&self, event: &Event) -> Result<EffectResult, EffectError>;
}
