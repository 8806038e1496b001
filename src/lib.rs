//! # hookrelay
//!
//! Webhook ingestion, normalization and durable relay.
//!
//! GitHub, CI/CD and deployment webhooks arrive over HTTP, are normalized
//! into one [`Event`] shape, appended to a local pending log and forwarded
//! to a single automation gateway over a persistent WebSocket.
//!
//! ## Architecture
//!
//! ```text
//! HTTP POST -> verify/detect -> normalize -> Dispatcher -> pending log
//!                                                       -> gateway
//!                                                       -> notification log
//!
//! cron -> archiver -> pending log -> archive/events-<ts>.jsonl
//! ```
//!
//! ## Modules
//!
//! - [`event`]: the normalized event and its enums
//! - [`signature`]: GitHub HMAC-SHA256 verification
//! - [`detect`]: ordered-rule provider detection
//! - [`normalize`]: payload mappers for each source family
//! - [`dispatch`] / [`effects`]: fan-out of events to sinks
//! - [`pending_log`] / [`archive`]: durable JSONL log and its batch archiver
//! - [`gateway`]: reconnecting gateway connection
//! - [`ingress`]: axum router and handlers

pub mod archive;
pub mod config;
pub mod detect;
pub mod dispatch;
pub mod effects;
pub mod event;
pub mod gateway;
pub mod ingress;
pub mod normalize;
pub mod pending_log;
pub mod shutdown;
pub mod signature;

// Re-export commonly used types at crate root
pub use archive::{ArchiveReport, Archiver};
pub use config::RelayConfig;
pub use dispatch::Dispatcher;
pub use effects::{Effect, EffectError, EffectResult};
pub use event::{Event, Family, Priority};
pub use gateway::{ConnectionState, Gateway};
pub use normalize::Normalized;
pub use pending_log::PendingLog;

/// Pending log file name inside the log directory
pub const PENDING_LOG_FILE: &str = "pending-events.jsonl";

/// Archive subdirectory inside the log directory
pub const ARCHIVE_DIR: &str = "archive";
