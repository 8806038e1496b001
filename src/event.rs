//! Canonical event types for hookrelay.
//!
//! Every inbound webhook, whatever its provider, is normalized into an
//! [`Event`]. Events are appended to the pending log, forwarded to the
//! gateway and finally drained by the archiver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Top-level source category of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    VersionControl,
    CiCd,
    Deploy,
    #[default]
    Generic,
}

impl Family {
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::VersionControl => "version_control",
            Family::CiCd => "ci_cd",
            Family::Deploy => "deploy",
            Family::Generic => "generic",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification priority.
///
/// Ordered so that `Priority::High < Priority::Critical`, which lets callers
/// test for "at least high" with a comparison.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    /// Parse a loosely-typed priority, as found in generic payloads.
    ///
    /// Unknown or empty values yield `None` so the caller can pick a default.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "normal" => Some(Priority::Normal),
            "high" => Some(Priority::High),
            "critical" => Some(Priority::Critical),
            _ => None,
        }
    }

    /// True for `high` and `critical`.
    pub fn is_escalated(&self) -> bool {
        *self >= Priority::High
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Title used when a constructor is handed an empty title.
const DEFAULT_TITLE: &str = "Webhook event";

/// Message used when a constructor is handed an empty message.
const DEFAULT_MESSAGE: &str = "Notification received";

/// A normalized event flowing through hookrelay.
///
/// # Example
///
/// ```json
/// {
///   "family": "ci_cd",
///   "providerId": "jenkins",
///   "type": "jenkins",
///   "title": "Jenkins: nightly",
///   "message": "Build #42 - ❌ Failed",
///   "details": { "job": "nightly", "build_number": 42 },
///   "priority": "high",
///   "receivedAt": "2025-12-11T10:00:00Z"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Source category
    #[serde(default)]
    pub family: Family,

    /// Concrete provider (e.g. "jenkins", "vercel", "github")
    #[serde(rename = "providerId", default = "default_provider_id")]
    pub provider_id: String,

    /// Short discriminator used for grouping (e.g. "push", "error")
    #[serde(rename = "type")]
    pub kind: String,

    pub title: String,

    pub message: String,

    /// Provider-specific data, passed through untouched
    #[serde(default)]
    pub details: Map<String, Value>,

    pub priority: Priority,

    /// When the webhook reached the ingress
    #[serde(rename = "receivedAt")]
    pub received_at: DateTime<Utc>,

    /// Delivery or correlation ID for tracing
    #[serde(rename = "correlationId", default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

fn default_provider_id() -> String {
    "generic".to_string()
}

impl Event {
    /// Create an event with `normal` priority and no details.
    ///
    /// Empty titles and messages are replaced with defaults so the
    /// non-empty invariant holds regardless of the caller.
    pub fn new(
        family: Family,
        provider_id: impl Into<String>,
        kind: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let provider_id = provider_id.into();
        Self {
            family,
            provider_id: if provider_id.trim().is_empty() {
                default_provider_id()
            } else {
                provider_id
            },
            kind: kind.into(),
            title: non_empty(title.into(), DEFAULT_TITLE),
            message: non_empty(message.into(), DEFAULT_MESSAGE),
            details: Map::new(),
            priority: Priority::Normal,
            received_at: Utc::now(),
            correlation_id: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details = details;
        self
    }

    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// True for events synthesized from a normalization failure.
    pub fn is_error(&self) -> bool {
        self.kind == "error"
    }
}

fn non_empty(value: String, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value
    }
}
