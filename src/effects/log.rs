//! Log Effect - human-readable notification line per event.
//!
//! Escalated events (high/critical) are logged at `warn`, everything else
//! at `info`, so a plain `hookrelay=warn` filter shows only what needs
//! attention.

use super::{Effect, EffectError, EffectResult};
use crate::event::{Event, Priority};
use async_trait::async_trait;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct LogEffect {
    prefix: String,
}

impl LogEffect {
    pub fn new() -> Self {
        Self {
            prefix: "notify".to_string(),
        }
    }

    /// Create a LogEffect with a custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The line written for an event: `[source] title` plus the message.
    pub fn format(event: &Event) -> String {
        let marker = match event.priority {
            Priority::Critical => "🚨 ",
            Priority::High => "⚠️ ",
            Priority::Normal | Priority::Low => "",
        };
        format!(
            "{}[{}] {}: {}",
            marker, event.provider_id, event.title, event.message
        )
    }
}

impl Default for LogEffect {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Effect for LogEffect {
    fn name(&self) -> &str {
        "log"
    }

    async fn execute(&self, event: &Event) -> Result<EffectResult, EffectError> {
        let line = Self::format(event);

        if event.priority.is_escalated() {
            warn!(
                prefix = %self.prefix,
                family = %event.family,
                event_type = %event.kind,
                priority = %event.priority,
                "{}",
                line
            );
        } else {
            info!(
                prefix = %self.prefix,
                family = %event.family,
                event_type = %event.kind,
                priority = %event.priority,
                "{}",
                line
            );
        }

        Ok(EffectResult::success(self.name(), line))
    }
}
