//! Event dispatcher - fans each normalized event out to every sink.
//!
//! # Architecture
//!
//! ```text
//! Event (family: deploy, type: vercel)
//!     │
//!     ▼
//! ┌─────────────────────────────────────┐
//! │            DISPATCHER               │
//! │                                     │
//! │  1. pending-log  (append, flush)    │
//! │  2. gateway      (forward if up)    │
//! │  3. log          (notification)     │
//! └─────────────────────────────────────┘
//! ```
//!
//! Effects run sequentially in registration order. A failing effect never
//! stops the ones after it: the pending-log append happens first, so an
//! event survives even when the gateway is down.

use crate::effects::{Effect, EffectError, EffectResult};
use crate::event::Event;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
#[error("effect '{effect_name}' failed: {source}")]
pub struct DispatchError {
    pub effect_name: String,
    #[source]
    pub source: EffectError,
}

/// Result of dispatching an event.
#[derive(Debug)]
pub struct DispatchResult {
    pub event_type: String,

    pub effects_executed: usize,

    /// Results from successful effect executions
    pub results: Vec<EffectResult>,

    /// Errors from failed effect executions
    pub errors: Vec<DispatchError>,
}

impl DispatchResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn failure_count(&self) -> usize {
        self.errors.len()
    }
}

/// Ordered list of effects every event is sent through.
///
/// Wrapped in `Arc` and shared across request tasks; individual effects
/// must be `Send + Sync`.
#[derive(Default)]
pub struct Dispatcher {
    effects: Vec<Arc<dyn Effect>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an effect. Effects run in the order they were added.
    pub fn with_effect(mut self, effect: Arc<dyn Effect>) -> Self {
        debug!(effect_name = %effect.name(), "Registering effect");
        self.effects.push(effect);
        self
    }

    pub fn effect_names(&self) -> Vec<&str> {
        self.effects.iter().map(|e| e.name()).collect()
    }

    /// Run every effect for `event`, collecting failures.
    pub async fn dispatch(&self, event: &Event) -> DispatchResult {
        debug!(
            event_type = %event.kind,
            provider = %event.provider_id,
            "Dispatching event"
        );

        let mut result = DispatchResult {
            event_type: event.kind.clone(),
            effects_executed: 0,
            results: Vec::new(),
            errors: Vec::new(),
        };

        for effect in &self.effects {
            result.effects_executed += 1;

            match effect.execute(event).await {
                Ok(effect_result) => {
                    debug!(
                        effect_name = %effect.name(),
                        message = %effect_result.message,
                        "Effect executed successfully"
                    );
                    result.results.push(effect_result);
                }
                Err(e) => {
                    let error = DispatchError {
                        effect_name: effect.name().to_string(),
                        source: e,
                    };

                    warn!(
                        effect_name = %effect.name(),
                        error = %error,
                        "Effect execution failed"
                    );

                    result.errors.push(error);
                }
            }
        }

        if result.errors.is_empty() {
            info!(
                event_type = %event.kind,
                effects_executed = result.effects_executed,
                "Event dispatched successfully"
            );
        } else {
            warn!(
                event_type = %event.kind,
                effects_executed = result.effects_executed,
                failures = result.errors.len(),
                "Event dispatched with failures"
            );
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::LogEffect;
    use crate::event::Family;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FailingEffect;

    #[async_trait]
    impl Effect for FailingEffect {
        fn name(&self) -> &str {
            "failing"
        }

        async fn execute(&self, _event: &Event) -> Result<EffectResult, EffectError> {
            Err(EffectError::Failed("boom".to_string()))
        }
    }

    /// Records the order effects ran in.
    struct RecordingEffect {
        name: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Effect for RecordingEffect {
        fn name(&self) -> &str {
            self.name
        }

        async fn execute(&self, _event: &Event) -> Result<EffectResult, EffectError> {
            self.seen.lock().unwrap().push(self.name);
            Ok(EffectResult::success(self.name, "recorded"))
        }
    }

    fn test_event() -> Event {
        Event::new(Family::CiCd, "jenkins", "jenkins", "Jenkins: nightly", "Build #1 - ✅ Success")
    }

    #[tokio::test]
    async fn test_dispatch_runs_all_effects() {
        let dispatcher = Dispatcher::new()
            .with_effect(Arc::new(LogEffect::new()))
            .with_effect(Arc::new(LogEffect::with_prefix("second")));

        let result = dispatcher.dispatch(&test_event()).await;
        assert!(result.is_success());
        assert_eq!(result.effects_executed, 2);
        assert_eq!(result.results.len(), 2);
        assert_eq!(result.event_type, "jenkins");
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_later_effects() {
        let dispatcher = Dispatcher::new()
            .with_effect(Arc::new(FailingEffect))
            .with_effect(Arc::new(LogEffect::new()));

        let result = dispatcher.dispatch(&test_event()).await;
        assert!(!result.is_success());
        assert_eq!(result.failure_count(), 1);
        assert_eq!(result.effects_executed, 2);
        assert_eq!(result.results[0].effect_name, "log");
        assert_eq!(result.errors[0].effect_name, "failing");
    }

    #[tokio::test]
    async fn test_effects_run_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new()
            .with_effect(Arc::new(RecordingEffect { name: "first", seen: seen.clone() }))
            .with_effect(Arc::new(RecordingEffect { name: "second", seen: seen.clone() }))
            .with_effect(Arc::new(RecordingEffect { name: "third", seen: seen.clone() }));

        assert_eq!(dispatcher.effect_names(), vec!["first", "second", "third"]);
        dispatcher.dispatch(&test_event()).await;
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_empty_dispatcher() {
        let result = Dispatcher::new().dispatch(&test_event()).await;
        assert!(result.is_success());
        assert_eq!(result.effects_executed, 0);
    }
}
