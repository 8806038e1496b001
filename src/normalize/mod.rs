//! Payload-to-[`Event`] normalization.
//!
//! One submodule per source family:
//!
//! - [`github`]: version-control events, dispatched on the declared event kind
//! - [`cicd`]: CI/CD notifications, dispatched on the detected provider
//! - [`deploy`]: deployment notifications, dispatched on the detected platform
//!
//! Each concrete mapper is a plain function `&Value -> Result<Event, NormalizeError>`.
//! Missing optional fields degrade to defaults; only a payload whose shape
//! makes the mapper meaningless (not an object, a required field absent)
//! produces an error. The family entry points never fail: an error is
//! turned into a synthetic `error` event and reported as
//! [`Normalized::Recovered`].

pub mod cicd;
pub mod deploy;
pub mod github;

use crate::event::Event;
use serde_json::{Map, Value};
use thiserror::Error;

/// Why a concrete mapper rejected a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// The payload root is not a JSON object
    #[error("payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// A field the mapper cannot do without is absent or null
    #[error("missing required field `{0}`")]
    MissingField(String),

    /// A field is present but of the wrong JSON type
    #[error("field `{field}` must be {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },
}

/// Result of running a family normalizer.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    /// The provider mapper produced the event
    Mapped(Event),

    /// The mapper failed and an `error` event was synthesized instead
    Recovered { event: Event, error: NormalizeError },
}

impl Normalized {
    pub fn event(&self) -> &Event {
        match self {
            Normalized::Mapped(event) => event,
            Normalized::Recovered { event, .. } => event,
        }
    }

    pub fn into_event(self) -> Event {
        match self {
            Normalized::Mapped(event) => event,
            Normalized::Recovered { event, .. } => event,
        }
    }

    pub fn error(&self) -> Option<&NormalizeError> {
        match self {
            Normalized::Mapped(_) => None,
            Normalized::Recovered { error, .. } => Some(error),
        }
    }

    pub fn is_recovered(&self) -> bool {
        matches!(self, Normalized::Recovered { .. })
    }

    /// Turn a mapper result into a `Normalized`, building the error event
    /// with `fallback` when the mapper failed.
    pub(crate) fn from_result(
        result: Result<Event, NormalizeError>,
        fallback: impl FnOnce(&NormalizeError) -> Event,
    ) -> Self {
        match result {
            Ok(event) => Normalized::Mapped(event),
            Err(error) => Normalized::Recovered {
                event: fallback(&error),
                error,
            },
        }
    }
}

/// JSON type name, for error messages.
fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Require the payload root to be an object.
pub(crate) fn as_object(payload: &Value) -> Result<&Map<String, Value>, NormalizeError> {
    payload
        .as_object()
        .ok_or_else(|| NormalizeError::NotAnObject(type_name(payload)))
}

/// Walk a dotted path, treating `null` as absent.
pub(crate) fn value_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// A string at `path`, if present and non-empty.
pub(crate) fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    value_at(value, path)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Scalar at `path` rendered as text: strings verbatim, numbers and
/// booleans via `to_string`.
pub(crate) fn text_at(value: &Value, path: &[&str]) -> Option<String> {
    match value_at(value, path)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A string field the mapper cannot work without.
pub(crate) fn require_str<'a>(value: &'a Value, path: &[&str]) -> Result<&'a str, NormalizeError> {
    match value_at(value, path) {
        None => Err(NormalizeError::MissingField(path.join("."))),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(NormalizeError::WrongType {
            field: path.join("."),
            expected: "a string",
        }),
    }
}

/// An object field the mapper cannot work without.
pub(crate) fn require_object<'a>(value: &'a Value, path: &[&str]) -> Result<&'a Value, NormalizeError> {
    match value_at(value, path) {
        None => Err(NormalizeError::MissingField(path.join("."))),
        Some(v @ Value::Object(_)) => Ok(v),
        Some(_) => Err(NormalizeError::WrongType {
            field: path.join("."),
            expected: "an object",
        }),
    }
}

/// Abbreviate a commit SHA to seven characters.
pub(crate) fn short_sha(sha: &str) -> String {
    sha.chars().take(7).collect()
}

/// Look a status up in a provider's display table, falling back to the raw value.
pub(crate) fn display_status(table: &[(&str, &str)], status: &str) -> String {
    table
        .iter()
        .find(|(key, _)| *key == status)
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| status.to_string())
}

/// Convert a `json!` object into event details, dropping null entries.
pub(crate) fn into_details(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
        _ => Map::new(),
    }
}

/// Merge a caller-supplied `details` object over `base`.
pub(crate) fn merge_details(mut base: Map<String, Value>, extra: Option<&Value>) -> Map<String, Value> {
    if let Some(Value::Object(extra)) = extra {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }
    base
}
