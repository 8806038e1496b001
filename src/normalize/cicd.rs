//! CI/CD notification mappers.

use super::{
    as_object, display_status, into_details, merge_details, short_sha, str_at, text_at, value_at,
    NormalizeError, Normalized,
};
use crate::detect::CiProvider;
use crate::event::{Event, Family, Priority};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

const GITHUB_ACTIONS_STATUS: &[(&str, &str)] = &[
    ("queued", "⏳ Queued"),
    ("in_progress", "🔄 Running"),
    ("success", "✅ Success"),
    ("failure", "❌ Failed"),
    ("cancelled", "🚫 Cancelled"),
];

const JENKINS_STATUS: &[(&str, &str)] = &[
    ("SUCCESS", "✅ Success"),
    ("FAILURE", "❌ Failed"),
    ("UNSTABLE", "⚠️ Unstable"),
    ("ABORTED", "🚫 Aborted"),
    ("BUILDING", "🔄 Building"),
];

const CIRCLECI_STATUS: &[(&str, &str)] = &[
    ("success", "✅ Success"),
    ("failed", "❌ Failed"),
    ("error", "❌ Error"),
    ("canceled", "🚫 Cancelled"),
    ("running", "🔄 Running"),
    ("on_hold", "⏸️ On Hold"),
];

/// Normalize a CI/CD payload for the detected provider. Never fails.
pub fn normalize(provider: CiProvider, payload: &Value, received_at: DateTime<Utc>) -> Normalized {
    let result = match provider {
        CiProvider::GithubActions => github_actions(payload),
        CiProvider::Jenkins => jenkins(payload),
        CiProvider::CircleCi => circleci(payload),
        CiProvider::Generic => generic(payload),
    };

    Normalized::from_result(result.map(|e| e.with_received_at(received_at)), |error| {
        Event::new(
            Family::CiCd,
            provider.as_str(),
            "error",
            format!("Error processing {} event", provider),
            error.to_string(),
        )
        .with_priority(Priority::High)
        .with_received_at(received_at)
    })
}

fn failure_is_high(failed: bool) -> Priority {
    if failed {
        Priority::High
    } else {
        Priority::Normal
    }
}

/// GitHub Actions `workflow_run` / `workflow_job` events.
pub fn github_actions(payload: &Value) -> Result<Event, NormalizeError> {
    as_object(payload)?;

    let status = str_at(payload, &["workflow_run", "status"])
        .or_else(|| str_at(payload, &["workflow_job", "status"]))
        .unwrap_or("unknown");
    let conclusion = str_at(payload, &["workflow_run", "conclusion"])
        .or_else(|| str_at(payload, &["workflow_job", "conclusion"]));

    let label = match (conclusion, status) {
        (Some(conclusion), _) => display_status(GITHUB_ACTIONS_STATUS, conclusion),
        // Completed without a recorded conclusion counts as failed
        (None, "completed") => "❌ Failed".to_string(),
        (None, status) => display_status(GITHUB_ACTIONS_STATUS, status),
    };

    let repo = str_at(payload, &["repository", "name"]).unwrap_or("Unknown");
    let duration = str_at(payload, &["workflow_run", "run_started_at"]).and_then(|start| {
        str_at(payload, &["workflow_run", "updated_at"]).and_then(|end| format_duration(start, end))
    });

    let details = into_details(json!({
        "provider": CiProvider::GithubActions.as_str(),
        "repository": str_at(payload, &["repository", "full_name"]),
        "workflow": str_at(payload, &["workflow_run", "name"])
            .or_else(|| str_at(payload, &["workflow_job", "name"])),
        "status": status,
        "conclusion": conclusion,
        "branch": str_at(payload, &["workflow_run", "head_branch"]),
        "commit": str_at(payload, &["workflow_run", "head_sha"]).map(short_sha),
        "url": str_at(payload, &["workflow_run", "html_url"])
            .or_else(|| str_at(payload, &["workflow_job", "html_url"])),
        "sender": str_at(payload, &["sender", "login"]),
        "duration": duration,
    }));

    Ok(Event::new(
        Family::CiCd,
        CiProvider::GithubActions.as_str(),
        "github_actions",
        format!("GitHub Actions: {}", repo),
        format!("Workflow {}", label),
    )
    .with_details(details)
    .with_priority(failure_is_high(conclusion == Some("failure"))))
}

/// Jenkins notification plugin payloads.
pub fn jenkins(payload: &Value) -> Result<Event, NormalizeError> {
    as_object(payload)?;

    let job = str_at(payload, &["name"]).unwrap_or("Unknown");
    let status = str_at(payload, &["build", "status"])
        .or_else(|| str_at(payload, &["build", "phase"]))
        .unwrap_or("unknown");
    let number = text_at(payload, &["build", "number"]).unwrap_or_else(|| "?".to_string());

    let details = into_details(json!({
        "provider": CiProvider::Jenkins.as_str(),
        "job": str_at(payload, &["name"]),
        "build_number": value_at(payload, &["build", "number"]),
        "status": status,
        "url": str_at(payload, &["url"]).or_else(|| str_at(payload, &["build", "full_url"])),
        "duration": value_at(payload, &["build", "duration"]),
        "parameters": value_at(payload, &["build", "parameters"]),
    }));

    Ok(Event::new(
        Family::CiCd,
        CiProvider::Jenkins.as_str(),
        "jenkins",
        format!("Jenkins: {}", job),
        format!("Build #{} - {}", number, display_status(JENKINS_STATUS, status)),
    )
    .with_details(details)
    .with_priority(failure_is_high(status == "FAILURE")))
}

/// CircleCI webhook payloads (`workflow-completed`, `job-completed`).
pub fn circleci(payload: &Value) -> Result<Event, NormalizeError> {
    as_object(payload)?;

    let project = str_at(payload, &["project", "name"]).unwrap_or("Unknown");
    let workflow_status = str_at(payload, &["workflow", "status"]);
    let pipeline_status = str_at(payload, &["pipeline", "status"])
        .or(workflow_status)
        .unwrap_or("unknown");

    let details = into_details(json!({
        "provider": CiProvider::CircleCi.as_str(),
        "project": str_at(payload, &["project", "name"]),
        "pipeline_id": str_at(payload, &["pipeline", "id"]),
        "workflow": str_at(payload, &["workflow", "name"]),
        "status": workflow_status,
        "branch": str_at(payload, &["pipeline", "vcs", "branch"]),
        "commit": str_at(payload, &["pipeline", "vcs", "revision"]).map(short_sha),
        "url": str_at(payload, &["workflow", "url"]),
    }));

    Ok(Event::new(
        Family::CiCd,
        CiProvider::CircleCi.as_str(),
        "circleci",
        format!("CircleCI: {}", project),
        format!("Pipeline {}", display_status(CIRCLECI_STATUS, pipeline_status)),
    )
    .with_details(details)
    .with_priority(failure_is_high(workflow_status == Some("failed"))))
}

/// Already-shaped payloads from unrecognized CI systems.
pub fn generic(payload: &Value) -> Result<Event, NormalizeError> {
    as_object(payload)?;

    let details = merge_details(
        into_details(json!({
            "provider": str_at(payload, &["provider"]).unwrap_or("unknown"),
        })),
        value_at(payload, &["details"]),
    );
    let priority = str_at(payload, &["priority"])
        .and_then(Priority::parse)
        .unwrap_or(Priority::Normal);

    Ok(Event::new(
        Family::CiCd,
        CiProvider::Generic.as_str(),
        "generic",
        str_at(payload, &["title"]).unwrap_or("CI/CD Event"),
        str_at(payload, &["message"]).unwrap_or("Pipeline notification received"),
    )
    .with_details(details)
    .with_priority(priority))
}

/// `"Xm Ys"` between two RFC 3339 timestamps.
fn format_duration(start: &str, end: &str) -> Option<String> {
    let start = DateTime::parse_from_rfc3339(start).ok()?;
    let end = DateTime::parse_from_rfc3339(end).ok()?;
    let secs = (end - start).num_seconds();
    if secs < 0 {
        return None;
    }
    Some(format!("{}m {}s", secs / 60, secs % 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-12-11T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn workflow_run(status: &str, conclusion: Option<&str>) -> Value {
        json!({
            "action": "completed",
            "workflow_run": {
                "name": "CI",
                "status": status,
                "conclusion": conclusion,
                "head_branch": "main",
                "head_sha": "0123456789abcdef",
                "html_url": "https://github.com/octo/widgets/actions/runs/1",
                "run_started_at": "2025-12-11T10:00:00Z",
                "updated_at": "2025-12-11T10:03:25Z"
            },
            "repository": {"name": "widgets", "full_name": "octo/widgets"},
            "sender": {"login": "octocat"}
        })
    }

    #[test]
    fn test_github_actions_failure_is_high() {
        let event = github_actions(&workflow_run("completed", Some("failure"))).unwrap();
        assert_eq!(event.kind, "github_actions");
        assert_eq!(event.title, "GitHub Actions: widgets");
        assert_eq!(event.message, "Workflow ❌ Failed");
        assert_eq!(event.priority, Priority::High);
        assert_eq!(event.details["commit"], "0123456");
        assert_eq!(event.details["duration"], "3m 25s");
    }

    #[test]
    fn test_github_actions_success_is_normal() {
        let event = github_actions(&workflow_run("completed", Some("success"))).unwrap();
        assert_eq!(event.message, "Workflow ✅ Success");
        assert_eq!(event.priority, Priority::Normal);
    }

    #[test]
    fn test_github_actions_in_progress() {
        let event = github_actions(&workflow_run("in_progress", None)).unwrap();
        assert_eq!(event.message, "Workflow 🔄 Running");
        assert!(event.details.get("conclusion").is_none());
    }

    #[test]
    fn test_github_actions_workflow_job() {
        let payload = json!({
            "workflow_job": {"name": "build", "status": "queued"},
            "repository": {"name": "widgets"}
        });
        let event = github_actions(&payload).unwrap();
        assert_eq!(event.message, "Workflow ⏳ Queued");
        assert_eq!(event.details["workflow"], "build");
    }

    #[test]
    fn test_github_actions_empty_payload_degrades() {
        let event = github_actions(&json!({})).unwrap();
        assert_eq!(event.title, "GitHub Actions: Unknown");
        assert_eq!(event.message, "Workflow unknown");
    }

    #[test]
    fn test_jenkins() {
        let payload = json!({
            "name": "nightly",
            "url": "job/nightly/",
            "build": {"number": 42, "status": "FAILURE", "duration": 1200}
        });
        let event = jenkins(&payload).unwrap();
        assert_eq!(event.title, "Jenkins: nightly");
        assert_eq!(event.message, "Build #42 - ❌ Failed");
        assert_eq!(event.priority, Priority::High);
        assert_eq!(event.details["build_number"], 42);

        let unstable = jenkins(&json!({"name": "n", "build": {"number": 1, "status": "UNSTABLE"}})).unwrap();
        assert_eq!(unstable.priority, Priority::Normal);
    }

    #[test]
    fn test_jenkins_missing_fields() {
        let event = jenkins(&json!({})).unwrap();
        assert_eq!(event.title, "Jenkins: Unknown");
        assert_eq!(event.message, "Build #? - unknown");
    }

    #[test]
    fn test_circleci() {
        let payload = json!({
            "project": {"name": "widgets"},
            "pipeline": {"id": "p-1", "vcs": {"branch": "main", "revision": "abcdef0123"}},
            "workflow": {"name": "build-test", "status": "failed"}
        });
        let event = circleci(&payload).unwrap();
        assert_eq!(event.title, "CircleCI: widgets");
        assert_eq!(event.message, "Pipeline ❌ Failed");
        assert_eq!(event.priority, Priority::High);
        assert_eq!(event.details["commit"], "abcdef0");
    }

    #[test]
    fn test_generic_fills_defaults() {
        let event = generic(&json!({})).unwrap();
        assert_eq!(event.title, "CI/CD Event");
        assert_eq!(event.message, "Pipeline notification received");
        assert_eq!(event.priority, Priority::Normal);
        assert_eq!(event.details["provider"], "unknown");
        assert_eq!(event.provider_id, "generic");
    }

    #[test]
    fn test_generic_uses_shaped_payload() {
        let event = generic(&json!({
            "title": "Drone: api",
            "message": "Build failed",
            "priority": "critical",
            "provider": "drone",
            "details": {"build": 9}
        }))
        .unwrap();
        assert_eq!(event.title, "Drone: api");
        assert_eq!(event.priority, Priority::Critical);
        assert_eq!(event.details["provider"], "drone");
        assert_eq!(event.details["build"], 9);
    }

    #[test]
    fn test_generic_unknown_priority_defaults_to_normal() {
        let event = generic(&json!({"priority": "p0"})).unwrap();
        assert_eq!(event.priority, Priority::Normal);
    }

    #[test]
    fn test_non_object_payload_recovers_as_high_error() {
        let result = normalize(CiProvider::Jenkins, &json!("just a string"), at());
        assert!(result.is_recovered());
        let event = result.into_event();
        assert_eq!(event.kind, "error");
        assert_eq!(event.family, Family::CiCd);
        assert_eq!(event.provider_id, "jenkins");
        assert_eq!(event.priority, Priority::High);
        assert_eq!(event.title, "Error processing jenkins event");
        assert_eq!(event.message, "payload must be a JSON object, got a string");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let payload = workflow_run("completed", Some("failure"));
        assert_eq!(
            normalize(CiProvider::GithubActions, &payload, at()),
            normalize(CiProvider::GithubActions, &payload, at())
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(
            format_duration("2025-12-11T10:00:00Z", "2025-12-11T11:01:05Z").as_deref(),
            Some("61m 5s")
        );
        assert!(format_duration("garbage", "2025-12-11T10:00:00Z").is_none());
        assert!(format_duration("2025-12-11T10:00:00Z", "2025-12-11T09:00:00Z").is_none());
    }
}
