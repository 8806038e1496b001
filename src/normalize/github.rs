//! Version-control (GitHub) event mappers.
//!
//! The caller declares the event kind in the `X-GitHub-Event` header, so no
//! detection is needed: [`GithubEventKind::from_header`] picks the mapper.

use super::{
    into_details, merge_details, require_object, require_str, str_at, text_at,
    value_at, NormalizeError, Normalized,
};
use crate::event::{Event, Family, Priority};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::fmt;

/// Header declaring the event kind.
pub const EVENT_HEADER: &str = "x-github-event";

/// Provider ID stamped on every version-control event.
pub const PROVIDER_ID: &str = "github";

/// Release notes are cut to this many characters in event details.
const RELEASE_BODY_LIMIT: usize = 500;

/// Event kinds with a dedicated mapper.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GithubEventKind {
    Push,
    PullRequest,
    Issues,
    Release,
    /// Anything else, carrying the raw header value
    Other(String),
}

impl GithubEventKind {
    pub fn from_header(value: &str) -> Self {
        match value.trim() {
            "push" => GithubEventKind::Push,
            "pull_request" => GithubEventKind::PullRequest,
            "issues" => GithubEventKind::Issues,
            "release" => GithubEventKind::Release,
            other => GithubEventKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            GithubEventKind::Push => "push",
            GithubEventKind::PullRequest => "pull_request",
            GithubEventKind::Issues => "issues",
            GithubEventKind::Release => "release",
            GithubEventKind::Other(raw) => raw,
        }
    }
}

impl fmt::Display for GithubEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize a version-control payload. Never fails.
pub fn normalize(kind: &GithubEventKind, payload: &Value, received_at: DateTime<Utc>) -> Normalized {
    let result = match kind {
        GithubEventKind::Push => push(payload),
        GithubEventKind::PullRequest => pull_request(payload),
        GithubEventKind::Issues => issues(payload),
        GithubEventKind::Release => release(payload),
        GithubEventKind::Other(raw) => Ok(unknown(raw, payload)),
    };

    Normalized::from_result(result.map(|e| e.with_received_at(received_at)), |error| {
        Event::new(
            Family::VersionControl,
            PROVIDER_ID,
            "error",
            format!("Error processing {}", kind),
            error.to_string(),
        )
        .with_priority(Priority::High)
        .with_received_at(received_at)
    })
}

fn event(kind: &str, title: String, message: String) -> Event {
    Event::new(Family::VersionControl, PROVIDER_ID, kind, title, message)
}

/// `push`: one event per push, summarizing the commits.
pub fn push(payload: &Value) -> Result<Event, NormalizeError> {
    let repo_name = require_str(payload, &["repository", "name"])?;
    let sender = require_str(payload, &["sender", "login"])?;
    let git_ref = require_str(payload, &["ref"])?;
    let branch = git_ref.strip_prefix("refs/heads/").unwrap_or(git_ref);

    let commits: Vec<Value> = value_at(payload, &["commits"])
        .and_then(Value::as_array)
        .map(|commits| {
            commits
                .iter()
                .map(|c| {
                    json!({
                        "message": str_at(c, &["message"]).unwrap_or(""),
                        "author": str_at(c, &["author", "name"]).unwrap_or("unknown"),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    let commit_count = commits.len();

    let details = into_details(json!({
        "repository": str_at(payload, &["repository", "full_name"]),
        "branch": branch,
        "commits": commits,
        "sender": sender,
        "url": str_at(payload, &["repository", "html_url"]),
    }));

    Ok(event(
        "push",
        format!("Push to {}/{}", repo_name, branch),
        format!("{} pushed {} commit(s) to {}", sender, commit_count, branch),
    )
    .with_details(details)
    .with_priority(Priority::Normal))
}

/// `pull_request`: opened PRs escalate to high.
pub fn pull_request(payload: &Value) -> Result<Event, NormalizeError> {
    let pr = require_object(payload, &["pull_request"])?;
    let number = text_at(pr, &["number"])
        .ok_or_else(|| NormalizeError::MissingField("pull_request.number".to_string()))?;
    let repo_name = require_str(payload, &["repository", "name"])?;
    let sender = require_str(payload, &["sender", "login"])?;
    let action = str_at(payload, &["action"]).unwrap_or("unknown");
    let pr_title = str_at(pr, &["title"]).unwrap_or("");
    let merged = value_at(pr, &["merged"]).and_then(Value::as_bool).unwrap_or(false);

    let description = match action {
        "opened" => format!("opened PR #{}: {}", number, pr_title),
        "closed" if merged => format!("merged PR #{}", number),
        "closed" => format!("closed PR #{}", number),
        "synchronize" => format!("updated PR #{}", number),
        "review_requested" => format!("requested review on PR #{}", number),
        other => other.to_string(),
    };

    let details = into_details(json!({
        "repository": str_at(payload, &["repository", "full_name"]),
        "pr_number": value_at(pr, &["number"]),
        "pr_title": pr_title,
        "pr_url": str_at(pr, &["html_url"]),
        "action": action,
        "merged": merged,
        "sender": sender,
        "base": str_at(pr, &["base", "ref"]),
        "head": str_at(pr, &["head", "ref"]),
    }));

    Ok(event(
        "pull_request",
        format!("PR {}: {}", action, repo_name),
        format!("{} {}", sender, description),
    )
    .with_details(details)
    .with_priority(opened_is_high(action)))
}

/// `issues`: opened issues escalate to high.
pub fn issues(payload: &Value) -> Result<Event, NormalizeError> {
    let issue = require_object(payload, &["issue"])?;
    let number = text_at(issue, &["number"])
        .ok_or_else(|| NormalizeError::MissingField("issue.number".to_string()))?;
    let repo_name = require_str(payload, &["repository", "name"])?;
    let sender = require_str(payload, &["sender", "login"])?;
    let action = str_at(payload, &["action"]).unwrap_or("unknown");
    let issue_title = str_at(issue, &["title"]).unwrap_or("");

    let labels: Vec<&str> = value_at(issue, &["labels"])
        .and_then(Value::as_array)
        .map(|labels| labels.iter().filter_map(|l| str_at(l, &["name"])).collect())
        .unwrap_or_default();

    let details = into_details(json!({
        "repository": str_at(payload, &["repository", "full_name"]),
        "issue_number": value_at(issue, &["number"]),
        "issue_title": issue_title,
        "issue_url": str_at(issue, &["html_url"]),
        "action": action,
        "labels": labels,
        "sender": sender,
    }));

    Ok(event(
        "issue",
        format!("Issue {}: {}", action, repo_name),
        format!("{} {} issue #{}: {}", sender, action, number, issue_title),
    )
    .with_details(details)
    .with_priority(opened_is_high(action)))
}

/// `release`: always high.
pub fn release(payload: &Value) -> Result<Event, NormalizeError> {
    let rel = require_object(payload, &["release"])?;
    let tag = require_str(rel, &["tag_name"])?;
    let repo_name = require_str(payload, &["repository", "name"])?;
    let sender = require_str(payload, &["sender", "login"])?;
    let action = str_at(payload, &["action"]).unwrap_or("unknown");
    let name = str_at(rel, &["name"]).unwrap_or(tag);
    let body: Option<String> =
        str_at(rel, &["body"]).map(|b| b.chars().take(RELEASE_BODY_LIMIT).collect());

    let details = into_details(json!({
        "repository": str_at(payload, &["repository", "full_name"]),
        "tag": tag,
        "name": str_at(rel, &["name"]),
        "prerelease": value_at(rel, &["prerelease"]),
        "draft": value_at(rel, &["draft"]),
        "url": str_at(rel, &["html_url"]),
        "body": body,
        "sender": sender,
    }));

    Ok(event(
        "release",
        format!("Release {}: {}", action, repo_name),
        format!("{} {} release {}: {}", sender, action, tag, name),
    )
    .with_details(details)
    .with_priority(Priority::High))
}

/// Fallback for event kinds without a mapper.
///
/// Honors an already-shaped payload (`title`, `message`, `details`,
/// `priority`) and otherwise reports the kind as unhandled with low priority.
pub fn unknown(kind: &str, payload: &Value) -> Event {
    let kind_label = if kind.is_empty() { "unknown" } else { kind };
    let title = str_at(payload, &["title"])
        .map(str::to_string)
        .unwrap_or_else(|| format!("Unknown event: {}", kind_label));
    let message = str_at(payload, &["message"])
        .map(str::to_string)
        .unwrap_or_else(|| format!("Received unhandled event type: {}", kind_label));
    let priority = str_at(payload, &["priority"])
        .and_then(Priority::parse)
        .unwrap_or(Priority::Low);

    let details = merge_details(
        into_details(json!({ "event": kind_label })),
        value_at(payload, &["details"]),
    );

    event("unknown", title, message)
        .with_details(details)
        .with_priority(priority)
}

fn opened_is_high(action: &str) -> Priority {
    if action == "opened" {
        Priority::High
    } else {
        Priority::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_payload(commits: usize) -> Value {
        let commits: Vec<Value> = (0..commits)
            .map(|i| json!({"message": format!("commit {}", i), "author": {"name": "Mona"}}))
            .collect();
        json!({
            "ref": "refs/heads/main",
            "repository": {
                "name": "widgets",
                "full_name": "octo/widgets",
                "html_url": "https://github.com/octo/widgets"
            },
            "sender": {"login": "octocat"},
            "commits": commits
        })
    }

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-12-11T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_kind_from_header() {
        assert_eq!(GithubEventKind::from_header("push"), GithubEventKind::Push);
        assert_eq!(GithubEventKind::from_header("issues"), GithubEventKind::Issues);
        assert_eq!(
            GithubEventKind::from_header("ping"),
            GithubEventKind::Other("ping".to_string())
        );
    }

    #[test]
    fn test_push() {
        let event = push(&push_payload(3)).unwrap();
        assert_eq!(event.kind, "push");
        assert_eq!(event.title, "Push to widgets/main");
        assert_eq!(event.message, "octocat pushed 3 commit(s) to main");
        assert_eq!(event.priority, Priority::Normal);
        assert_eq!(event.details["branch"], "main");
        assert_eq!(event.details["commits"].as_array().unwrap().len(), 3);
        assert_eq!(event.details["commits"][0]["author"], "Mona");
    }

    #[test]
    fn test_push_without_commits() {
        let mut payload = push_payload(0);
        payload.as_object_mut().unwrap().remove("commits");
        let event = push(&payload).unwrap();
        assert_eq!(event.message, "octocat pushed 0 commit(s) to main");
    }

    #[test]
    fn test_push_tag_ref_kept_verbatim() {
        let mut payload = push_payload(1);
        payload["ref"] = json!("refs/tags/v1.0");
        let event = push(&payload).unwrap();
        assert_eq!(event.details["branch"], "refs/tags/v1.0");
    }

    #[test]
    fn test_push_missing_repository_is_error() {
        let payload = json!({"ref": "refs/heads/main", "sender": {"login": "x"}});
        assert_eq!(
            push(&payload),
            Err(NormalizeError::MissingField("repository.name".to_string()))
        );
    }

    #[test]
    fn test_pull_request_actions() {
        let payload = |action: &str, merged: bool| {
            json!({
                "action": action,
                "pull_request": {
                    "number": 7,
                    "title": "Add gears",
                    "merged": merged,
                    "base": {"ref": "main"},
                    "head": {"ref": "gears"}
                },
                "repository": {"name": "widgets", "full_name": "octo/widgets"},
                "sender": {"login": "octocat"}
            })
        };

        let opened = pull_request(&payload("opened", false)).unwrap();
        assert_eq!(opened.title, "PR opened: widgets");
        assert_eq!(opened.message, "octocat opened PR #7: Add gears");
        assert_eq!(opened.priority, Priority::High);
        assert_eq!(opened.details["base"], "main");

        let merged = pull_request(&payload("closed", true)).unwrap();
        assert_eq!(merged.message, "octocat merged PR #7");
        assert_eq!(merged.priority, Priority::Normal);

        let closed = pull_request(&payload("closed", false)).unwrap();
        assert_eq!(closed.message, "octocat closed PR #7");

        let labeled = pull_request(&payload("labeled", false)).unwrap();
        assert_eq!(labeled.message, "octocat labeled");
    }

    #[test]
    fn test_issues() {
        let payload = json!({
            "action": "opened",
            "issue": {
                "number": 12,
                "title": "Broken gear",
                "labels": [{"name": "bug"}, {"name": "p1"}]
            },
            "repository": {"name": "widgets"},
            "sender": {"login": "hubot"}
        });
        let event = issues(&payload).unwrap();
        assert_eq!(event.kind, "issue");
        assert_eq!(event.message, "hubot opened issue #12: Broken gear");
        assert_eq!(event.priority, Priority::High);
        assert_eq!(event.details["labels"], json!(["bug", "p1"]));
    }

    #[test]
    fn test_release() {
        let long_body = "x".repeat(800);
        let payload = json!({
            "action": "published",
            "release": {"tag_name": "v2.0.0", "name": null, "body": long_body},
            "repository": {"name": "widgets"},
            "sender": {"login": "octocat"}
        });
        let event = release(&payload).unwrap();
        assert_eq!(event.message, "octocat published release v2.0.0: v2.0.0");
        assert_eq!(event.priority, Priority::High);
        assert_eq!(event.details["body"].as_str().unwrap().len(), RELEASE_BODY_LIMIT);
        assert!(event.details.get("name").is_none());
    }

    #[test]
    fn test_unknown_kind_is_low() {
        let event = unknown("ping", &json!({"zen": "Keep it logically awesome."}));
        assert_eq!(event.kind, "unknown");
        assert_eq!(event.title, "Unknown event: ping");
        assert_eq!(event.priority, Priority::Low);
        assert_eq!(event.provider_id, PROVIDER_ID);
    }

    #[test]
    fn test_unknown_kind_honors_shaped_payload() {
        let event = unknown(
            "custom",
            &json!({"title": "Custom", "message": "Hello", "priority": "high", "details": {"k": 1}}),
        );
        assert_eq!(event.title, "Custom");
        assert_eq!(event.message, "Hello");
        assert_eq!(event.priority, Priority::High);
        assert_eq!(event.details["k"], 1);
        assert_eq!(event.details["event"], "custom");
    }

    #[test]
    fn test_normalize_recovers_with_high_error_event() {
        let result = normalize(&GithubEventKind::Release, &json!({"action": "published"}), at());
        assert!(result.is_recovered());
        let event = result.event();
        assert_eq!(event.kind, "error");
        assert_eq!(event.family, Family::VersionControl);
        assert_eq!(event.provider_id, PROVIDER_ID);
        assert_eq!(event.priority, Priority::High);
        assert_eq!(event.title, "Error processing release");
        assert!(event.message.contains("release"));
        assert_eq!(event.received_at, at());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let payload = push_payload(2);
        let first = normalize(&GithubEventKind::Push, &payload, at());
        let second = normalize(&GithubEventKind::Push, &payload, at());
        assert_eq!(first, second);
    }

    #[test]
    fn test_well_formed_payloads_satisfy_invariants() {
        let cases = [
            (GithubEventKind::Push, push_payload(1)),
            (GithubEventKind::Other("star".to_string()), json!({})),
            (GithubEventKind::Issues, json!({"issue": {"number": 1}})),
        ];
        for (kind, payload) in cases {
            let event = normalize(&kind, &payload, at()).into_event();
            assert!(!event.title.trim().is_empty());
            assert!(!event.message.trim().is_empty());
        }
    }
}
