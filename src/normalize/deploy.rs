//! Deployment notification mappers.
//!
//! Failed deployments are `critical`: a broken production deploy outranks
//! a failed CI build.

use super::{
    as_object, display_status, into_details, merge_details, short_sha, str_at, text_at, value_at,
    NormalizeError, Normalized,
};
use crate::detect::DeployPlatform;
use crate::event::{Event, Family, Priority};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

const VERCEL_STATUS: &[(&str, &str)] = &[
    ("ready", "✅ Deployed"),
    ("building", "🔄 Building"),
    ("queued", "⏳ Queued"),
    ("error", "❌ Failed"),
    ("canceled", "🚫 Cancelled"),
];

const NETLIFY_STATUS: &[(&str, &str)] = &[
    ("ready", "✅ Deployed"),
    ("building", "🔄 Building"),
    ("error", "❌ Failed"),
    ("enqueued", "⏳ Queued"),
];

const RENDER_STATUS: &[(&str, &str)] = &[
    ("live", "✅ Live"),
    ("build_failed", "❌ Build Failed"),
    ("deploy_failed", "❌ Deploy Failed"),
    ("building", "🔄 Building"),
    ("queued", "⏳ Queued"),
];

const RAILWAY_STATUS: &[(&str, &str)] = &[
    ("SUCCESS", "✅ Deployed"),
    ("FAILED", "❌ Failed"),
    ("CRASHED", "💥 Crashed"),
    ("BUILDING", "🔄 Building"),
    ("DEPLOYING", "🔄 Deploying"),
];

const AWS_STATUS: &[(&str, &str)] = &[
    ("SUCCEEDED", "✅ Succeeded"),
    ("FAILED", "❌ Failed"),
    ("STOPPED", "🚫 Stopped"),
    ("START", "🔄 Started"),
];

const FLY_STATUS: &[(&str, &str)] = &[
    ("succeeded", "✅ Deployed"),
    ("failed", "❌ Failed"),
    ("running", "🔄 Running"),
];

/// Normalize a deployment payload for the detected platform. Never fails.
pub fn normalize(platform: DeployPlatform, payload: &Value, received_at: DateTime<Utc>) -> Normalized {
    let result = match platform {
        DeployPlatform::Vercel => vercel(payload),
        DeployPlatform::Netlify => netlify(payload),
        DeployPlatform::Render => render(payload),
        DeployPlatform::Railway => railway(payload),
        DeployPlatform::Aws => aws(payload),
        DeployPlatform::Fly => fly(payload),
        DeployPlatform::Generic => generic(payload),
    };

    Normalized::from_result(result.map(|e| e.with_received_at(received_at)), |error| {
        Event::new(
            Family::Deploy,
            platform.as_str(),
            "error",
            format!("Error processing {} deploy event", platform),
            error.to_string(),
        )
        .with_priority(Priority::Critical)
        .with_received_at(received_at)
    })
}

fn failure_is_critical(failed: bool) -> Priority {
    if failed {
        Priority::Critical
    } else {
        Priority::Normal
    }
}

fn deployment(platform: DeployPlatform, kind: &str, title: String, message: String) -> Event {
    Event::new(Family::Deploy, platform.as_str(), kind, title, message)
}

/// Vercel `deployment.*` webhooks.
pub fn vercel(payload: &Value) -> Result<Event, NormalizeError> {
    as_object(payload)?;

    let deploy = &payload["payload"]["deployment"];
    let status = str_at(deploy, &["state"]).unwrap_or("unknown");
    let project = str_at(payload, &["payload", "name"])
        .or_else(|| str_at(deploy, &["name"]))
        .unwrap_or("Unknown");

    let details = into_details(json!({
        "platform": DeployPlatform::Vercel.as_str(),
        "project": str_at(payload, &["payload", "name"]),
        "deployment_id": str_at(deploy, &["id"]),
        "url": str_at(deploy, &["url"]),
        "status": status,
        "branch": str_at(deploy, &["meta", "githubCommitRef"]),
        "commit": str_at(deploy, &["meta", "githubCommitSha"]).map(short_sha),
        "commit_message": str_at(deploy, &["meta", "githubCommitMessage"]),
        "environment": str_at(deploy, &["target"]),
        "created_at": value_at(deploy, &["created"]),
    }));

    Ok(deployment(
        DeployPlatform::Vercel,
        "vercel",
        format!("Vercel: {}", project),
        format!("Deployment {}", display_status(VERCEL_STATUS, status)),
    )
    .with_details(details)
    .with_priority(failure_is_critical(status == "error")))
}

/// Netlify deploy notifications.
pub fn netlify(payload: &Value) -> Result<Event, NormalizeError> {
    as_object(payload)?;

    let state = str_at(payload, &["state"]).unwrap_or("unknown");
    let name = str_at(payload, &["name"]).unwrap_or("Unknown");

    let details = into_details(json!({
        "platform": DeployPlatform::Netlify.as_str(),
        "project": str_at(payload, &["name"]),
        "url": str_at(payload, &["deploy_ssl_url"]).or_else(|| str_at(payload, &["url"])),
        "status": state,
        "branch": str_at(payload, &["branch"]),
        "commit": str_at(payload, &["commit_ref"]).map(short_sha),
        "error_message": str_at(payload, &["error_message"]),
    }));

    Ok(deployment(
        DeployPlatform::Netlify,
        "netlify",
        format!("Netlify: {}", name),
        format!("Deployment {}", display_status(NETLIFY_STATUS, state)),
    )
    .with_details(details)
    .with_priority(failure_is_critical(state == "error")))
}

/// Render deploy webhooks. Any `*failed*` status is critical.
pub fn render(payload: &Value) -> Result<Event, NormalizeError> {
    as_object(payload)?;

    let status = str_at(payload, &["deploy", "status"]).unwrap_or("unknown");
    let service = str_at(payload, &["service", "name"]).unwrap_or("Unknown");

    let details = into_details(json!({
        "platform": DeployPlatform::Render.as_str(),
        "service": str_at(payload, &["service", "name"]),
        "service_type": str_at(payload, &["service", "type"]),
        "url": str_at(payload, &["service", "serviceDetails", "url"]),
        "status": status,
        "commit": str_at(payload, &["deploy", "commit"]).map(short_sha),
        "branch": str_at(payload, &["deploy", "branch"]),
    }));

    Ok(deployment(
        DeployPlatform::Render,
        "render",
        format!("Render: {}", service),
        format!("Deployment {}", display_status(RENDER_STATUS, status)),
    )
    .with_details(details)
    .with_priority(failure_is_critical(status.contains("failed"))))
}

/// Railway deployment webhooks.
pub fn railway(payload: &Value) -> Result<Event, NormalizeError> {
    as_object(payload)?;

    let status = str_at(payload, &["deployment", "status"])
        .or_else(|| str_at(payload, &["status"]))
        .unwrap_or("unknown");
    let service = str_at(payload, &["service", "name"]).unwrap_or("Unknown");

    let details = into_details(json!({
        "platform": DeployPlatform::Railway.as_str(),
        "service": str_at(payload, &["service", "name"]),
        "deployment_id": str_at(payload, &["deployment", "id"]),
        "status": status,
        "url": str_at(payload, &["deployment", "url"]),
        "environment": str_at(payload, &["deployment", "environment"])
            .or_else(|| str_at(payload, &["environment", "name"])),
    }));

    Ok(deployment(
        DeployPlatform::Railway,
        "railway",
        format!("Railway: {}", service),
        format!("Deployment {}", display_status(RAILWAY_STATUS, status)),
    )
    .with_details(details)
    .with_priority(failure_is_critical(status == "FAILED")))
}

/// AWS CodeDeploy state-change notifications (via EventBridge).
pub fn aws(payload: &Value) -> Result<Event, NormalizeError> {
    as_object(payload)?;

    let status = str_at(payload, &["detail", "state"])
        .or_else(|| str_at(payload, &["detail", "status"]))
        .unwrap_or("unknown");
    let application = str_at(payload, &["detail", "application"])
        .or_else(|| str_at(payload, &["detail", "applicationName"]))
        .unwrap_or("Unknown");

    let details = into_details(json!({
        "platform": "aws_codedeploy",
        "application": application,
        "deployment_group": str_at(payload, &["detail", "deploymentGroup"])
            .or_else(|| str_at(payload, &["detail", "deploymentGroupName"])),
        "deployment_id": str_at(payload, &["detail", "deploymentId"]),
        "status": status,
        "region": str_at(payload, &["region"]),
        "time": str_at(payload, &["time"]),
    }));

    Ok(deployment(
        DeployPlatform::Aws,
        "aws_codedeploy",
        format!("AWS: {}", application),
        format!("Deployment {}", display_status(AWS_STATUS, status)),
    )
    .with_details(details)
    .with_priority(failure_is_critical(status == "FAILED")))
}

/// Fly.io deployment webhooks.
pub fn fly(payload: &Value) -> Result<Event, NormalizeError> {
    as_object(payload)?;

    let status = str_at(payload, &["event_type"]).unwrap_or("unknown");
    let app = str_at(payload, &["data", "app", "name"]).unwrap_or("Unknown");

    let details = into_details(json!({
        "platform": DeployPlatform::Fly.as_str(),
        "app": str_at(payload, &["data", "app", "name"]),
        "status": status,
        "release": text_at(payload, &["data", "release", "version"]),
        "url": str_at(payload, &["data", "app", "hostname"]).map(|h| format!("https://{}", h)),
    }));

    Ok(deployment(
        DeployPlatform::Fly,
        "fly",
        format!("Fly.io: {}", app),
        format!("Deployment {}", display_status(FLY_STATUS, status)),
    )
    .with_details(details)
    .with_priority(failure_is_critical(status == "failed")))
}

/// Already-shaped payloads from unrecognized platforms.
pub fn generic(payload: &Value) -> Result<Event, NormalizeError> {
    as_object(payload)?;

    let details = merge_details(
        into_details(json!({
            "platform": str_at(payload, &["platform"]).unwrap_or("unknown"),
            "status": value_at(payload, &["status"]),
            "url": value_at(payload, &["url"]),
            "environment": value_at(payload, &["environment"]),
        })),
        value_at(payload, &["details"]),
    );
    let priority = str_at(payload, &["priority"])
        .and_then(Priority::parse)
        .unwrap_or(Priority::Normal);

    Ok(deployment(
        DeployPlatform::Generic,
        "generic",
        str_at(payload, &["title"]).unwrap_or("Deployment Event").to_string(),
        str_at(payload, &["message"])
            .unwrap_or("Deployment notification received")
            .to_string(),
    )
    .with_details(details)
    .with_priority(priority))
}
