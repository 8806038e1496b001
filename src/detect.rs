//! Provider detection for CI/CD and deployment webhooks.
//!
//! Unlike version-control webhooks, which declare their event kind in a
//! header, CI/CD and deployment webhooks have to be classified from the
//! request itself. A [`Detector`] walks an ordered list of [`Rule`]s and
//! returns the provider of the first rule whose marker matches.
//!
//! # Rule Order
//!
//! ```text
//! Rule                         | Provider
//! -----------------------------|----------------
//! user-agent ~ "Vercel"        | vercel
//! body ~ "vercel"              | vercel
//! user-agent ~ "Netlify"       | netlify
//! body ~ "netlify"             | netlify
//! body ~ "render.com"          | render
//! ...                          | ...
//! (no match)                   | generic
//! ```
//!
//! A payload mentioning both "vercel" and "netlify" is classified as
//! vercel because that rule comes first.

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a rule looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Case-sensitive substring of the `User-Agent` header
    UserAgent(&'static str),
    /// Case-sensitive substring of the raw request body
    Body(&'static str),
}

impl Marker {
    fn matches(&self, user_agent: &str, body: &str) -> bool {
        match self {
            Marker::UserAgent(needle) => user_agent.contains(needle),
            Marker::Body(needle) => body.contains(needle),
        }
    }
}

/// A single `(marker, provider)` pair.
#[derive(Debug, Clone, Copy)]
pub struct Rule<P> {
    pub marker: Marker,
    pub provider: P,
}

impl<P> Rule<P> {
    pub const fn new(marker: Marker, provider: P) -> Self {
        Self { marker, provider }
    }
}

/// Ordered rule list with a guaranteed fallback.
#[derive(Debug, Clone, Copy)]
pub struct Detector<P: 'static> {
    rules: &'static [Rule<P>],
    fallback: P,
}

impl<P: Copy> Detector<P> {
    pub const fn new(rules: &'static [Rule<P>], fallback: P) -> Self {
        Self { rules, fallback }
    }

    /// Classify a request. Pure: same headers and body, same answer.
    pub fn detect(&self, headers: &HeaderMap, body: &str) -> P {
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        self.rules
            .iter()
            .find(|rule| rule.marker.matches(user_agent, body))
            .map(|rule| rule.provider)
            .unwrap_or(self.fallback)
    }
}

/// CI/CD providers with a dedicated mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiProvider {
    GithubActions,
    Jenkins,
    #[serde(rename = "circleci")]
    CircleCi,
    Generic,
}

impl CiProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            CiProvider::GithubActions => "github_actions",
            CiProvider::Jenkins => "jenkins",
            CiProvider::CircleCi => "circleci",
            CiProvider::Generic => "generic",
        }
    }
}

impl fmt::Display for CiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment platforms with a dedicated mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployPlatform {
    Vercel,
    Netlify,
    Render,
    Railway,
    Aws,
    Fly,
    Generic,
}

impl DeployPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployPlatform::Vercel => "vercel",
            DeployPlatform::Netlify => "netlify",
            DeployPlatform::Render => "render",
            DeployPlatform::Railway => "railway",
            DeployPlatform::Aws => "aws",
            DeployPlatform::Fly => "fly",
            DeployPlatform::Generic => "generic",
        }
    }
}

impl fmt::Display for DeployPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const CI_RULES: &[Rule<CiProvider>] = &[
    Rule::new(Marker::UserAgent("GitHub-Hookshot"), CiProvider::GithubActions),
    Rule::new(Marker::UserAgent("Jenkins"), CiProvider::Jenkins),
    Rule::new(Marker::UserAgent("CircleCI"), CiProvider::CircleCi),
];

const DEPLOY_RULES: &[Rule<DeployPlatform>] = &[
    Rule::new(Marker::UserAgent("Vercel"), DeployPlatform::Vercel),
    Rule::new(Marker::Body("vercel"), DeployPlatform::Vercel),
    Rule::new(Marker::UserAgent("Netlify"), DeployPlatform::Netlify),
    Rule::new(Marker::Body("netlify"), DeployPlatform::Netlify),
    Rule::new(Marker::Body("render.com"), DeployPlatform::Render),
    Rule::new(Marker::Body("railway.app"), DeployPlatform::Railway),
    Rule::new(Marker::Body("amazonaws.com"), DeployPlatform::Aws),
    Rule::new(Marker::Body("codedeploy"), DeployPlatform::Aws),
    Rule::new(Marker::Body("fly.io"), DeployPlatform::Fly),
];

/// Detector for `/webhooks/cicd`.
pub const CI_DETECTOR: Detector<CiProvider> = Detector::new(CI_RULES, CiProvider::Generic);

/// Detector for `/webhooks/deploy`.
pub const DEPLOY_DETECTOR: Detector<DeployPlatform> =
    Detector::new(DEPLOY_RULES, DeployPlatform::Generic);
