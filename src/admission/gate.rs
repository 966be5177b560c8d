//! Request admission: bot detection, per-role rate limiting and a shield
//! check for suspicious request shapes, in that order. Bot traffic is
//! classified before the rate check so it never consumes quota.

use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::users::repo::Role;

use super::limiter::SlidingWindow;

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Bot,
    RateLimit,
    Shield,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

/// What the gate sees of a request. `role` is None for unauthenticated
/// callers, which get the strictest limit.
#[derive(Debug)]
pub struct RequestProfile<'a> {
    pub identity: &'a str,
    pub role: Option<Role>,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

#[derive(Debug)]
pub struct RolePolicy {
    pub label: &'static str,
    pub limit: u32,
    pub message: &'static str,
}

// Extending role handling means adding a row here, not a new branch.
static POLICY_TABLE: [(Option<Role>, RolePolicy); 3] = [
    (
        Some(Role::Admin),
        RolePolicy {
            label: "admin",
            limit: 20,
            message: "Admin request limit exceeded (20 requests per minute).",
        },
    ),
    (
        Some(Role::User),
        RolePolicy {
            label: "user",
            limit: 10,
            message: "User request limit exceeded (10 requests per minute).",
        },
    ),
    (
        None,
        RolePolicy {
            label: "guest",
            limit: 5,
            message: "Guest request limit exceeded (5 requests per minute).",
        },
    ),
];

pub fn policy_for(role: Option<Role>) -> &'static RolePolicy {
    let (_, guest) = &POLICY_TABLE[POLICY_TABLE.len() - 1];
    POLICY_TABLE
        .iter()
        .find(|(r, _)| *r == role)
        .map(|(_, p)| p)
        .unwrap_or(guest)
}

/// Pluggable admission decision. The production [`Gate`] is
/// self-contained; tests substitute canned implementations.
#[async_trait]
pub trait AdmissionService: Send + Sync {
    async fn evaluate(&self, profile: &RequestProfile<'_>) -> anyhow::Result<Decision>;
}

/// Production gate: signature-based bot check, sliding-window rate limit
/// keyed on (identity, role), and a pattern shield.
pub struct Gate {
    limiter: SlidingWindow,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            limiter: SlidingWindow::new(WINDOW),
        }
    }

    /// Drop idle window buckets; intended to run periodically.
    pub fn prune(&self) {
        self.limiter.cleanup();
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

fn looks_like_bot(user_agent: Option<&str>) -> bool {
    lazy_static! {
        static ref BOT_RE: Regex = Regex::new(
            r"(?i)(bot|crawl|spider|scrape|curl|wget|python-requests|go-http-client|headless|phantomjs)"
        )
        .unwrap();
    }
    match user_agent {
        Some(ua) if !ua.trim().is_empty() => BOT_RE.is_match(ua),
        _ => true,
    }
}

fn looks_suspicious(path: &str, query: Option<&str>) -> bool {
    lazy_static! {
        static ref SHIELD_RE: Regex = Regex::new(
            r"(?i)(\.\./|%2e%2e%2f|<script|%3c\s*script|union(\s|\+|%20)+select|/etc/passwd|'\s*or\s+)"
        )
        .unwrap();
    }
    SHIELD_RE.is_match(path) || query.is_some_and(|q| SHIELD_RE.is_match(q))
}

#[async_trait]
impl AdmissionService for Gate {
    async fn evaluate(&self, profile: &RequestProfile<'_>) -> anyhow::Result<Decision> {
        if looks_like_bot(profile.user_agent) {
            return Ok(Decision::Deny(DenyReason::Bot));
        }

        let policy = policy_for(profile.role);
        let key = format!("{}|{}", profile.identity, policy.label);
        if !self.limiter.hit(&key, policy.limit) {
            return Ok(Decision::Deny(DenyReason::RateLimit));
        }

        if looks_suspicious(profile.path, profile.query) {
            return Ok(Decision::Deny(DenyReason::Shield));
        }

        debug!(
            key = %key,
            hits = self.limiter.active(&key),
            limit = policy.limit,
            "request admitted"
        );
        Ok(Decision::Allow)
    }
}
