//! Allow-list gate on a recognised identity.

use crate::recognition::Identity;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Names allowed through when no allow-list is configured.
pub const DEFAULT_AUTHORIZED: &[&str] = &["Person 1"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum AccessDecision {
    Granted { name: String },
    Denied,
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted { .. })
    }
}

impl fmt::Display for AccessDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessDecision::Granted { name } => write!(f, "Access granted to {name}"),
            AccessDecision::Denied => f.write_str("Access denied"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccessPolicy {
    authorized: BTreeSet<String>,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_AUTHORIZED.iter().copied())
    }
}

impl AccessPolicy {
    pub fn new<I, S>(authorized: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            authorized: authorized.into_iter().map(Into::into).collect(),
        }
    }

    pub fn authorized(&self) -> impl Iterator<Item = &str> {
        self.authorized.iter().map(String::as_str)
    }

    /// Exact, case-sensitive name match. `Unknown` is never granted.
    pub fn decide(&self, identity: &Identity) -> AccessDecision {
        let decision = match identity {
            Identity::Known(name) if self.authorized.contains(name) => AccessDecision::Granted {
                name: name.clone(),
            },
            _ => AccessDecision::Denied,
        };
        tracing::info!(identity = %identity, granted = decision.is_granted(), "access decision");
        decision
    }
}
