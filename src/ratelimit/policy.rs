//! Named rate limit policies.
//!
//! A policy is an immutable `{limit, window_ms}` pair. Endpoints refer to
//! policies by symbolic name; adding an endpoint category means adding an
//! entry to the table, never touching the check logic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::error::{QuotaGateError, Result};

/// Chat completion endpoints.
pub const AI_CHAT: &str = "AI_CHAT";
/// Bulk security scanning endpoints.
pub const SECURITY_SCAN: &str = "SECURITY_SCAN";
/// File upload endpoints.
pub const FILE_UPLOAD: &str = "FILE_UPLOAD";
/// Search endpoints.
pub const SEARCH: &str = "SEARCH";
/// Name reported for the fallback policy.
pub const DEFAULT: &str = "DEFAULT";

const MINUTE_MS: u64 = 60_000;

/// Maximum requests per fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Requests allowed per window
    pub limit: u64,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl Policy {
    /// Create a policy, rejecting values that could never admit a request.
    pub fn new(limit: u64, window_ms: u64) -> Result<Self> {
        let policy = Self { limit, window_ms };
        policy.validate("ad hoc")?;
        Ok(policy)
    }

    pub(crate) fn window_ms_i64(&self) -> i64 {
        i64::try_from(self.window_ms).unwrap_or(i64::MAX)
    }

    fn validate(&self, name: &str) -> Result<()> {
        let reason = if self.limit == 0 {
            "limit must be greater than zero"
        } else if self.window_ms == 0 {
            "window_ms must be greater than zero"
        } else {
            return Ok(());
        };
        Err(QuotaGateError::InvalidPolicy {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    }
}

/// The table of named policies plus the fallback for unclassified endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTable {
    /// Policy applied to names that are not in the table
    pub default: Policy,
    /// Named policies
    #[serde(default)]
    pub policies: BTreeMap<String, Policy>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PolicyTable {
    /// The built-in table used when no policy file is configured.
    pub fn builtin() -> Self {
        let per_minute = |limit| Policy {
            limit,
            window_ms: MINUTE_MS,
        };
        Self::new(per_minute(100))
            .with_policy(AI_CHAT, per_minute(20))
            .with_policy(SECURITY_SCAN, per_minute(30))
            .with_policy(FILE_UPLOAD, per_minute(10))
            .with_policy(SEARCH, per_minute(50))
    }

    /// An empty table with only a default policy.
    pub fn new(default: Policy) -> Self {
        Self {
            default,
            policies: BTreeMap::new(),
        }
    }

    /// Add or replace a named policy.
    pub fn with_policy(mut self, name: impl Into<String>, policy: Policy) -> Self {
        self.policies.insert(name.into(), policy);
        self
    }

    /// Look up a policy by name. `DEFAULT` always resolves.
    pub fn get(&self, name: &str) -> Option<Policy> {
        match self.policies.get(name) {
            Some(policy) => Some(*policy),
            None if name == DEFAULT => Some(self.default),
            None => None,
        }
    }

    /// Look up a policy by name, falling back to the default.
    pub fn resolve(&self, name: &str) -> Policy {
        self.get(name).unwrap_or(self.default)
    }

    /// Names of every configured policy, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    /// Check that every policy can admit at least one request.
    pub fn validate(&self) -> Result<()> {
        self.default.validate(DEFAULT)?;
        for (name, policy) in &self.policies {
            policy.validate(name)?;
        }
        Ok(())
    }

    /// Load a policy table from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit policies");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load a policy table from a YAML string and validate it.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let table: PolicyTable = serde_yaml::from_str(yaml).map_err(|e| {
            QuotaGateError::Config(format!("Failed to parse policy table: {}", e))
        })?;
        table.validate()?;
        Ok(table)
    }
}
