mod credentials;
mod session;

pub use credentials::*;
pub use session::*;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    pub fn validate(&self) -> Vec<ConfigError> {
        self.session.validate()
    }
}

impl SessionConfig {
    /// Validate the session settings and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        match url::Url::parse(&self.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "session.base_url".into(),
                message: format!("scheme must be http or https, got {:?}", url.scheme()),
            }),
            Err(e) => errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "session.base_url".into(),
                message: format!("not a valid URL: {e}"),
            }),
        }

        if self.endpoint_timeout_ms == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "session.endpoint_timeout_ms".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.request_timeout_ms == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "session.request_timeout_ms".into(),
                message: "must be greater than 0".into(),
            });
        }

        // Zero still gets one attempt.
        if self.max_retries == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "session.max_retries".into(),
                message: "0 is treated as a single attempt".into(),
            });
        }

        errors
    }

    /// Fail with the first error-severity issue, if any.
    pub fn ensure_valid(&self) -> Result<()> {
        match self
            .validate()
            .into_iter()
            .find(|e| e.severity == ConfigSeverity::Error)
        {
            Some(issue) => Err(Error::Config(issue.to_string())),
            None => Ok(()),
        }
    }
}
