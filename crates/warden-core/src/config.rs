//! Configuration types for callwarden.
//!
//! Loaded from TOML. Every section has defaults, so a minimal file only
//! needs the monitored identities:
//!
//! ```toml
//! [policy]
//! monitored = ["alice@example.com", "bob@example.com"]
//! ```
//!
//! The platform token may be supplied through `CALLWARDEN_TOKEN`
//! instead of the file; the environment wins when both are set.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::error::WardenError;
use crate::Result;

/// Environment variable that overrides `platform.token`.
pub const TOKEN_ENV: &str = "CALLWARDEN_TOKEN";

/// Upper bound for the reconnect backoff.
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Co-presence policy.
    pub policy: PolicyConfig,

    /// Calling platform API.
    pub platform: PlatformConfig,

    /// Webhook relay inbox.
    pub relay: RelayConfig,

    /// Runtime tuning.
    pub runtime: RuntimeConfig,
}

/// Co-presence policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Email addresses of identities that must not share a call.
    pub monitored: Vec<String>,

    /// Monitored memberships in one call that constitute a violation.
    pub threshold: usize,

    /// Send a direct message after a successful termination.
    pub notify: bool,

    /// Text of that direct message.
    pub notice: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            monitored: Vec::new(),
            threshold: warden_monitor::MIN_THRESHOLD,
            notify: true,
            notice: "You were removed from a call because a compliance policy does not \
                     allow you to be in a call with another participant."
                .to_string(),
        }
    }
}

/// Calling platform API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Base URL of the REST API.
    pub api_base: String,

    /// Bearer token of an administrator account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_base: "https://webexapis.com/v1".to_string(),
            token: None,
            request_timeout_secs: 30,
        }
    }
}

impl PlatformConfig {
    /// Returns the token or a configuration error.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Config`] if no token is configured.
    pub fn token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                WardenError::Config(format!("no platform token (set platform.token or {TOKEN_ENV})"))
            })
    }

    /// Request timeout as a duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Relay inbox configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Base URL of the relay service.
    pub api_base: String,

    /// Seconds between keep-alive refreshes.
    pub keepalive_secs: u64,

    /// Reconnects after the stream ends. 0 stops on first stream end.
    pub reconnect_attempts: u32,

    /// First reconnect delay in milliseconds, doubled per attempt.
    pub reconnect_backoff_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_base: "http://api.webhookinbox.com".to_string(),
            keepalive_secs: 60,
            reconnect_attempts: 0,
            reconnect_backoff_ms: 1000,
        }
    }
}

/// Runtime tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Capacity of the decoded-event channel.
    pub event_buffer: usize,

    /// Largest stream record accepted, in bytes.
    pub max_record_bytes: usize,

    /// Delete all registered feeds on shutdown.
    pub cleanup_subscriptions: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer: 1024,
            max_record_bytes: warden_events::DEFAULT_MAX_RECORD_BYTES,
            cleanup_subscriptions: true,
        }
    }
}

/// How the stream pump reconnects after the stream ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive reconnects allowed.
    pub attempts: u32,
    /// Delay before the first reconnect.
    pub base_delay: Duration,
}

impl ReconnectPolicy {
    /// Never reconnect.
    pub const NEVER: Self = Self {
        attempts: 0,
        base_delay: Duration::ZERO,
    };

    /// Delay before reconnect number `attempt` (1-based), capped at 60s.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(factor)
            .min(MAX_RECONNECT_DELAY)
    }
}

impl WardenConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::ConfigParse`] on invalid TOML.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads, parses, applies the environment and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides using `lookup` to read variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(TOKEN_ENV).filter(|t| !t.is_empty()) {
            self.platform.token = Some(token);
        }
    }

    /// Checks the configuration for values the service cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let policy = &self.policy;
        if policy.monitored.is_empty() {
            return Err(WardenError::Config("policy.monitored is empty".to_string()));
        }
        let mut seen = HashSet::new();
        for email in &policy.monitored {
            if email.trim().is_empty() {
                return Err(WardenError::Config(
                    "policy.monitored contains an empty entry".to_string(),
                ));
            }
            if !seen.insert(email.to_ascii_lowercase()) {
                return Err(WardenError::Config(format!(
                    "policy.monitored lists {email} twice"
                )));
            }
        }
        if policy.threshold < warden_monitor::MIN_THRESHOLD {
            return Err(WardenError::Config(format!(
                "policy.threshold must be at least {}, got {}",
                warden_monitor::MIN_THRESHOLD,
                policy.threshold
            )));
        }
        if policy.notify && policy.notice.trim().is_empty() {
            return Err(WardenError::Config(
                "policy.notice is empty but policy.notify is enabled".to_string(),
            ));
        }
        if self.relay.keepalive_secs == 0 {
            return Err(WardenError::Config("relay.keepalive_secs must be > 0".to_string()));
        }
        if self.runtime.event_buffer == 0 {
            return Err(WardenError::Config("runtime.event_buffer must be > 0".to_string()));
        }
        if self.runtime.max_record_bytes < warden_events::PREAMBLE.len() {
            return Err(WardenError::Config(
                "runtime.max_record_bytes is too small".to_string(),
            ));
        }
        Ok(())
    }

    /// Keep-alive interval.
    #[must_use]
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.relay.keepalive_secs)
    }

    /// Reconnect policy for the stream pump.
    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            attempts: self.relay.reconnect_attempts,
            base_delay: Duration::from_millis(self.relay.reconnect_backoff_ms),
        }
    }

    /// Notification text, or `None` when notifications are disabled.
    #[must_use]
    pub fn notice(&self) -> Option<&str> {
        self.policy.notify.then_some(self.policy.notice.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal() -> WardenConfig {
        WardenConfig::from_toml_str(
            r#"
            [policy]
            monitored = ["a@example.com", "b@example.com"]
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = minimal();
        assert_eq!(config.policy.threshold, 2);
        assert!(config.policy.notify);
        assert_eq!(config.relay.keepalive_secs, 60);
        assert_eq!(config.relay.reconnect_attempts, 0);
        assert_eq!(config.runtime.event_buffer, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_monitored_rejected() {
        let config = WardenConfig::default();
        assert!(matches!(config.validate(), Err(WardenError::Config(_))));
    }

    #[test]
    fn test_duplicate_monitored_rejected() {
        let mut config = minimal();
        config.policy.monitored.push("A@example.com".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("twice"));
    }

    #[test]
    fn test_threshold_below_two_rejected() {
        let mut config = minimal();
        config.policy.threshold = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_keepalive_rejected() {
        let mut config = minimal();
        config.relay.keepalive_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_token_wins() {
        let mut config = WardenConfig::from_toml_str(
            r#"
            [policy]
            monitored = ["a@example.com"]
            [platform]
            token = "from-file"
            "#,
        )
        .unwrap();

        config.apply_env(|key| (key == TOKEN_ENV).then(|| "from-env".to_string()));
        assert_eq!(config.platform.token().unwrap(), "from-env");
    }

    #[test]
    fn test_missing_token_is_config_error() {
        let config = minimal();
        assert!(matches!(config.platform.token(), Err(WardenError::Config(_))));
    }

    #[test]
    fn test_invalid_toml() {
        let err = WardenConfig::from_toml_str("[policy\nmonitored = 3").unwrap_err();
        assert!(matches!(err, WardenError::ConfigParse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[policy]\nmonitored = [\"a@example.com\", \"b@example.com\"]\nthreshold = 3\n\
             [relay]\nreconnect_attempts = 2\nreconnect_backoff_ms = 250"
        )
        .unwrap();

        let config = WardenConfig::load(file.path()).unwrap();
        assert_eq!(config.policy.threshold, 3);
        assert_eq!(
            config.reconnect_policy(),
            ReconnectPolicy {
                attempts: 2,
                base_delay: Duration::from_millis(250),
            }
        );
    }

    #[test]
    fn test_reconnect_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy {
            attempts: 10,
            base_delay: Duration::from_secs(1),
        };
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(policy.delay(10), Duration::from_secs(60));
    }

    #[test]
    fn test_notice_disabled() {
        let mut config = minimal();
        config.policy.notify = false;
        assert!(config.notice().is_none());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = minimal();
        let text = toml::to_string(&config).unwrap();
        let parsed = WardenConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.policy.monitored, config.policy.monitored);
    }
}
