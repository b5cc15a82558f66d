//! Interview client configuration.
//!
//! Configuration is loaded from environment variables. Every field has a
//! default suitable for a local backend on port 8000.

use common::config::{ObservabilityConfig, DEFAULT_LOG_FILTER};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default backend gateway base address.
pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:8000";

/// Default participant name sent to `/generate-token`.
pub const DEFAULT_PARTICIPANT_NAME: &str = "candidate";

/// Default timeout for a single gateway request in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10;

/// Default timeout for the media room connect call in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 30;

/// Interview client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Backend gateway base address, without trailing slash.
    pub gateway_url: String,

    /// Fixed participant name for credential requests.
    pub participant_name: String,

    /// Timeout applied to each gateway request.
    pub request_timeout: Duration,

    /// Timeout applied to the media room connect call.
    pub connect_timeout: Duration,

    /// Publish the microphone as soon as the room is connected.
    pub microphone_on_connect: bool,

    /// Logging setup for the binary.
    pub observability: ObservabilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            participant_name: DEFAULT_PARTICIPANT_NAME.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECONDS),
            microphone_on_connect: false,
            observability: ObservabilityConfig::default(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let gateway_url = match vars.get("INTERVIEW_GATEWAY_URL") {
            Some(url) => parse_gateway_url(url)?,
            None => DEFAULT_GATEWAY_URL.to_string(),
        };

        let participant_name = match vars.get("INTERVIEW_PARTICIPANT_NAME") {
            Some(name) if name.trim().is_empty() => {
                return Err(invalid("INTERVIEW_PARTICIPANT_NAME", "must not be empty"));
            }
            Some(name) => name.trim().to_string(),
            None => DEFAULT_PARTICIPANT_NAME.to_string(),
        };

        let request_timeout = parse_seconds(
            vars,
            "INTERVIEW_REQUEST_TIMEOUT_SECONDS",
            DEFAULT_REQUEST_TIMEOUT_SECONDS,
        )?;

        let connect_timeout = parse_seconds(
            vars,
            "INTERVIEW_CONNECT_TIMEOUT_SECONDS",
            DEFAULT_CONNECT_TIMEOUT_SECONDS,
        )?;

        let microphone_on_connect = parse_bool(vars, "INTERVIEW_MICROPHONE_ON_CONNECT")?;

        let observability = ObservabilityConfig {
            log_filter: vars
                .get("RUST_LOG")
                .cloned()
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            json_logs: parse_bool(vars, "INTERVIEW_LOG_JSON")?,
        };

        Ok(Config {
            gateway_url,
            participant_name,
            request_timeout,
            connect_timeout,
            microphone_on_connect,
            observability,
        })
    }
}

fn invalid(var: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        var: var.to_string(),
        reason: reason.into(),
    }
}

fn parse_gateway_url(raw: &str) -> Result<String, ConfigError> {
    // Trailing slashes are dropped so endpoint paths can be appended directly.
    let url = raw.trim().trim_end_matches('/');
    let host = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .ok_or_else(|| {
            invalid(
                "INTERVIEW_GATEWAY_URL",
                "must start with http:// or https://",
            )
        })?;
    if host.is_empty() {
        return Err(invalid("INTERVIEW_GATEWAY_URL", "missing host"));
    }
    Ok(url.to_string())
}

fn parse_seconds(
    vars: &HashMap<String, String>,
    var: &str,
    default: u64,
) -> Result<Duration, ConfigError> {
    let secs = match vars.get(var) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))?,
        None => default,
    };
    if secs == 0 {
        return Err(invalid(var, "must be greater than zero"));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_bool(vars: &HashMap<String, String>, var: &str) -> Result<bool, ConfigError> {
    match vars.get(var).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off" | "") => Ok(false),
        Some(v) => Err(invalid(var, format!("expected a boolean, got {v:?}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("Config should load successfully");

        assert_eq!(config, Config::default());
        assert_eq!(config.gateway_url, "http://localhost:8000");
        assert_eq!(config.participant_name, "candidate");
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert!(!config.microphone_on_connect);
        assert!(!config.observability.json_logs);
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let vars = HashMap::from([
            (
                "INTERVIEW_GATEWAY_URL".to_string(),
                "https://interviews.example.com/".to_string(),
            ),
            (
                "INTERVIEW_PARTICIPANT_NAME".to_string(),
                "jordan".to_string(),
            ),
            (
                "INTERVIEW_REQUEST_TIMEOUT_SECONDS".to_string(),
                "3".to_string(),
            ),
            (
                "INTERVIEW_CONNECT_TIMEOUT_SECONDS".to_string(),
                "15".to_string(),
            ),
            (
                "INTERVIEW_MICROPHONE_ON_CONNECT".to_string(),
                "true".to_string(),
            ),
            ("INTERVIEW_LOG_JSON".to_string(), "1".to_string()),
            ("RUST_LOG".to_string(), "debug".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.gateway_url, "https://interviews.example.com");
        assert_eq!(config.participant_name, "jordan");
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.connect_timeout, Duration::from_secs(15));
        assert!(config.microphone_on_connect);
        assert!(config.observability.json_logs);
        assert_eq!(config.observability.log_filter, "debug");
    }

    #[test]
    fn test_gateway_url_requires_http_scheme() {
        let vars = HashMap::from([(
            "INTERVIEW_GATEWAY_URL".to_string(),
            "localhost:8000".to_string(),
        )]);

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue { var, .. }) if var == "INTERVIEW_GATEWAY_URL")
        );
    }

    #[test]
    fn test_gateway_url_requires_host() {
        let vars = HashMap::from([(
            "INTERVIEW_GATEWAY_URL".to_string(),
            "https://".to_string(),
        )]);

        assert!(Config::from_vars(&vars).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let vars = HashMap::from([(
            "INTERVIEW_CONNECT_TIMEOUT_SECONDS".to_string(),
            "0".to_string(),
        )]);

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue { var, .. }) if var == "INTERVIEW_CONNECT_TIMEOUT_SECONDS")
        );
    }

    #[test]
    fn test_non_numeric_timeout_rejected() {
        let vars = HashMap::from([(
            "INTERVIEW_REQUEST_TIMEOUT_SECONDS".to_string(),
            "ten".to_string(),
        )]);

        assert!(Config::from_vars(&vars).is_err());
    }

    #[test]
    fn test_invalid_boolean_rejected() {
        let vars = HashMap::from([(
            "INTERVIEW_MICROPHONE_ON_CONNECT".to_string(),
            "maybe".to_string(),
        )]);

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue { var, .. }) if var == "INTERVIEW_MICROPHONE_ON_CONNECT")
        );
    }

    #[test]
    fn test_blank_participant_name_rejected() {
        let vars = HashMap::from([(
            "INTERVIEW_PARTICIPANT_NAME".to_string(),
            "  ".to_string(),
        )]);

        assert!(Config::from_vars(&vars).is_err());
    }
}
