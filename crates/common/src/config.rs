//! Common configuration types for the interview client.

use serde::{Deserialize, Serialize};

/// Default log filter directive when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "interview_client=info";

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log filter directive (`tracing_subscriber::EnvFilter` syntax)
    pub log_filter: String,
    /// Enable JSON-formatted logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            json_logs: false,
        }
    }
}
