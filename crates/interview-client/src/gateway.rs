//! Backend gateway client.
//!
//! The backend issues room names and short-lived room access tokens over
//! two HTTP calls:
//!
//! - `POST /create-room` returns `{ room_name, created_at? }`
//! - `POST /generate-token?room=..&participant_name=..` returns
//!   `{ url, token, expires_in, room?, participant? }`
//!
//! `GET /health` is also available for diagnostics.
//!
//! # Security
//!
//! - Access tokens are wrapped in `SecretString` as soon as they are parsed
//! - Error bodies are logged at trace level only
//! - Errors carry client-safe messages via [`GatewayError::user_message`]

use crate::config::Config;

use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use common::types::RoomName;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument, trace, warn};

/// Connect timeout for the underlying TCP/TLS handshake.
const GATEWAY_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Errors from the backend gateway.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Transport failure (refused, reset, DNS).
    #[error("Gateway request failed: {0}")]
    Http(String),

    /// The gateway answered with a non-success status.
    #[error("Gateway returned HTTP {status} for {endpoint}")]
    Status { endpoint: &'static str, status: u16 },

    /// The response body was missing fields or not JSON.
    #[error("Invalid gateway response: {0}")]
    InvalidResponse(String),

    /// The request did not complete in time.
    #[error("Gateway request timed out after {0:?}")]
    Timeout(Duration),

    /// The client could not be constructed.
    #[error("Gateway client configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Message safe to show to the candidate.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Http(_) => "backend unavailable".to_string(),
            GatewayError::Status { status, .. } => format!("backend returned HTTP {status}"),
            GatewayError::InvalidResponse(_) => "backend returned an invalid response".to_string(),
            GatewayError::Timeout(timeout) => {
                format!("backend did not respond within {timeout:?}")
            }
            GatewayError::Configuration(_) => "client is misconfigured".to_string(),
        }
    }

    /// Bounded label for metrics.
    #[must_use]
    pub fn metric_label(&self) -> &'static str {
        match self {
            GatewayError::Http(_) => "http",
            GatewayError::Status { .. } => "status",
            GatewayError::InvalidResponse(_) => "invalid_response",
            GatewayError::Timeout(_) => "timeout",
            GatewayError::Configuration(_) => "configuration",
        }
    }
}

/// Room access credential for one connection attempt.
///
/// Deliberately not `Clone`: the controller owns it until it is handed to
/// `connect`, then drops it.
#[derive(Debug)]
pub struct Credential {
    /// Media server address the token is valid for.
    pub room_url: String,

    /// Signed room access token.
    pub access_token: SecretString,

    /// Token lifetime reported by the backend.
    pub expires_in: Option<Duration>,
}

/// Parsed `GET /health` response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayHealth {
    pub status: String,

    /// Media server the backend issues tokens for.
    #[serde(default, rename = "livekit_url")]
    pub media_url: Option<String>,

    #[serde(default)]
    pub api_key_configured: Option<bool>,

    #[serde(default)]
    pub api_secret_configured: Option<bool>,

    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateRoomResponse {
    room_name: String,
}

#[derive(Debug, Deserialize)]
struct GenerateTokenResponse {
    url: String,
    token: SecretString,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Source of room names and room credentials.
#[async_trait]
pub trait BackendGateway: Send + Sync {
    /// Ask the backend for a new, unique room name.
    async fn create_room(&self) -> Result<RoomName, GatewayError>;

    /// Ask the backend for a fresh access credential for `room`.
    async fn issue_credential(&self, room: &RoomName) -> Result<Credential, GatewayError>;
}

/// HTTP client for the backend gateway.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    participant_name: String,
    timeout: Duration,
}

impl std::fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGateway")
            .field("base_url", &self.base_url)
            .field("participant_name", &self.participant_name)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpGateway {
    /// Create a new gateway client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Backend base address without trailing slash (e.g., "http://localhost:8000")
    /// * `participant_name` - Fixed participant name sent with credential requests
    /// * `timeout` - Per-request timeout
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Configuration` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        participant_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(GATEWAY_CONNECT_TIMEOUT_SECS).min(timeout))
            .build()
            .map_err(|e| {
                error!(target: "interview.gateway", error = %e, "Failed to build HTTP client");
                GatewayError::Configuration(e.to_string())
            })?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            participant_name: participant_name.into(),
            timeout,
        })
    }

    /// Create a gateway client from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Configuration` if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, GatewayError> {
        Self::new(
            config.gateway_url.clone(),
            config.participant_name.clone(),
            config.request_timeout,
        )
    }

    /// Backend base address.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Query the backend health endpoint.
    ///
    /// # Errors
    ///
    /// Same error mapping as the session endpoints.
    #[instrument(skip_all)]
    pub async fn health(&self) -> Result<GatewayHealth, GatewayError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        Self::parse_json(response, "health").await
    }

    fn transport_error(&self, e: &reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            warn!(target: "interview.gateway", timeout = ?self.timeout, "Gateway request timed out");
            GatewayError::Timeout(self.timeout)
        } else {
            warn!(target: "interview.gateway", error = %e, "Gateway request failed");
            GatewayError::Http(e.to_string())
        }
    }

    /// Check the status and decode the body of a gateway response.
    async fn parse_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        endpoint: &'static str,
    ) -> Result<T, GatewayError> {
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(target: "interview.gateway", endpoint, status = %status, "Gateway returned error status");
            trace!(target: "interview.gateway", endpoint, body = %body, "Gateway error body");
            return Err(GatewayError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }

        response.json().await.map_err(|e| {
            warn!(target: "interview.gateway", endpoint, error = %e, "Failed to parse gateway response");
            GatewayError::InvalidResponse(format!("{endpoint}: {e}"))
        })
    }
}

#[async_trait]
impl BackendGateway for HttpGateway {
    #[instrument(skip_all)]
    async fn create_room(&self) -> Result<RoomName, GatewayError> {
        let url = format!("{}/create-room", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let body: CreateRoomResponse = Self::parse_json(response, "create-room").await?;
        let room = RoomName::new(body.room_name);
        if room.is_empty() {
            return Err(GatewayError::InvalidResponse(
                "create-room: empty room_name".to_string(),
            ));
        }

        debug!(target: "interview.gateway", room = %room, "Room name issued");
        Ok(room)
    }

    #[instrument(skip_all, fields(room = %room))]
    async fn issue_credential(&self, room: &RoomName) -> Result<Credential, GatewayError> {
        let url = format!("{}/generate-token", self.base_url);

        let response = self
            .client
            .post(&url)
            .query(&[
                ("room", room.as_str()),
                ("participant_name", self.participant_name.as_str()),
            ])
            .header("Content-Type", "application/x-www-form-urlencoded")
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let body: GenerateTokenResponse = Self::parse_json(response, "generate-token").await?;
        if body.url.trim().is_empty() {
            return Err(GatewayError::InvalidResponse(
                "generate-token: empty url".to_string(),
            ));
        }
        if body.token.expose_secret().is_empty() {
            return Err(GatewayError::InvalidResponse(
                "generate-token: empty token".to_string(),
            ));
        }

        debug!(
            target: "interview.gateway",
            media_url = %body.url,
            expires_in = ?body.expires_in,
            "Room credential issued"
        );

        Ok(Credential {
            room_url: body.url,
            access_token: body.token,
            expires_in: body.expires_in.map(Duration::from_secs),
        })
    }
}

/// Mock gateway for testing.
pub mod mock {
    use super::{BackendGateway, Credential, GatewayError};

    use async_trait::async_trait;
    use common::secret::SecretString;
    use common::types::RoomName;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Media URL returned by every mock credential.
    pub const MOCK_MEDIA_URL: &str = "wss://media.mock.local";

    /// Token lifetime returned by every mock credential.
    pub const MOCK_EXPIRES_IN_SECS: u64 = 21_600;

    /// Mock gateway that issues `interview-mock-N` rooms and
    /// `mock-token-N` tokens.
    #[derive(Debug, Default)]
    pub struct MockGateway {
        room_error: Option<GatewayError>,
        credential_error: Option<GatewayError>,
        room_gate: Option<Arc<Notify>>,
        hang_credential: bool,
        room_requests: AtomicUsize,
        credential_requests: AtomicUsize,
        last_room_requested: Mutex<Option<RoomName>>,
    }

    impl MockGateway {
        /// Create a mock gateway where every call succeeds.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail `create_room` with the given error.
        #[must_use]
        pub fn failing_room_creation(mut self, error: GatewayError) -> Self {
            self.room_error = Some(error);
            self
        }

        /// Fail `issue_credential` with the given error.
        #[must_use]
        pub fn failing_credential(mut self, error: GatewayError) -> Self {
            self.credential_error = Some(error);
            self
        }

        /// Block `create_room` until the gate is notified.
        #[must_use]
        pub fn with_room_gate(mut self, gate: Arc<Notify>) -> Self {
            self.room_gate = Some(gate);
            self
        }

        /// Never resolve `issue_credential`.
        #[must_use]
        pub fn hanging_credential(mut self) -> Self {
            self.hang_credential = true;
            self
        }

        /// Number of `create_room` calls.
        pub fn room_requests(&self) -> usize {
            self.room_requests.load(Ordering::SeqCst)
        }

        /// Number of `issue_credential` calls.
        pub fn credential_requests(&self) -> usize {
            self.credential_requests.load(Ordering::SeqCst)
        }

        /// Room passed to the most recent `issue_credential`.
        pub fn last_room_requested(&self) -> Option<RoomName> {
            self.last_room_requested
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    #[async_trait]
    impl BackendGateway for MockGateway {
        async fn create_room(&self) -> Result<RoomName, GatewayError> {
            let n = self.room_requests.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(gate) = &self.room_gate {
                gate.notified().await;
            }
            match &self.room_error {
                Some(error) => Err(error.clone()),
                None => Ok(RoomName::new(format!("interview-mock-{n}"))),
            }
        }

        async fn issue_credential(&self, room: &RoomName) -> Result<Credential, GatewayError> {
            let n = self.credential_requests.fetch_add(1, Ordering::SeqCst) + 1;
            *self
                .last_room_requested
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(room.clone());
            if self.hang_credential {
                std::future::pending::<()>().await;
            }
            match &self.credential_error {
                Some(error) => Err(error.clone()),
                None => Ok(Credential {
                    room_url: MOCK_MEDIA_URL.to_string(),
                    access_token: SecretString::from(format!("mock-token-{n}")),
                    expires_in: Some(Duration::from_secs(MOCK_EXPIRES_IN_SECS)),
                }),
            }
        }
    }
}
