//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for room access tokens. A token
//! wrapped in `SecretString` prints as `[REDACTED]` through `Debug`, so a
//! struct that derives `Debug` around one is safe to pass to `tracing`.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct Credential {
//!     room_url: String,
//!     access_token: SecretString,
//! }
//!
//! let credential = Credential {
//!     room_url: "wss://media.example.com".to_string(),
//!     access_token: SecretString::from("eyJhbGciOi..."),
//! };
//!
//! let debug = format!("{credential:?}");
//! assert!(!debug.contains("eyJhbGciOi"));
//!
//! // Handing the token to the transport is an explicit, greppable call.
//! let token: &str = credential.access_token.expose_secret();
//! assert!(token.starts_with("eyJ"));
//! ```
//!
//! With the `serde` feature of `secrecy`, tokens deserialize directly out of
//! backend responses:
//!
//! ```rust
//! use serde::Deserialize;
//! use common::secret::SecretString;
//!
//! #[derive(Debug, Deserialize)]
//! struct TokenResponse {
//!     url: String,
//!     token: SecretString,
//! }
//!
//! let json = r#"{"url": "wss://media.example.com", "token": "jwt-value"}"#;
//! let response: TokenResponse = serde_json::from_str(json).unwrap();
//! assert!(!format!("{response:?}").contains("jwt-value"));
//! ```

pub use secrecy::{ExposeSecret, SecretString};

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("room-token");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("room-token"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("token123");
        assert_eq!(secret.expose_secret(), "token123");
    }

    #[test]
    fn test_deserialize_token_response() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct TokenResponse {
            url: String,
            token: SecretString,
        }

        let json = r#"{"url": "wss://media.local", "token": "jwt-secret-value"}"#;
        let response: TokenResponse = serde_json::from_str(json).expect("deserialize");

        assert_eq!(response.token.expose_secret(), "jwt-secret-value");

        let debug = format!("{response:?}");
        assert!(debug.contains("wss://media.local"));
        assert!(!debug.contains("jwt-secret-value"));
    }
}
