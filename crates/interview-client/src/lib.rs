//! Interview Client Library
//!
//! Candidate-side session controller for AI-moderated audio interviews:
//!
//! - Requests a room name and a short-lived credential from the backend gateway
//! - Creates and owns exactly one media room per connection attempt
//! - Translates media room events into an observable session state
//! - Publishes the candidate's microphone on request
//!
//! # Architecture
//!
//! ```text
//! SessionController
//! ├── BackendGateway      (HTTP: /create-room, /generate-token)
//! ├── RoomConnector       (creates MediaRoom + event receiver)
//! │   └── RoomHandle      (one live room, released on every exit path)
//! │       └── event pump  (RoomEvent -> Transition -> SessionStore)
//! ├── AudioPlayback       (attaches remote audio tracks)
//! └── SessionStore        (watch channel: Session + log)
//!         └── SessionView (pure presentation)
//! ```
//!
//! # Modules
//!
//! - [`config`] - Client configuration from environment
//! - [`controller`] - Session lifecycle state machine and action API
//! - [`errors`] - Error types with user-facing messages
//! - [`gateway`] - Backend gateway client
//! - [`observability`] - Metrics
//! - [`room`] - Media room capability traits and handle
//! - [`view`] - Presentation of session state

pub mod config;
pub mod controller;
pub mod errors;
pub mod gateway;
pub mod observability;
pub mod room;
pub mod view;

pub use controller::{SessionController, SessionSettings, StartOutcome};
pub use errors::SessionError;
