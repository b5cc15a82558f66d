//! Observability for the interview client.
//!
//! The library records through the [`metrics`](::metrics) facade only; an
//! embedding application installs whatever recorder it exports with.
//!
//! # Privacy by Default
//!
//! Controller entry points use `#[instrument(skip_all)]`. Room names are
//! logged, access tokens never are. Metric labels are bounded:
//! - `outcome`: fixed per metric (see [`metrics`])
//! - `reason`: disconnect reason codes, unknown codes collapse to `other`
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `interview_session_starts_total` | Counter | `outcome` | Result of each start attempt |
//! | `interview_session_setup_duration_seconds` | Histogram | `outcome` | Time from start to connected or failed |
//! | `interview_room_disconnects_total` | Counter | `reason` | Disconnect events by reason |
//! | `interview_microphone_requests_total` | Counter | `outcome` | Microphone enable attempts |

pub mod metrics;

pub use self::metrics::{
    record_microphone_request, record_room_disconnect, record_session_start,
    record_setup_duration,
};
