//! Metrics definitions for the interview client.
//!
//! All metrics follow Prometheus naming conventions:
//! - `interview_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! - `outcome` on starts: `started`, `already_active`, `superseded`, or a
//!   `SessionError::metric_label` value (8 values)
//! - `outcome` on setup duration: `success`, `error`
//! - `outcome` on microphone: `success`, `error`, `rejected`
//! - `reason`: `DisconnectReason::metric_label` (8 values)

use metrics::{counter, histogram};
use std::time::Duration;

/// Record the outcome of a `start_session` call.
///
/// Metric: `interview_session_starts_total`
/// Labels: `outcome`
pub fn record_session_start(outcome: &'static str) {
    counter!("interview_session_starts_total", "outcome" => outcome).increment(1);
}

/// Record how long a start took to reach connected or fail.
///
/// Metric: `interview_session_setup_duration_seconds`
/// Labels: `outcome` (success, error)
pub fn record_setup_duration(outcome: &'static str, duration: Duration) {
    histogram!("interview_session_setup_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());
}

/// Record a disconnect event from the media room.
///
/// Metric: `interview_room_disconnects_total`
/// Labels: `reason`
pub fn record_room_disconnect(reason: &'static str) {
    counter!("interview_room_disconnects_total", "reason" => reason).increment(1);
}

/// Record a microphone enable attempt.
///
/// Metric: `interview_microphone_requests_total`
/// Labels: `outcome` (success, error, rejected)
pub fn record_microphone_request(outcome: &'static str) {
    counter!("interview_microphone_requests_total", "outcome" => outcome).increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    fn counter_value(
        metrics: &[(
            metrics_util::CompositeKey,
            Option<metrics::Unit>,
            Option<metrics::SharedString>,
            DebugValue,
        )],
        name: &str,
        label: (&str, &str),
    ) -> Option<u64> {
        metrics.iter().find_map(|(key, _, _, value)| {
            let key = key.key();
            let matches = key.name() == name
                && key
                    .labels()
                    .any(|l| l.key() == label.0 && l.value() == label.1);
            match (matches, value) {
                (true, DebugValue::Counter(v)) => Some(*v),
                _ => None,
            }
        })
    }

    #[test]
    fn test_counters_are_recorded_with_labels() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_session_start("started");
            record_session_start("started");
            record_session_start("room_creation_failed");
            record_room_disconnect("room_deleted");
            record_microphone_request("error");
        });

        let metrics = snapshotter.snapshot().into_vec();
        assert_eq!(
            counter_value(&metrics, "interview_session_starts_total", ("outcome", "started")),
            Some(2)
        );
        assert_eq!(
            counter_value(
                &metrics,
                "interview_session_starts_total",
                ("outcome", "room_creation_failed")
            ),
            Some(1)
        );
        assert_eq!(
            counter_value(&metrics, "interview_room_disconnects_total", ("reason", "room_deleted")),
            Some(1)
        );
        assert_eq!(
            counter_value(
                &metrics,
                "interview_microphone_requests_total",
                ("outcome", "error")
            ),
            Some(1)
        );
    }

    #[test]
    fn test_setup_duration_is_a_histogram() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_setup_duration("success", Duration::from_millis(250));
        });

        let metrics = snapshotter.snapshot().into_vec();
        let recorded = metrics.iter().any(|(key, _, _, value)| {
            key.key().name() == "interview_session_setup_duration_seconds"
                && matches!(value, DebugValue::Histogram(samples) if samples.len() == 1)
        });
        assert!(recorded);
    }
}
