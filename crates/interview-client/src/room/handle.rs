//! Scoped ownership of a live media room.
//!
//! A `RoomHandle` is created once per connection attempt and owns:
//! - the room itself
//! - the cancellation token of the task that pumps the room's events
//!
//! # Lifecycle
//!
//! 1. Created after the credential is issued, before `connect` is called
//! 2. Released via [`RoomHandle::release`] on end of session or failure
//! 3. If dropped without release, `Drop` cancels the pump and schedules
//!    `disconnect` on the current runtime

use super::{MediaRoom, RoomError};

use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Exclusive owner of one media room.
pub struct RoomHandle {
    room: Arc<dyn MediaRoom>,
    generation: u64,
    pump_cancel: CancellationToken,
    released: bool,
}

impl RoomHandle {
    /// Take ownership of a room.
    ///
    /// `generation` is the attempt this room belongs to; `pump_cancel` stops
    /// the room's event pump.
    #[must_use]
    pub fn new(room: Arc<dyn MediaRoom>, generation: u64, pump_cancel: CancellationToken) -> Self {
        Self {
            room,
            generation,
            pump_cancel,
            released: false,
        }
    }

    /// The attempt generation this room was created for.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// A shared reference to the room for calls that must not hold the handle.
    #[must_use]
    pub fn room(&self) -> Arc<dyn MediaRoom> {
        Arc::clone(&self.room)
    }

    /// Disconnect the room and give up ownership.
    ///
    /// Ownership is released whether or not `disconnect` succeeds; the error
    /// is returned for logging only.
    pub async fn release(mut self) -> Result<(), RoomError> {
        debug!(
            target: "interview.room.handle",
            generation = self.generation,
            "Releasing room"
        );
        let result = self.room.disconnect().await;
        self.released = true;
        self.pump_cancel.cancel();
        result
    }
}

impl Drop for RoomHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.pump_cancel.cancel();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!(
                    target: "interview.room.handle",
                    generation = self.generation,
                    "Room handle dropped without release, scheduling disconnect"
                );
                let room = Arc::clone(&self.room);
                let generation = self.generation;
                runtime.spawn(async move {
                    if let Err(e) = room.disconnect().await {
                        warn!(
                            target: "interview.room.handle",
                            generation = generation,
                            error = %e,
                            "Deferred disconnect failed"
                        );
                    }
                });
            }
            Err(_) => {
                warn!(
                    target: "interview.room.handle",
                    generation = self.generation,
                    "Room handle dropped outside a runtime, disconnect skipped"
                );
            }
        }
    }
}

impl fmt::Debug for RoomHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomHandle")
            .field("generation", &self.generation)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::room::mock::MockRoomConnector;
    use crate::room::{RoomConnector, RoomOptions};
    use std::time::Duration;

    #[tokio::test]
    async fn test_release_disconnects_once_and_cancels_pump() {
        let connector = MockRoomConnector::new();
        let (room, _events) = connector.create_room(&RoomOptions::default());
        let cancel = CancellationToken::new();

        let handle = RoomHandle::new(room, 1, cancel.clone());
        handle.release().await.unwrap();

        let mock_room = connector.last_room().unwrap();
        assert_eq!(mock_room.disconnect_calls(), 1);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_release_gives_up_ownership_even_when_disconnect_fails() {
        let connector =
            MockRoomConnector::new().failing_disconnect(RoomError::ConnectFailed("socket".into()));
        let (room, _events) = connector.create_room(&RoomOptions::default());
        let cancel = CancellationToken::new();

        let handle = RoomHandle::new(room, 7, cancel.clone());
        let result = handle.release().await;

        assert!(result.is_err());
        assert!(cancel.is_cancelled());
        // Drop after a failed release must not disconnect again
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(connector.last_room().unwrap().disconnect_calls(), 1);
    }

    #[tokio::test]
    async fn test_drop_without_release_schedules_disconnect() {
        let connector = MockRoomConnector::new();
        let (room, _events) = connector.create_room(&RoomOptions::default());
        let cancel = CancellationToken::new();

        drop(RoomHandle::new(room, 2, cancel.clone()));
        assert!(cancel.is_cancelled());

        let mock_room = connector.last_room().unwrap();
        for _ in 0..50 {
            if mock_room.disconnect_calls() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(mock_room.disconnect_calls(), 1);
    }

    #[test]
    fn test_drop_outside_runtime_does_not_panic() {
        let connector = MockRoomConnector::new();
        let (room, _events) = connector.create_room(&RoomOptions::default());
        let cancel = CancellationToken::new();

        drop(RoomHandle::new(room, 3, cancel.clone()));
        assert!(cancel.is_cancelled());
        assert_eq!(connector.last_room().unwrap().disconnect_calls(), 0);
    }
}
