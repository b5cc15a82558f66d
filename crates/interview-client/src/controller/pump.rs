//! Per-room event pump.
//!
//! One pump task runs per `RoomHandle`. It holds a store clone and the
//! playback seam but never the controller, so dropping the controller is
//! enough to release the room.

use super::state::SessionStore;
use super::transitions::translate;
use crate::observability::metrics;
use crate::room::{AudioPlayback, RoomEvent, RoomEventReceiver};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Apply room events to the store until cancelled or the room goes away.
pub(crate) async fn run(
    mut events: RoomEventReceiver,
    store: SessionStore,
    playback: Arc<dyn AudioPlayback>,
    generation: u64,
    cancel: CancellationToken,
) {
    debug!(target: "interview.controller.pump", generation, "Event pump started");

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                handle_event(&event, &store, playback.as_ref(), generation).await;
            }
        }
    }

    debug!(target: "interview.controller.pump", generation, "Event pump stopped");
}

async fn handle_event(
    event: &RoomEvent,
    store: &SessionStore,
    playback: &dyn AudioPlayback,
    generation: u64,
) {
    let transition = translate(event);
    if transition.is_empty() {
        trace!(target: "interview.controller.pump", ?event, "Ignoring room event");
        return;
    }

    let applied = store.transact(Some(generation), |session, log| {
        log.extend(transition.apply(session));
    });
    if !applied {
        debug!(
            target: "interview.controller.pump",
            generation,
            ?event,
            "Discarding event from superseded room"
        );
        return;
    }

    if let RoomEvent::Disconnected { reason } = event {
        metrics::record_room_disconnect(reason.metric_label());
    }

    if let Some((track, participant)) = &transition.playback {
        if let Err(e) = playback.attach(track, participant).await {
            store.log(
                Some(generation),
                format!("Audio autoplay blocked: {}", e.detail()),
            );
        }
    }
}
