//! Per-view download gate: at most one staging download per feed view.
//!
//! Check-and-register happens under a single lock, so two jobs for the same
//! view can never both see the slot as free. A later job waits for the
//! running download to finish, then downloads whatever is left.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

type Slots = Arc<Mutex<HashMap<String, watch::Receiver<bool>>>>;

fn lock(slots: &Slots) -> MutexGuard<'_, HashMap<String, watch::Receiver<bool>>> {
    // The map stays consistent even if a holder panicked
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of feed views with a download in progress
#[derive(Clone, Default)]
pub(crate) struct InFlightDownloads {
    slots: Slots,
}

/// Exclusive download slot for one feed view, released on drop
pub(crate) struct InFlightSlot {
    slots: Slots,
    feed_view_id: String,
    done: watch::Sender<bool>,
}

impl InFlightDownloads {
    /// Wait until no download runs for `feed_view_id`, then claim the slot
    pub(crate) async fn acquire(&self, feed_view_id: &str) -> InFlightSlot {
        loop {
            let mut running = {
                let mut slots = lock(&self.slots);
                match slots.get(feed_view_id) {
                    Some(running) => running.clone(),
                    None => {
                        let (done, rx) = watch::channel(false);
                        slots.insert(feed_view_id.to_string(), rx);
                        return InFlightSlot {
                            slots: Arc::clone(&self.slots),
                            feed_view_id: feed_view_id.to_string(),
                            done,
                        };
                    }
                }
            };

            tracing::debug!(feed_view_id, "Download already running for feed view, waiting");
            // Err means the slot was dropped, which also ends the download
            let _ = running.wait_for(|finished| *finished).await;
        }
    }

    /// Whether a download currently runs for `feed_view_id`
    #[cfg(test)]
    pub(crate) fn is_in_flight(&self, feed_view_id: &str) -> bool {
        lock(&self.slots).contains_key(feed_view_id)
    }
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        lock(&self.slots).remove(&self.feed_view_id);
        let _ = self.done.send(true);
    }
}
