//! Terminal-failure notifier.
//!
//! The worker records per-attempt errors itself, but an attempt can end
//! without the worker running at all (wall-clock timeout aborts the
//! future mid-flight). This task watches the queue's event stream and
//! guarantees a photo whose job failed terminally ends up `failed` with
//! a non-empty error.

use crate::photos::PhotoStore;
use crate::worker::photo_id_of_job;
use aqua_queue::QueueEvent;
use tokio::sync::mpsc::UnboundedReceiver;

/// Spawn the notifier over a queue event stream. Ends when the channel
/// closes.
pub fn spawn_failure_notifier(
    store: PhotoStore,
    mut events: UnboundedReceiver<QueueEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let QueueEvent::Failed {
                job_id,
                error,
                terminal: true,
            } = event
            else {
                continue;
            };
            let Some(photo_id) = photo_id_of_job(&job_id) else {
                continue;
            };

            match store.get(photo_id) {
                Ok(Some(photo)) if !photo.tag_status.is_terminal() => {
                    let error = if error.is_empty() {
                        "tagging failed".to_string()
                    } else {
                        error
                    };
                    if let Err(e) = store.mark_tagging_failed(photo_id, &error) {
                        tracing::error!(photo_id = %photo_id, error = %e, "failed to record terminal failure");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(photo_id = %photo_id, error = %e, "failure notifier lookup failed");
                }
            }
        }
    })
}
