//! Defines an abstraction over the event sending mechanism.

use super::events::TaskEvent;
use tokio::sync::mpsc::UnboundedSender;

/// A trait that abstracts the sending of task events.
/// This is "fire-and-forget" and doesn't return a result, simplifying its use.
pub trait EventProxy: Send + Sync + Clone + 'static {
    fn send_event(&self, event: TaskEvent);
}

impl EventProxy for UnboundedSender<TaskEvent> {
    fn send_event(&self, event: TaskEvent) {
        // A closed receiver means the front end went away; nothing to deliver to.
        if let Err(e) = self.send(event) {
            tracing::warn!("Failed to deliver task event: {}", e);
        }
    }
}
