use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::models::NotificationEvent;

/// Fire-and-forget handle used by request handlers after a commit.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    sender: UnboundedSender<NotificationEvent>,
}

impl NotificationDispatcher {
    pub fn channel() -> (Self, UnboundedReceiver<NotificationEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// A dispatcher whose events go nowhere. Useful where no worker runs.
    pub fn detached() -> Self {
        let (dispatcher, _receiver) = Self::channel();
        dispatcher
    }

    pub fn dispatch(&self, event: NotificationEvent) {
        let kind = event.kind();
        let appointment_id = event.appointment_id();

        match self.sender.send(event) {
            Ok(()) => debug!("Queued {} notification for appointment {}", kind, appointment_id),
            Err(_) => warn!(
                "Notification worker is not running, dropped {} for appointment {}",
                kind, appointment_id
            ),
        }
    }
}
