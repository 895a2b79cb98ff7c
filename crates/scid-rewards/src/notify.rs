use tokio::sync::mpsc;

use scid_core::{Notification, Notifier, ScidError};

/// Queues notifications on a bounded tokio channel for a delivery task to
/// drain. A full or closed queue drops the notification with an error; it
/// never waits.
#[derive(Clone)]
pub struct ChannelNotifier {
    sender: mpsc::Sender<Notification>,
}

impl ChannelNotifier {
    pub fn new(sender: mpsc::Sender<Notification>) -> Self {
        Self { sender }
    }

    /// Notifier plus the receiving end for the delivery task.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) -> Result<(), ScidError> {
        self.sender.try_send(notification).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                ScidError::Notification("notification queue full".into())
            }
            mpsc::error::TrySendError::Closed(_) => {
                ScidError::Notification("notification queue closed".into())
            }
        })
    }
}
