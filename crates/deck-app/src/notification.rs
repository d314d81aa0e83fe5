//! Single-slot notification bus
//!
//! Holds the one current [`Message`]; publishing replaces it. Front-ends
//! subscribe and render the latest value as a toast.

use std::sync::Arc;

use tokio::sync::watch;

use deck_core::Message;

#[derive(Debug, Clone)]
pub struct NotificationBus {
    tx: Arc<watch::Sender<Message>>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Message::Empty);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the current message
    pub fn publish(&self, message: Message) {
        tracing::debug!("notification: {}", message.text());
        self.tx.send_replace(message);
    }

    pub fn current(&self) -> Message {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Message> {
        self.tx.subscribe()
    }

    pub fn clear(&self) {
        self.tx.send_if_modified(|current| {
            if current.is_empty() {
                false
            } else {
                *current = Message::Empty;
                true
            }
        });
    }

    /// Clear `message` only if it is still the current one; a toast timing
    /// out must not wipe a newer message.
    pub fn dismiss(&self, message: &Message) -> bool {
        self.tx.send_if_modified(|current| {
            if !current.is_empty() && current == message {
                *current = Message::Empty;
                true
            } else {
                false
            }
        })
    }
}
