//! Lifecycle events emitted by the dispatcher.

use std::time::Duration;

use herald_core::Message;
use tokio::sync::broadcast;

/// Built-in block reasons, mirrored in blocked events.
pub mod reasons {
    pub const CLIENT: &str = "client";
    pub const BOT: &str = "bot";
    pub const OWNER: &str = "owner";
    pub const GUILD: &str = "guild";
    pub const DM: &str = "dm";
}

/// Which side a permission check failed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionSide {
    Client,
    User,
}

#[derive(Debug, Clone)]
pub enum Event {
    /// The message was stopped by an all- or pre-tier check.
    MessageBlocked { message: Message, reason: String },
    /// Nothing ran for this message (no command, or checks rejected it).
    MessageInvalid { message: Message },
    /// The sender is already answering a prompt in this channel.
    InPrompt { message: Message },
    CommandBlocked {
        message: Message,
        command: String,
        reason: String,
    },
    MissingPermissions {
        message: Message,
        command: String,
        side: PermissionSide,
        missing: Vec<String>,
    },
    Cooldown {
        message: Message,
        command: String,
        remaining: Duration,
    },
    CommandLocked { message: Message, command: String },
    CommandStarted { message: Message, command: String },
    CommandFinished {
        message: Message,
        command: String,
        value: serde_json::Value,
    },
    /// Argument resolution cancelled the command.
    CommandCancelled { message: Message, command: String },
    /// A prompt reply parsed as a command of its own; the pipeline re-ran
    /// with it.
    CommandBreakout {
        message: Message,
        command: String,
        replay: Message,
    },
    Error {
        message: Message,
        command: Option<String>,
        error: String,
    },
}

/// Broadcast fan-out of dispatcher events to host listeners.
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(128);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use herald_core::{Channel, MemoryChat, User};

    #[tokio::test]
    async fn events_reach_every_subscriber() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let client = MemoryChat::new();
        let message = client.inbound(
            &User::new("u1", "sender"),
            &Channel::text("c1", "general", "g1"),
            "hello",
        );
        bus.emit(Event::MessageInvalid {
            message: message.clone(),
        });

        assert!(matches!(
            first.recv().await.unwrap(),
            Event::MessageInvalid { .. }
        ));
        assert!(matches!(
            second.recv().await.unwrap(),
            Event::MessageInvalid { .. }
        ));
    }

    #[test]
    fn subscriber_count_tracks_receivers() {
        let bus = EventBus::new();
        assert!(!bus.has_subscribers());
        let rx = bus.subscribe();
        assert!(bus.has_subscribers());
        drop(rx);
        assert!(!bus.has_subscribers());
    }
}
