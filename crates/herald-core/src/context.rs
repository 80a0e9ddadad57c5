//! The per-dispatch context handed to command bodies, argument casters, and
//! inhibitors.

use std::collections::HashMap;
use std::sync::Arc;

use crate::client::ChatClient;
use crate::entity::{Channel, Guild, User};
use crate::error::HeraldError;
use crate::message::{Message, Outgoing};
use crate::respond::Responder;

/// Strategy for augmenting contexts at creation time. Injected into the
/// dispatcher at setup; replaces any notion of a process-wide registry of
/// extendable wrapper classes.
pub trait ContextDecorator: Send + Sync {
    fn decorate(&self, ctx: &mut Ctx);
}

#[derive(Clone)]
pub struct Ctx {
    pub message: Message,
    pub client: Arc<dyn ChatClient>,
    pub responder: Arc<Responder>,
    /// Host-defined extension data, populated by a `ContextDecorator`.
    pub ext: HashMap<String, serde_json::Value>,
}

impl Ctx {
    pub fn new(message: Message, client: Arc<dyn ChatClient>) -> Self {
        let responder = Arc::new(Responder::new(client.clone(), message.clone()));
        Self {
            message,
            client,
            responder,
            ext: HashMap::new(),
        }
    }

    /// Rebuild a context for a different message, keeping client and
    /// extension data.
    pub fn for_message(&self, message: Message) -> Self {
        let responder = Arc::new(Responder::new(self.client.clone(), message.clone()));
        Self {
            message,
            client: self.client.clone(),
            responder,
            ext: self.ext.clone(),
        }
    }

    pub fn author(&self) -> &User {
        &self.message.author
    }

    pub fn channel(&self) -> &Channel {
        &self.message.channel
    }

    pub fn guild(&self) -> Option<&Guild> {
        self.message.guild.as_ref()
    }

    pub async fn send(&self, text: impl Into<String>) -> Result<Message, HeraldError> {
        self.responder.send(Outgoing::text(text)).await
    }

    pub async fn reply(&self, text: impl Into<String>) -> Result<Message, HeraldError> {
        self.responder.reply(Outgoing::text(text)).await
    }
}

impl std::fmt::Debug for Ctx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ctx")
            .field("message", &self.message.id)
            .field("author", &self.message.author.id)
            .field("channel", &self.message.channel.id)
            .finish()
    }
}
