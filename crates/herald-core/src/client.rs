//! The chat-platform collaborator seam.
//!
//! Everything the framework needs from a platform fits behind this trait:
//! deliver text, await a reply, and expose cached entity/permission state.
//! Connection management, caching, and the wire protocol live on the other
//! side of it.

use std::time::Duration;

use async_trait::async_trait;

use crate::entity::{Channel, Emoji, Guild, Role, User};
use crate::error::HeraldError;
use crate::message::{Message, Outgoing};

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// The identity this client is connected as.
    fn client_user(&self) -> User;

    async fn send(&self, channel_id: &str, out: Outgoing) -> Result<Message, HeraldError>;

    async fn edit(
        &self,
        channel_id: &str,
        message_id: &str,
        out: Outgoing,
    ) -> Result<Message, HeraldError>;

    /// Wait for the next message from `author_id` in `channel_id`.
    /// `None` on timeout; timeout is the only cancellation path.
    async fn next_reply(
        &self,
        channel_id: &str,
        author_id: &str,
        timeout: Duration,
    ) -> Option<Message>;

    async fn start_typing(&self, _channel_id: &str) {}

    async fn stop_typing(&self, _channel_id: &str) {}

    /// Snapshot of the known-user cache.
    fn users(&self) -> Vec<User> {
        Vec::new()
    }

    fn guild_channels(&self, _guild_id: &str) -> Vec<Channel> {
        Vec::new()
    }

    fn guild_roles(&self, _guild_id: &str) -> Vec<Role> {
        Vec::new()
    }

    fn guild_emojis(&self, _guild_id: &str) -> Vec<Emoji> {
        Vec::new()
    }

    fn guilds(&self) -> Vec<Guild> {
        Vec::new()
    }

    /// Named permissions `user_id` holds in `channel_id`.
    fn permissions_for(&self, _channel_id: &str, _user_id: &str) -> Vec<String> {
        Vec::new()
    }
}
