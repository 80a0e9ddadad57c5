//! In-memory `ChatClient` used by tests and demos.
//!
//! Entity tables are seedable, every sent message lands in an inspectable
//! outbox, and replies consumed by `next_reply` are scripted through a
//! queue.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::client::ChatClient;
use crate::entity::{Channel, ChannelKind, Emoji, Guild, Role, User};
use crate::error::HeraldError;
use crate::message::{Message, Outgoing};

#[derive(Default)]
pub struct MemoryChat {
    me: User,
    users: Mutex<Vec<User>>,
    guilds: Mutex<Vec<Guild>>,
    channels: Mutex<Vec<Channel>>,
    roles: Mutex<Vec<Role>>,
    emojis: Mutex<Vec<Emoji>>,
    permissions: Mutex<HashMap<(String, String), Vec<String>>>,
    outbox: Mutex<Vec<Message>>,
    replies: Mutex<VecDeque<Message>>,
    reply_posted: Notify,
    typing: Mutex<HashMap<String, u32>>,
}

impl MemoryChat {
    pub fn new() -> Self {
        Self {
            me: User {
                id: "10000000000000000".into(),
                name: "herald".into(),
                discriminator: Some("0000".into()),
                bot: true,
            },
            ..Self::default()
        }
    }

    pub fn with_client_user(me: User) -> Self {
        Self {
            me,
            ..Self::default()
        }
    }

    pub fn add_user(&self, user: User) {
        self.users.lock().unwrap().push(user);
    }

    pub fn add_guild(&self, guild: Guild) {
        self.guilds.lock().unwrap().push(guild);
    }

    pub fn add_channel(&self, channel: Channel) {
        self.channels.lock().unwrap().push(channel);
    }

    pub fn add_role(&self, role: Role) {
        self.roles.lock().unwrap().push(role);
    }

    pub fn add_emoji(&self, emoji: Emoji) {
        self.emojis.lock().unwrap().push(emoji);
    }

    pub fn grant(&self, channel_id: &str, user_id: &str, permissions: &[&str]) {
        self.permissions.lock().unwrap().insert(
            (channel_id.to_string(), user_id.to_string()),
            permissions.iter().map(|p| p.to_string()).collect(),
        );
    }

    /// Mint an inbound message as `author` in `channel`.
    pub fn inbound(&self, author: &User, channel: &Channel, content: &str) -> Message {
        let guild = channel.guild_id.as_ref().and_then(|gid| {
            self.guilds
                .lock()
                .unwrap()
                .iter()
                .find(|g| &g.id == gid)
                .cloned()
                .or_else(|| {
                    Some(Guild {
                        id: gid.clone(),
                        name: gid.clone(),
                    })
                })
        });
        Message {
            id: Uuid::new_v4().to_string(),
            channel: channel.clone(),
            guild,
            author: author.clone(),
            content: content.to_string(),
            timestamp: Utc::now(),
            edited_at: None,
            attachments: Vec::new(),
        }
    }

    /// Script a reply for a pending or future `next_reply` wait.
    pub fn queue_reply(&self, message: Message) {
        self.replies.lock().unwrap().push_back(message);
        self.reply_posted.notify_waiters();
    }

    /// Everything sent through this client, oldest first.
    pub fn sent(&self) -> Vec<Message> {
        self.outbox.lock().unwrap().clone()
    }

    pub fn sent_contents(&self) -> Vec<String> {
        self.outbox
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.content.clone())
            .collect()
    }

    pub fn typing_count(&self, channel_id: &str) -> u32 {
        *self.typing.lock().unwrap().get(channel_id).unwrap_or(&0)
    }

    fn channel_snapshot(&self, channel_id: &str) -> Channel {
        self.channels
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == channel_id)
            .cloned()
            .unwrap_or_else(|| Channel {
                id: channel_id.to_string(),
                name: channel_id.to_string(),
                kind: ChannelKind::Text,
                guild_id: None,
                recipient: None,
            })
    }

    fn take_reply(&self, channel_id: &str, author_id: &str) -> Option<Message> {
        let mut queue = self.replies.lock().unwrap();
        let pos = queue
            .iter()
            .position(|m| m.channel.id == channel_id && m.author.id == author_id)?;
        queue.remove(pos)
    }
}

#[async_trait]
impl ChatClient for MemoryChat {
    fn client_user(&self) -> User {
        self.me.clone()
    }

    async fn send(&self, channel_id: &str, out: Outgoing) -> Result<Message, HeraldError> {
        let channel = self.channel_snapshot(channel_id);
        let guild = channel.guild_id.as_ref().and_then(|gid| {
            self.guilds
                .lock()
                .unwrap()
                .iter()
                .find(|g| &g.id == gid)
                .cloned()
        });
        let message = Message {
            id: Uuid::new_v4().to_string(),
            channel,
            guild,
            author: self.me.clone(),
            content: out.content,
            timestamp: Utc::now(),
            edited_at: None,
            attachments: out.attachments,
        };
        self.outbox.lock().unwrap().push(message.clone());
        Ok(message)
    }

    async fn edit(
        &self,
        channel_id: &str,
        message_id: &str,
        out: Outgoing,
    ) -> Result<Message, HeraldError> {
        let mut outbox = self.outbox.lock().unwrap();
        let message = outbox
            .iter_mut()
            .find(|m| m.channel.id == channel_id && m.id == message_id)
            .ok_or_else(|| HeraldError::Platform(format!("no such message: {message_id}")))?;
        message.content = out.content;
        message.edited_at = Some(Utc::now());
        Ok(message.clone())
    }

    async fn next_reply(
        &self,
        channel_id: &str,
        author_id: &str,
        timeout: Duration,
    ) -> Option<Message> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(message) = self.take_reply(channel_id, author_id) {
                return Some(message);
            }
            match tokio::time::timeout_at(deadline, self.reply_posted.notified()).await {
                Ok(()) => continue,
                Err(_) => return None,
            }
        }
    }

    async fn start_typing(&self, channel_id: &str) {
        *self
            .typing
            .lock()
            .unwrap()
            .entry(channel_id.to_string())
            .or_insert(0) += 1;
    }

    async fn stop_typing(&self, channel_id: &str) {
        let mut typing = self.typing.lock().unwrap();
        if let Some(count) = typing.get_mut(channel_id) {
            *count = count.saturating_sub(1);
        }
    }

    fn users(&self) -> Vec<User> {
        self.users.lock().unwrap().clone()
    }

    fn guild_channels(&self, guild_id: &str) -> Vec<Channel> {
        self.channels
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.guild_id.as_deref() == Some(guild_id))
            .cloned()
            .collect()
    }

    fn guild_roles(&self, guild_id: &str) -> Vec<Role> {
        self.roles
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.guild_id == guild_id)
            .cloned()
            .collect()
    }

    fn guild_emojis(&self, guild_id: &str) -> Vec<Emoji> {
        self.emojis
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.guild_id == guild_id)
            .cloned()
            .collect()
    }

    fn guilds(&self) -> Vec<Guild> {
        self.guilds.lock().unwrap().clone()
    }

    fn permissions_for(&self, channel_id: &str, user_id: &str) -> Vec<String> {
        self.permissions
            .lock()
            .unwrap()
            .get(&(channel_id.to_string(), user_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn next_reply_times_out_when_nothing_queued() {
        let client = MemoryChat::new();
        let got = client
            .next_reply("c1", "u1", Duration::from_secs(5))
            .await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn next_reply_returns_prequeued_message() {
        let client = MemoryChat::new();
        let channel = Channel::text("c1", "general", "g1");
        let author = User::new("u1", "sender");
        client.queue_reply(client.inbound(&author, &channel, "yes"));

        let got = client
            .next_reply("c1", "u1", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(got.content, "yes");
    }

    #[tokio::test]
    async fn next_reply_skips_other_authors() {
        let client = MemoryChat::new();
        let channel = Channel::text("c1", "general", "g1");
        client.queue_reply(client.inbound(&User::new("u2", "other"), &channel, "nope"));
        client.queue_reply(client.inbound(&User::new("u1", "sender"), &channel, "yes"));

        let got = client
            .next_reply("c1", "u1", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(got.content, "yes");
    }
}
