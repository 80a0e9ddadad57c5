//! Inbound and outbound message payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{Channel, Guild, User};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
}

/// An inbound chat message as delivered by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub channel: Channel,
    pub guild: Option<Guild>,
    pub author: User,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub attachments: Vec<Attachment>,
}

impl Message {
    pub fn edited(&self) -> bool {
        self.edited_at.is_some()
    }
}

/// Payload for sending or editing a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outgoing {
    pub content: String,
    /// Message id to address the response at, if the platform supports it.
    pub reply_to: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl Outgoing {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}
