//! Platform entity model: the identity/name surface the framework reads from
//! the chat platform. Ids are platform-assigned strings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    /// Trailing disambiguator some platforms append to display names.
    pub discriminator: Option<String>,
    pub bot: bool,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            discriminator: None,
            bot: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Text,
    Dm,
    Voice,
    Category,
    News,
    Store,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub kind: ChannelKind,
    pub guild_id: Option<String>,
    /// The other party of a direct-message channel.
    pub recipient: Option<User>,
}

impl Channel {
    pub fn text(id: impl Into<String>, name: impl Into<String>, guild_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: ChannelKind::Text,
            guild_id: Some(guild_id.into()),
            recipient: None,
        }
    }

    pub fn dm(id: impl Into<String>, recipient: User) -> Self {
        Self {
            id: id.into(),
            name: recipient.name.clone(),
            kind: ChannelKind::Dm,
            guild_id: None,
            recipient: Some(recipient),
        }
    }

    pub fn is_dm(&self) -> bool {
        self.kind == ChannelKind::Dm
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub guild_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emoji {
    pub id: String,
    pub name: String,
    pub guild_id: String,
    pub animated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub id: String,
    pub name: String,
}
