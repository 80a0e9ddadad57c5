pub mod client;
pub mod context;
pub mod entity;
pub mod error;
pub mod lookup;
pub mod memory;
pub mod message;
pub mod respond;
pub mod telemetry;

pub use client::ChatClient;
pub use context::{ContextDecorator, Ctx};
pub use entity::{Channel, ChannelKind, Emoji, Guild, Role, User};
pub use error::HeraldError;
pub use memory::MemoryChat;
pub use message::{Attachment, Message, Outgoing};
pub use respond::Responder;
