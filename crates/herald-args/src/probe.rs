//! A narrow view of the dispatcher for components that must look commands
//! up without depending on the dispatch layer: prompt breakout and the
//! command-referencing casters.

use async_trait::async_trait;
use herald_core::Message;

#[async_trait]
pub trait DispatchProbe: Send + Sync {
    /// Whether the message parses as a full command invocation.
    async fn parses_as_command(&self, message: &Message) -> bool;

    /// Command id registered under an alias.
    fn find_command(&self, alias: &str) -> Option<String>;

    /// Whether a command with this id exists.
    fn has_command(&self, id: &str) -> bool;
}
