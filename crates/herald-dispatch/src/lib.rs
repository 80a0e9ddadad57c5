pub mod command;
pub mod cooldown;
pub mod dispatcher;
pub mod events;
pub mod inhibitor;

pub use command::{
    ChannelScope, Command, CommandOptions, CommandRun, Description, IgnoreCheck, LockSpec,
    PermissionCheck, PrefixSource,
};
pub use cooldown::CooldownTracker;
pub use dispatcher::{prefix_compare, Dispatcher, DispatcherOptions, ParsedMessage};
pub use events::{reasons, Event, EventBus, PermissionSide};
pub use inhibitor::{Inhibitor, InhibitorKind, InhibitorSet};
