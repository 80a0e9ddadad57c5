use thiserror::Error;

/// Top-level error type for the Herald framework.
///
/// Configuration errors are raised at registration time and are fatal; cast
/// failures and inhibitions never surface here; they flow through normal
/// return values and lifecycle events.
#[derive(Debug, Error)]
pub enum HeraldError {
    #[error("alias '{alias}' already registered to command '{existing}'")]
    AliasConflict { alias: String, existing: String },

    #[error("command '{0}' already registered")]
    DuplicateCommand(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("no prior response to edit in channel {0}")]
    NoPriorResponse(String),

    #[error("platform error: {0}")]
    Platform(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
