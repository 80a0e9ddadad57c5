//! A command: its aliases, parsing configuration, checks, and body.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use herald_args::{extract_flag_words, ArgEnv, Args, ArgumentDefaults, RunResult, Schema};
use herald_core::{Ctx, HeraldError};
use herald_parse::{tokenize, TokenizerConfig};
use regex::Regex;

/// Where a command may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelScope {
    #[default]
    Any,
    Guild,
    Dm,
}

/// What serializes concurrent invocations of one command.
#[derive(Clone)]
pub enum LockSpec {
    Guild,
    Channel,
    User,
    /// Computed key; `None` skips locking for this invocation.
    Custom(Arc<dyn Fn(&Ctx, &Args) -> Option<String> + Send + Sync>),
}

impl std::fmt::Debug for LockSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Guild => write!(f, "LockSpec::Guild"),
            Self::Channel => write!(f, "LockSpec::Channel"),
            Self::User => write!(f, "LockSpec::User"),
            Self::Custom(_) => write!(f, "LockSpec::Custom(..)"),
        }
    }
}

/// A fixed prefix list or a per-message supplier. Suppliers sort after
/// fixed strings during prefix resolution.
#[derive(Clone)]
pub enum PrefixSource {
    Fixed(Vec<String>),
    Supply(Arc<dyn Fn(&Ctx) -> Vec<String> + Send + Sync>),
}

impl PrefixSource {
    pub fn one(prefix: impl Into<String>) -> Self {
        Self::Fixed(vec![prefix.into()])
    }

    pub fn resolve(&self, ctx: &Ctx) -> Vec<String> {
        match self {
            Self::Fixed(list) => list.clone(),
            Self::Supply(f) => f(ctx),
        }
    }
}

impl std::fmt::Debug for PrefixSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed(list) => write!(f, "PrefixSource::Fixed({list:?})"),
            Self::Supply(_) => write!(f, "PrefixSource::Supply(..)"),
        }
    }
}

/// A permission requirement: named platform permissions checked against
/// the client's permission sets, or a supplier returning the missing set.
#[derive(Clone)]
pub enum PermissionCheck {
    Named(Vec<String>),
    Supply(Arc<dyn Fn(&Ctx) -> Option<Vec<String>> + Send + Sync>),
}

impl PermissionCheck {
    pub fn named<S: Into<String>>(permissions: impl IntoIterator<Item = S>) -> Self {
        Self::Named(permissions.into_iter().map(Into::into).collect())
    }
}

impl std::fmt::Debug for PermissionCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Named(list) => write!(f, "PermissionCheck::Named({list:?})"),
            Self::Supply(_) => write!(f, "PermissionCheck::Supply(..)"),
        }
    }
}

/// Who skips a cooldown or permission check: listed user ids, or a
/// predicate over the context and command id.
#[derive(Clone)]
pub enum IgnoreCheck {
    Ids(Vec<String>),
    Supply(Arc<dyn Fn(&Ctx, &str) -> bool + Send + Sync>),
}

impl IgnoreCheck {
    pub fn applies(&self, ctx: &Ctx, command_id: &str) -> bool {
        match self {
            Self::Ids(ids) => ids.iter().any(|id| id == &ctx.author().id),
            Self::Supply(f) => f(ctx, command_id),
        }
    }
}

impl std::fmt::Debug for IgnoreCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ids(ids) => write!(f, "IgnoreCheck::Ids({ids:?})"),
            Self::Supply(_) => write!(f, "IgnoreCheck::Supply(..)"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Description {
    pub content: String,
    pub usage: String,
    pub examples: Vec<String>,
}

/// Everything configurable about a command besides its id and body.
#[derive(Debug, Clone)]
pub struct CommandOptions {
    pub aliases: Vec<String>,
    pub args: Schema,
    /// Honor quoted spans when tokenizing argument content.
    pub quoted: bool,
    /// Literal phrase separator; disables quoting.
    pub separator: Option<String>,
    /// Explicit flag words, used when `args` is a dynamic schema. Static
    /// lists declare their own.
    pub flags: Vec<String>,
    pub option_flags: Vec<String>,
    pub channel: ChannelScope,
    pub owner_only: bool,
    /// Whether an edited message may re-trigger this command.
    pub editable: bool,
    /// Show a typing indicator around the body.
    pub typing: bool,
    pub cooldown: Option<Duration>,
    /// Uses allowed per cooldown window.
    pub ratelimit: u32,
    /// Prefixes that reach this command instead of the global set.
    pub prefix: Option<PrefixSource>,
    pub client_permissions: Option<PermissionCheck>,
    pub user_permissions: Option<PermissionCheck>,
    /// Match the whole message against this pattern when no direct command
    /// resolves.
    pub regex: Option<Regex>,
    pub ignore_cooldown: Option<IgnoreCheck>,
    pub ignore_permissions: Option<IgnoreCheck>,
    pub argument_defaults: ArgumentDefaults,
    pub description: Description,
    pub lock: Option<LockSpec>,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            aliases: Vec::new(),
            args: Schema::default(),
            quoted: true,
            separator: None,
            flags: Vec::new(),
            option_flags: Vec::new(),
            channel: ChannelScope::Any,
            owner_only: false,
            editable: true,
            typing: false,
            cooldown: None,
            ratelimit: 1,
            prefix: None,
            client_permissions: None,
            user_permissions: None,
            regex: None,
            ignore_cooldown: None,
            ignore_permissions: None,
            argument_defaults: ArgumentDefaults::default(),
            description: Description::default(),
            lock: None,
        }
    }
}

/// The executable side of a command.
#[async_trait]
pub trait CommandRun: Send + Sync {
    async fn exec(&self, ctx: &Ctx, args: &Args) -> anyhow::Result<serde_json::Value>;

    /// Runs after checks pass and before argument parsing.
    async fn before(&self, _ctx: &Ctx) {}

    /// Condition-tier trigger: run this command for any message the
    /// predicate accepts.
    fn condition(&self, _ctx: &Ctx) -> bool {
        false
    }
}

pub struct Command {
    pub id: String,
    pub options: CommandOptions,
    tokenizer: TokenizerConfig,
    /// Lock keys held by in-flight invocations.
    locker: Mutex<HashSet<String>>,
    body: Arc<dyn CommandRun>,
}

impl Command {
    pub fn new(id: impl Into<String>, options: CommandOptions, body: Arc<dyn CommandRun>) -> Self {
        let (flag_words, option_flag_words) = match &options.args {
            Schema::List(specs) => extract_flag_words(specs),
            Schema::Dynamic(_) => (options.flags.clone(), options.option_flags.clone()),
        };
        let tokenizer = TokenizerConfig {
            flag_words,
            option_flag_words,
            quoted: options.quoted,
            separator: options.separator.clone(),
        };
        Self {
            id: id.into(),
            options,
            tokenizer,
            locker: Mutex::new(HashSet::new()),
            body,
        }
    }

    pub fn body(&self) -> &Arc<dyn CommandRun> {
        &self.body
    }

    /// Tokenize argument content and run this command's argument schema
    /// over it.
    pub async fn parse(
        &self,
        env: &ArgEnv,
        ctx: &Ctx,
        content: &str,
    ) -> Result<RunResult, HeraldError> {
        let parsed = tokenize(content, &self.tokenizer);
        let mut source = self.options.args.source();
        herald_args::run(env, ctx, &parsed, &mut *source).await
    }

    /// The key this invocation must hold, if the command locks at all.
    pub fn lock_key(&self, ctx: &Ctx, args: &Args) -> Option<String> {
        match &self.options.lock {
            None => None,
            Some(LockSpec::Guild) => ctx.guild().map(|g| g.id.clone()),
            Some(LockSpec::Channel) => Some(ctx.channel().id.clone()),
            Some(LockSpec::User) => Some(ctx.author().id.clone()),
            Some(LockSpec::Custom(f)) => f(ctx, args),
        }
    }

    /// Claim a lock key. `false` means another invocation holds it.
    pub fn try_lock(&self, key: &str) -> bool {
        self.locker.lock().unwrap().insert(key.to_string())
    }

    pub fn unlock(&self, key: &str) {
        self.locker.lock().unwrap().remove(key);
    }

    pub fn holds_lock(&self, key: &str) -> bool {
        self.locker.lock().unwrap().contains(key)
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("aliases", &self.options.aliases)
            .finish_non_exhaustive()
    }
}

/// Releases a held lock key on every exit path.
pub(crate) struct LockGuard {
    command: Arc<Command>,
    key: String,
}

impl LockGuard {
    pub(crate) fn new(command: Arc<Command>, key: String) -> Self {
        Self { command, key }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.command.unlock(&self.key);
    }
}
