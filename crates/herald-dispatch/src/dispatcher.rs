//! The message-handling state machine: prefix/alias resolution, inhibitor
//! tiers, permission/cooldown/lock checks, regex and conditional command
//! fan-out, and final invocation.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::{join_all, BoxFuture};
use herald_args::{
    ArgEnv, ArgValue, Args, ArgumentDefaults, DispatchProbe, PromptTracker, RunResult, Signal,
    TypeRegistry,
};
use herald_core::{ChatClient, ContextDecorator, Ctx, HeraldError, Message, Responder};
use regex::Regex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::command::{ChannelScope, Command, IgnoreCheck, LockGuard, PermissionCheck, PrefixSource};
use crate::cooldown::CooldownTracker;
use crate::events::{reasons, Event, EventBus, PermissionSide};
use crate::inhibitor::{Inhibitor, InhibitorKind, InhibitorSet};

pub struct DispatcherOptions {
    pub prefix: PrefixSource,
    /// Accept a mention of the client as a prefix.
    pub allow_mention: bool,
    pub block_bots: bool,
    pub block_client: bool,
    /// Re-handle edited messages, reusing the per-message responder so the
    /// previous response is edited in place.
    pub handle_edits: bool,
    /// Cooldown applied to commands that do not configure their own.
    pub default_cooldown: Option<Duration>,
    /// Who skips cooldowns. Unset falls back to `owners`.
    pub ignore_cooldown: Option<IgnoreCheck>,
    pub ignore_permissions: Option<IgnoreCheck>,
    pub owners: Vec<String>,
    pub argument_defaults: ArgumentDefaults,
    /// Register each alias a second time with this pattern stripped.
    pub alias_replacement: Option<Regex>,
    pub decorator: Option<Arc<dyn ContextDecorator>>,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            prefix: PrefixSource::one("!"),
            allow_mention: true,
            block_bots: true,
            block_client: true,
            handle_edits: false,
            default_cooldown: None,
            ignore_cooldown: None,
            ignore_permissions: None,
            owners: Vec::new(),
            argument_defaults: ArgumentDefaults::default(),
            alias_replacement: None,
            decorator: None,
        }
    }
}

/// Order prefixes are tried in: longest first, then lexicographic; the
/// empty prefix last; suppliers after fixed strings.
pub fn prefix_compare(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.len().cmp(&a.len()).then_with(|| a.cmp(b)),
    }
}

#[derive(Clone)]
enum PrefixKey {
    Fixed(String),
    Supply(Arc<dyn Fn(&Ctx) -> Vec<String> + Send + Sync>),
}

fn prefix_key_compare(a: &PrefixKey, b: &PrefixKey) -> Ordering {
    match (a, b) {
        (PrefixKey::Fixed(a), PrefixKey::Fixed(b)) => prefix_compare(a, b),
        // The empty prefix sorts after suppliers too.
        (PrefixKey::Fixed(a), PrefixKey::Supply(_)) => {
            if a.is_empty() {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (PrefixKey::Supply(_), PrefixKey::Fixed(b)) => {
            if b.is_empty() {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (PrefixKey::Supply(_), PrefixKey::Supply(_)) => Ordering::Equal,
    }
}

/// Result of resolving one message against the prefix/alias tables.
#[derive(Debug, Clone, Default)]
pub struct ParsedMessage {
    pub command: Option<Arc<Command>>,
    pub prefix: Option<String>,
    pub alias: Option<String>,
    /// The text after the alias: the command's argument content.
    pub content: Option<String>,
    pub after_prefix: Option<String>,
}

pub struct Dispatcher {
    client: Arc<dyn ChatClient>,
    options: DispatcherOptions,
    registry: Arc<TypeRegistry>,
    prompts: Arc<PromptTracker>,
    cooldowns: CooldownTracker,
    inhibitors: RwLock<InhibitorSet>,
    events: EventBus,
    commands: RwLock<HashMap<String, Arc<Command>>>,
    aliases: RwLock<HashMap<String, String>>,
    /// Per-command prefix overrides, sorted by `prefix_key_compare`.
    overrides: RwLock<Vec<(PrefixKey, HashSet<String>)>>,
    /// Responders kept per message id while `handle_edits` is on.
    responders: Mutex<HashMap<String, Arc<Responder>>>,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn ChatClient>, options: DispatcherOptions) -> Self {
        Self::with_registry(client, options, Arc::new(TypeRegistry::new()))
    }

    pub fn with_registry(
        client: Arc<dyn ChatClient>,
        options: DispatcherOptions,
        registry: Arc<TypeRegistry>,
    ) -> Self {
        Self {
            client,
            options,
            registry,
            prompts: Arc::new(PromptTracker::new()),
            cooldowns: CooldownTracker::new(),
            inhibitors: RwLock::new(InhibitorSet::new()),
            events: EventBus::new(),
            commands: RwLock::new(HashMap::new()),
            aliases: RwLock::new(HashMap::new()),
            overrides: RwLock::new(Vec::new()),
            responders: Mutex::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &Arc<dyn ChatClient> {
        &self.client
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// The in-prompt marker shared with the argument engine.
    pub fn prompts(&self) -> &Arc<PromptTracker> {
        &self.prompts
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn add_inhibitor(&self, inhibitor: Arc<dyn Inhibitor>) {
        self.inhibitors.write().unwrap().add(inhibitor);
    }

    /// Register a command. Alias conflicts and duplicate ids are fatal.
    pub fn register(&self, command: Command) -> Result<Arc<Command>, HeraldError> {
        let command = Arc::new(command);

        let mut commands = self.commands.write().unwrap();
        if commands.contains_key(&command.id) {
            return Err(HeraldError::DuplicateCommand(command.id.clone()));
        }

        let mut candidates: Vec<String> = Vec::new();
        for alias in &command.options.aliases {
            let lower = alias.to_lowercase();
            candidates.push(lower.clone());
            if let Some(pattern) = &self.options.alias_replacement {
                let replaced = pattern.replace_all(&lower, "").to_string();
                if replaced != lower {
                    candidates.push(replaced);
                }
            }
        }

        let mut aliases = self.aliases.write().unwrap();
        let mut fresh: HashSet<&str> = HashSet::new();
        for candidate in &candidates {
            if let Some(existing) = aliases.get(candidate) {
                return Err(HeraldError::AliasConflict {
                    alias: candidate.clone(),
                    existing: existing.clone(),
                });
            }
            if !fresh.insert(candidate) {
                return Err(HeraldError::AliasConflict {
                    alias: candidate.clone(),
                    existing: command.id.clone(),
                });
            }
        }
        for candidate in candidates {
            aliases.insert(candidate, command.id.clone());
        }
        commands.insert(command.id.clone(), command.clone());
        drop(aliases);
        drop(commands);

        if let Some(prefix) = &command.options.prefix {
            let mut overrides = self.overrides.write().unwrap();
            match prefix {
                PrefixSource::Fixed(list) => {
                    for prefix in list {
                        let slot = overrides.iter_mut().find(
                            |(key, _)| matches!(key, PrefixKey::Fixed(p) if p == prefix),
                        );
                        match slot {
                            Some((_, ids)) => {
                                ids.insert(command.id.clone());
                            }
                            None => overrides.push((
                                PrefixKey::Fixed(prefix.clone()),
                                HashSet::from([command.id.clone()]),
                            )),
                        }
                    }
                }
                PrefixSource::Supply(supplier) => overrides.push((
                    PrefixKey::Supply(supplier.clone()),
                    HashSet::from([command.id.clone()]),
                )),
            }
            overrides.sort_by(|(a, _), (b, _)| prefix_key_compare(a, b));
        }

        Ok(command)
    }

    pub fn command(&self, id: &str) -> Option<Arc<Command>> {
        self.commands.read().unwrap().get(id).cloned()
    }

    pub fn find_command(&self, alias: &str) -> Option<Arc<Command>> {
        let id = self.aliases.read().unwrap().get(&alias.to_lowercase()).cloned()?;
        self.command(&id)
    }

    /// Handle one inbound message through the full pipeline.
    ///
    /// Errors during handling become `Event::Error` when anyone is
    /// subscribed; otherwise they surface here.
    pub async fn handle(self: &Arc<Self>, message: Message) -> Result<(), HeraldError> {
        match self.dispatch(message.clone()).await {
            Ok(_) => Ok(()),
            Err(err) => self.surface_error(&message, None, err),
        }
    }

    /// Prune responders older than `lifetime`; returns how many were
    /// dropped.
    pub fn sweep_responders(&self, lifetime: Duration) -> usize {
        let cutoff = chrono::TimeDelta::from_std(lifetime).unwrap_or(chrono::TimeDelta::MAX);
        let now = Utc::now();
        let mut responders = self.responders.lock().unwrap();
        let before = responders.len();
        responders.retain(|_, responder| {
            let message = responder.message();
            let stamp = message.edited_at.unwrap_or(message.timestamp);
            now - stamp <= cutoff
        });
        before - responders.len()
    }

    fn dispatch(self: &Arc<Self>, message: Message) -> BoxFuture<'static, Result<bool, HeraldError>> {
        let this = self.clone();
        Box::pin(async move { Dispatcher::dispatch_inner(&this, message).await })
    }

    async fn dispatch_inner(self: &Arc<Self>, message: Message) -> Result<bool, HeraldError> {
        let ctx = self.build_ctx(message);

        if self.run_all_inhibitors(&ctx).await {
            return Ok(false);
        }
        if self.run_pre_inhibitors(&ctx).await {
            return Ok(false);
        }

        let mut parsed = self.parse_command(&ctx);
        if parsed.command.is_none() {
            let overridden = self.parse_overridden(&ctx);
            if overridden.command.is_some()
                || (parsed.prefix.is_none() && overridden.prefix.is_some())
            {
                parsed = overridden;
            }
        }

        let ran = match parsed.command.clone() {
            Some(command) => {
                let content = parsed.content.clone().unwrap_or_default();
                self.handle_direct(ctx.clone(), content, command, false).await?
            }
            None => self.handle_fanout(&ctx).await?,
        };

        if !ran {
            debug!(message = %ctx.message.id, "nothing ran for message");
            self.events.emit(Event::MessageInvalid {
                message: ctx.message.clone(),
            });
        }
        Ok(ran)
    }

    fn build_ctx(&self, message: Message) -> Ctx {
        let mut ctx = Ctx::new(message, self.client.clone());
        if self.options.handle_edits {
            let mut responders = self.responders.lock().unwrap();
            match responders.get(&ctx.message.id) {
                Some(responder) => ctx.responder = responder.clone(),
                None => {
                    responders.insert(ctx.message.id.clone(), ctx.responder.clone());
                }
            }
        }
        if let Some(decorator) = &self.options.decorator {
            decorator.decorate(&mut ctx);
        }
        ctx
    }

    // --- inhibitor tiers ---------------------------------------------------

    async fn run_all_inhibitors(&self, ctx: &Ctx) -> bool {
        if self.options.block_client && ctx.author().id == self.client.client_user().id {
            self.emit_message_blocked(ctx, reasons::CLIENT.into());
            return true;
        }
        if self.options.block_bots && ctx.author().bot {
            self.emit_message_blocked(ctx, reasons::BOT.into());
            return true;
        }

        let set = self.inhibitors.read().unwrap().clone();
        if let Some(reason) = set.test(InhibitorKind::All, ctx, None).await {
            self.emit_message_blocked(ctx, reason);
            return true;
        }

        if self.prompts.has(&ctx.channel().id, &ctx.author().id) {
            self.events.emit(Event::InPrompt {
                message: ctx.message.clone(),
            });
            return true;
        }
        false
    }

    async fn run_pre_inhibitors(&self, ctx: &Ctx) -> bool {
        let set = self.inhibitors.read().unwrap().clone();
        match set.test(InhibitorKind::Pre, ctx, None).await {
            Some(reason) => {
                self.emit_message_blocked(ctx, reason);
                true
            }
            None => false,
        }
    }

    async fn run_post_inhibitors(&self, ctx: &Ctx, command: &Arc<Command>) -> bool {
        let opts = &command.options;
        if opts.owner_only && !self.options.owners.contains(&ctx.author().id) {
            self.emit_command_blocked(ctx, command, reasons::OWNER.into());
            return true;
        }
        if opts.channel == ChannelScope::Guild && ctx.guild().is_none() {
            self.emit_command_blocked(ctx, command, reasons::GUILD.into());
            return true;
        }
        if opts.channel == ChannelScope::Dm && ctx.guild().is_some() {
            self.emit_command_blocked(ctx, command, reasons::DM.into());
            return true;
        }
        if self.run_permission_checks(ctx, command) {
            return true;
        }

        let set = self.inhibitors.read().unwrap().clone();
        if let Some(reason) = set.test(InhibitorKind::Post, ctx, Some(command)).await {
            self.emit_command_blocked(ctx, command, reason);
            return true;
        }

        self.run_cooldowns(ctx, command)
    }

    fn run_permission_checks(&self, ctx: &Ctx, command: &Arc<Command>) -> bool {
        if let Some(check) = &command.options.client_permissions {
            let me = self.client.client_user();
            if let Some(missing) = self.missing_permissions(ctx, check, &me.id) {
                self.events.emit(Event::MissingPermissions {
                    message: ctx.message.clone(),
                    command: command.id.clone(),
                    side: PermissionSide::Client,
                    missing,
                });
                return true;
            }
        }

        if let Some(check) = &command.options.user_permissions {
            let ignorer = command
                .options
                .ignore_permissions
                .as_ref()
                .or(self.options.ignore_permissions.as_ref());
            let ignored = ignorer.is_some_and(|i| i.applies(ctx, &command.id));
            if !ignored {
                if let Some(missing) = self.missing_permissions(ctx, check, &ctx.author().id) {
                    self.events.emit(Event::MissingPermissions {
                        message: ctx.message.clone(),
                        command: command.id.clone(),
                        side: PermissionSide::User,
                        missing,
                    });
                    return true;
                }
            }
        }

        false
    }

    fn missing_permissions(
        &self,
        ctx: &Ctx,
        check: &PermissionCheck,
        user_id: &str,
    ) -> Option<Vec<String>> {
        match check {
            PermissionCheck::Supply(f) => f(ctx).filter(|missing| !missing.is_empty()),
            PermissionCheck::Named(required) => {
                // Named permissions only exist inside a guild.
                ctx.guild()?;
                let held = self.client.permissions_for(&ctx.channel().id, user_id);
                let missing: Vec<String> = required
                    .iter()
                    .filter(|p| !held.contains(p))
                    .cloned()
                    .collect();
                (!missing.is_empty()).then_some(missing)
            }
        }
    }

    fn run_cooldowns(&self, ctx: &Ctx, command: &Arc<Command>) -> bool {
        let ignorer = command
            .options
            .ignore_cooldown
            .as_ref()
            .or(self.options.ignore_cooldown.as_ref());
        let ignored = match ignorer {
            Some(ignorer) => ignorer.applies(ctx, &command.id),
            None => self.options.owners.contains(&ctx.author().id),
        };
        if ignored {
            return false;
        }

        let Some(window) = command.options.cooldown.or(self.options.default_cooldown) else {
            return false;
        };

        match self.cooldowns.check(
            &ctx.author().id,
            &command.id,
            window,
            command.options.ratelimit,
        ) {
            Ok(()) => false,
            Err(remaining) => {
                self.events.emit(Event::Cooldown {
                    message: ctx.message.clone(),
                    command: command.id.clone(),
                    remaining,
                });
                true
            }
        }
    }

    // --- command paths -----------------------------------------------------

    fn handle_direct(
        self: &Arc<Self>,
        ctx: Ctx,
        content: String,
        command: Arc<Command>,
        ignore_checks: bool,
    ) -> BoxFuture<'static, Result<bool, HeraldError>> {
        let this = self.clone();
        Box::pin(async move {
            match Dispatcher::direct_inner(&this, &ctx, &content, &command, ignore_checks).await {
                Ok(ran) => Ok(ran),
                Err(err) => {
                    this.surface_error(&ctx.message, Some(&command.id), err)?;
                    Ok(true)
                }
            }
        })
    }

    async fn direct_inner(
        self: &Arc<Self>,
        ctx: &Ctx,
        content: &str,
        command: &Arc<Command>,
        ignore_checks: bool,
    ) -> Result<bool, HeraldError> {
        if !ignore_checks {
            if ctx.message.edited() && !command.options.editable {
                return Ok(false);
            }
            if self.run_post_inhibitors(ctx, command).await {
                return Ok(false);
            }
        }

        ctx.responder.constrain_editable(command.options.editable).await;
        command.body().before(ctx).await;

        let env = self.arg_env(command);
        let args = match command.parse(&env, ctx, content).await? {
            RunResult::Signal(signal) => {
                return match signal {
                    Signal::Cancel | Signal::Fail(_) => {
                        self.events.emit(Event::CommandCancelled {
                            message: ctx.message.clone(),
                            command: command.id.clone(),
                        });
                        Ok(true)
                    }
                    Signal::Retry(next) => {
                        self.events.emit(Event::CommandBreakout {
                            message: ctx.message.clone(),
                            command: command.id.clone(),
                            replay: next.clone(),
                        });
                        self.dispatch(next).await
                    }
                    Signal::Continue {
                        command: target,
                        ignore_checks: ignore_next,
                        rest,
                    } => {
                        let Some(target) = self.command(&target) else {
                            return Err(HeraldError::UnknownCommand(target));
                        };
                        self.handle_direct(
                            ctx.clone(),
                            rest.unwrap_or_default(),
                            target,
                            ignore_next,
                        )
                        .await
                    }
                };
            }
            RunResult::Args(args) => args,
        };

        let _guard = if !ignore_checks {
            match command.lock_key(ctx, &args) {
                Some(key) => {
                    if !command.try_lock(&key) {
                        self.events.emit(Event::CommandLocked {
                            message: ctx.message.clone(),
                            command: command.id.clone(),
                        });
                        return Ok(true);
                    }
                    Some(LockGuard::new(command.clone(), key))
                }
                None => None,
            }
        } else {
            None
        };

        self.run_command(ctx, command, args).await?;
        Ok(true)
    }

    async fn handle_fanout(self: &Arc<Self>, ctx: &Ctx) -> Result<bool, HeraldError> {
        let ran_regex = self.handle_regex_commands(ctx).await?;
        let ran_conditional = self.handle_conditional_commands(ctx).await?;
        Ok(ran_regex || ran_conditional)
    }

    fn fanout_candidates(&self, ctx: &Ctx) -> Vec<Arc<Command>> {
        self.commands
            .read()
            .unwrap()
            .values()
            .filter(|c| !ctx.message.edited() || c.options.editable)
            .cloned()
            .collect()
    }

    async fn handle_regex_commands(self: &Arc<Self>, ctx: &Ctx) -> Result<bool, HeraldError> {
        let content = ctx.message.content.clone();
        let mut matched: Vec<(Arc<Command>, Args)> = Vec::new();
        for command in self.fanout_candidates(ctx) {
            let Some(regex) = command.options.regex.clone() else {
                continue;
            };
            let Some(caps) = regex.captures(&content) else {
                continue;
            };
            let text = caps
                .get(0)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            let groups: Vec<Option<String>> = caps
                .iter()
                .skip(1)
                .map(|m| m.map(|m| m.as_str().to_string()))
                .collect();
            let all: Vec<String> = regex
                .find_iter(&content)
                .map(|m| m.as_str().to_string())
                .collect();

            let mut args = Args::new();
            args.insert(
                "matches",
                ArgValue::List(all.iter().cloned().map(ArgValue::Str).collect()),
            );
            args.insert("match", ArgValue::Match { text, groups, all });
            matched.push((command, args));
        }

        if matched.is_empty() {
            return Ok(false);
        }
        self.run_fanout(ctx, matched).await?;
        Ok(true)
    }

    async fn handle_conditional_commands(self: &Arc<Self>, ctx: &Ctx) -> Result<bool, HeraldError> {
        let matched: Vec<(Arc<Command>, Args)> = self
            .fanout_candidates(ctx)
            .into_iter()
            .filter(|c| c.body().condition(ctx))
            .map(|c| (c, Args::new()))
            .collect();

        if matched.is_empty() {
            return Ok(false);
        }
        self.run_fanout(ctx, matched).await?;
        Ok(true)
    }

    /// Run every matched command's pipeline concurrently; a failure in one
    /// never cancels the others.
    async fn run_fanout(
        self: &Arc<Self>,
        ctx: &Ctx,
        matched: Vec<(Arc<Command>, Args)>,
    ) -> Result<(), HeraldError> {
        let runs = matched.into_iter().map(|(command, args)| {
            let this = self.clone();
            let ctx = ctx.clone();
            async move {
                let result: Result<(), HeraldError> = async {
                    if this.run_post_inhibitors(&ctx, &command).await {
                        return Ok(());
                    }
                    command.body().before(&ctx).await;
                    this.run_command(&ctx, &command, args).await
                }
                .await;
                result.err().map(|err| (command.id.clone(), err))
            }
        });

        let failures: Vec<(String, HeraldError)> =
            join_all(runs).await.into_iter().flatten().collect();
        for (command_id, err) in failures {
            self.surface_error(&ctx.message, Some(&command_id), err)?;
        }
        Ok(())
    }

    async fn run_command(
        &self,
        ctx: &Ctx,
        command: &Arc<Command>,
        args: Args,
    ) -> Result<(), HeraldError> {
        if command.options.typing {
            ctx.client.start_typing(&ctx.channel().id).await;
        }

        debug!(command = %command.id, message = %ctx.message.id, "command started");
        self.events.emit(Event::CommandStarted {
            message: ctx.message.clone(),
            command: command.id.clone(),
        });
        let ret = command.body().exec(ctx, &args).await;

        if command.options.typing {
            ctx.client.stop_typing(&ctx.channel().id).await;
        }

        match ret {
            Ok(value) => {
                self.events.emit(Event::CommandFinished {
                    message: ctx.message.clone(),
                    command: command.id.clone(),
                    value,
                });
                Ok(())
            }
            Err(err) => Err(HeraldError::Other(err)),
        }
    }

    // --- prefix resolution -------------------------------------------------

    /// Resolve against the global prefix set (plus the mention prefixes).
    pub fn parse_command(&self, ctx: &Ctx) -> ParsedMessage {
        let mut prefixes = self.options.prefix.resolve(ctx);
        if self.options.allow_mention {
            let me = self.client.client_user();
            prefixes.insert(0, format!("<@!{}>", me.id));
            prefixes.insert(0, format!("<@{}>", me.id));
        }
        prefixes.sort_by(|a, b| prefix_compare(a, b));

        let pairs = prefixes.into_iter().map(|p| (p, None)).collect();
        self.parse_multiple(ctx, pairs)
    }

    /// Resolve against per-command prefix overrides.
    pub fn parse_overridden(&self, ctx: &Ctx) -> ParsedMessage {
        let overrides = self.overrides.read().unwrap().clone();
        if overrides.is_empty() {
            return ParsedMessage::default();
        }

        let mut pairs: Vec<(String, Option<HashSet<String>>)> = Vec::new();
        for (key, ids) in &overrides {
            match key {
                PrefixKey::Fixed(prefix) => pairs.push((prefix.clone(), Some(ids.clone()))),
                PrefixKey::Supply(supplier) => pairs.extend(
                    supplier(ctx)
                        .into_iter()
                        .map(|prefix| (prefix, Some(ids.clone()))),
                ),
            }
        }
        pairs.sort_by(|(a, _), (b, _)| prefix_compare(a, b));
        self.parse_multiple(ctx, pairs)
    }

    fn parse_multiple(
        &self,
        ctx: &Ctx,
        pairs: Vec<(String, Option<HashSet<String>>)>,
    ) -> ParsedMessage {
        let parses: Vec<ParsedMessage> = pairs
            .iter()
            .map(|(prefix, ids)| self.parse_with_prefix(ctx, prefix, ids.as_ref()))
            .collect();

        // A command match wins over any bare prefix match.
        if let Some(found) = parses.iter().find(|p| p.command.is_some()) {
            return found.clone();
        }
        if let Some(guess) = parses.into_iter().find(|p| p.prefix.is_some()) {
            return guess;
        }
        ParsedMessage::default()
    }

    fn parse_with_prefix(
        &self,
        ctx: &Ctx,
        prefix: &str,
        associated: Option<&HashSet<String>>,
    ) -> ParsedMessage {
        let content = ctx.message.content.as_str();
        let Some(head) = content.get(..prefix.len()) else {
            return ParsedMessage::default();
        };
        if !head.eq_ignore_ascii_case(prefix) {
            return ParsedMessage::default();
        }

        let after = &content[prefix.len()..];
        let start_of_args = prefix.len() + (after.len() - after.trim_start().len());
        let alias = content[start_of_args..]
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_string();
        let rest = content
            .get(start_of_args + alias.len()..)
            .unwrap_or("")
            .trim()
            .to_string();

        let mut parsed = ParsedMessage {
            command: None,
            prefix: Some(prefix.to_string()),
            alias: Some(alias.clone()),
            content: Some(rest),
            after_prefix: Some(after.trim().to_string()),
        };

        let Some(command) = self.find_command(&alias) else {
            return parsed;
        };
        // A command with its own prefix set is only reachable through it.
        let reachable = match associated {
            None => command.options.prefix.is_none(),
            Some(ids) => ids.contains(&command.id),
        };
        if reachable {
            parsed.command = Some(command);
        }
        parsed
    }

    // --- plumbing ----------------------------------------------------------

    fn arg_env(self: &Arc<Self>, command: &Arc<Command>) -> ArgEnv {
        ArgEnv {
            registry: self.registry.clone(),
            handler_defaults: self.options.argument_defaults.clone(),
            command_defaults: command.options.argument_defaults.clone(),
            prompts: self.prompts.clone(),
            probe: Some(Arc::new(Probe {
                dispatcher: Arc::downgrade(self),
            })),
        }
    }

    fn emit_message_blocked(&self, ctx: &Ctx, reason: String) {
        debug!(message = %ctx.message.id, %reason, "message blocked");
        self.events.emit(Event::MessageBlocked {
            message: ctx.message.clone(),
            reason,
        });
    }

    fn emit_command_blocked(&self, ctx: &Ctx, command: &Arc<Command>, reason: String) {
        debug!(command = %command.id, %reason, "command blocked");
        self.events.emit(Event::CommandBlocked {
            message: ctx.message.clone(),
            command: command.id.clone(),
            reason,
        });
    }

    fn surface_error(
        &self,
        message: &Message,
        command: Option<&str>,
        err: HeraldError,
    ) -> Result<(), HeraldError> {
        if self.events.has_subscribers() {
            warn!(error = %err, command = command.unwrap_or("-"), "dispatch error");
            self.events.emit(Event::Error {
                message: message.clone(),
                command: command.map(String::from),
                error: err.to_string(),
            });
            Ok(())
        } else {
            Err(err)
        }
    }
}

/// The dispatcher as seen by the argument engine: command lookups for the
/// breakout check and the command-referencing casters.
struct Probe {
    dispatcher: Weak<Dispatcher>,
}

#[async_trait]
impl DispatchProbe for Probe {
    async fn parses_as_command(&self, message: &Message) -> bool {
        let Some(dispatcher) = self.dispatcher.upgrade() else {
            return false;
        };
        let ctx = Ctx::new(message.clone(), dispatcher.client.clone());
        if dispatcher.parse_command(&ctx).command.is_some() {
            return true;
        }
        dispatcher.parse_overridden(&ctx).command.is_some()
    }

    fn find_command(&self, alias: &str) -> Option<String> {
        let dispatcher = self.dispatcher.upgrade()?;
        let id = dispatcher
            .aliases
            .read()
            .unwrap()
            .get(&alias.to_lowercase())
            .cloned()?;
        Some(id)
    }

    fn has_command(&self, id: &str) -> bool {
        self.dispatcher
            .upgrade()
            .is_some_and(|d| d.commands.read().unwrap().contains_key(id))
    }
}
