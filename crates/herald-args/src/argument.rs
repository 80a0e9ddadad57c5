//! One argument's extraction contract: how to cast a phrase, and what to do
//! when the cast fails: fall back, reply with a canned message, or prompt
//! the sender interactively.

use std::sync::Arc;

use herald_core::{Ctx, HeraldError, Outgoing};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::probe::DispatchProbe;
use crate::prompt::{
    effective_optional, effective_prompt, ArgumentDefaults, EffectivePrompt, FailureData,
    PromptData, PromptOptions, PromptTracker, TextModifier, TextSource,
};
use crate::signal::{Outcome, Signal};
use crate::types::{TypeExpr, TypeRegistry};
use crate::value::ArgValue;

/// How an argument pulls tokens out of the tokenized content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// One phrase at the shared cursor (or a fixed index).
    Phrase,
    /// All remaining phrases joined into one string.
    Rest,
    /// Each remaining phrase cast independently, collected into a list.
    Separate,
    /// Presence (or count) of one or more flag words.
    Flag,
    /// The value of a named option-flag.
    Option,
    /// Raw phrase join from a fixed index; does not move the cursor.
    Text,
    /// Raw join over all tokens from a fixed index.
    Content,
    /// Raw join over all tokens from the shared token cursor.
    RestContent,
    /// Casts an empty string; for computed-only arguments.
    None,
}

/// Candidate set for unordered phrase matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unordered {
    No,
    /// Probe every remaining phrase.
    All,
    /// Probe phrases from this index on.
    From(usize),
    /// Probe exactly these indices.
    Indices(Vec<usize>),
}

/// A static or computed fallback value.
#[derive(Clone)]
pub enum DefaultSource {
    Static(ArgValue),
    Supply(Arc<dyn Fn(&Ctx, &FailureData) -> ArgValue + Send + Sync>),
}

impl DefaultSource {
    pub fn value(value: impl Into<ArgValue>) -> Self {
        Self::Static(value.into())
    }
}

impl std::fmt::Debug for DefaultSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(v) => write!(f, "DefaultSource::Static({v:?})"),
            Self::Supply(_) => write!(f, "DefaultSource::Supply(..)"),
        }
    }
}

/// Everything configurable about one named argument. Immutable once built;
/// owned by a command.
#[derive(Clone)]
pub struct ArgSpec {
    pub id: String,
    pub match_kind: MatchKind,
    pub ty: TypeExpr,
    /// Flag words for the `Flag`/`Option` match kinds.
    pub flags: Vec<String>,
    /// Count flags / collect every option value instead of the first.
    pub multiple_flags: bool,
    /// Fixed phrase index; bypasses and does not advance the shared cursor.
    pub index: Option<usize>,
    pub unordered: Unordered,
    /// Cap on phrases consumed by the joining/collecting match kinds.
    pub limit: usize,
    pub default: Option<DefaultSource>,
    /// Canned response sent on failure (then the command cancels).
    pub otherwise: Option<TextSource>,
    pub modify_otherwise: Option<TextModifier>,
    pub prompt: Option<PromptOptions>,
}

impl ArgSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            match_kind: MatchKind::Phrase,
            ty: TypeExpr::default(),
            flags: Vec::new(),
            multiple_flags: false,
            index: None,
            unordered: Unordered::No,
            limit: usize::MAX,
            default: None,
            otherwise: None,
            modify_otherwise: None,
            prompt: None,
        }
    }
}

impl Default for ArgSpec {
    fn default() -> Self {
        Self::new("")
    }
}

impl std::fmt::Debug for ArgSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArgSpec")
            .field("id", &self.id)
            .field("match_kind", &self.match_kind)
            .field("ty", &self.ty)
            .field("index", &self.index)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

/// Shared surroundings of one argument run: registry, layered defaults, the
/// in-prompt marker, and the dispatcher probe.
#[derive(Clone)]
pub struct ArgEnv {
    pub registry: Arc<TypeRegistry>,
    pub handler_defaults: ArgumentDefaults,
    pub command_defaults: ArgumentDefaults,
    pub prompts: Arc<PromptTracker>,
    pub probe: Option<Arc<dyn DispatchProbe>>,
}

impl ArgEnv {
    pub fn new(registry: Arc<TypeRegistry>, prompts: Arc<PromptTracker>) -> Self {
        Self {
            registry,
            handler_defaults: ArgumentDefaults::default(),
            command_defaults: ArgumentDefaults::default(),
            prompts,
            probe: None,
        }
    }
}

pub async fn cast(env: &ArgEnv, ctx: &Ctx, spec: &ArgSpec, phrase: &str) -> Outcome {
    env.registry
        .resolve(&spec.ty, ctx, env.probe.as_ref(), phrase)
        .await
}

/// Resolve one argument from a phrase.
pub async fn process(
    env: &ArgEnv,
    ctx: &Ctx,
    spec: &ArgSpec,
    phrase: &str,
) -> Result<Outcome, HeraldError> {
    let optional = effective_optional(
        spec.prompt.as_ref(),
        &env.command_defaults.prompt,
        &env.handler_defaults.prompt,
    );
    let otherwise = spec
        .otherwise
        .clone()
        .or_else(|| env.command_defaults.otherwise.clone())
        .or_else(|| env.handler_defaults.otherwise.clone());
    let modify_otherwise = spec
        .modify_otherwise
        .clone()
        .or_else(|| env.command_defaults.modify_otherwise.clone())
        .or_else(|| env.handler_defaults.modify_otherwise.clone());

    if phrase.is_empty() && optional {
        if let Some(source) = &otherwise {
            return send_otherwise(ctx, source, &modify_otherwise, phrase, None).await;
        }
        return Ok(Outcome::Value(resolve_default(ctx, spec, phrase, None)));
    }

    let res = cast(env, ctx, spec, phrase).await;
    if res.is_failure() {
        if let Some(source) = &otherwise {
            return send_otherwise(ctx, source, &modify_otherwise, phrase, res.failure_payload())
                .await;
        }
        if spec.prompt.is_some() {
            return collect(env, ctx, spec, phrase, res.failure_payload()).await;
        }
        if spec.default.is_some() {
            return Ok(Outcome::Value(resolve_default(
                ctx,
                spec,
                phrase,
                res.failure_payload(),
            )));
        }
        return Ok(res);
    }

    Ok(res)
}

fn resolve_default(ctx: &Ctx, spec: &ArgSpec, phrase: &str, failure: Option<ArgValue>) -> ArgValue {
    match &spec.default {
        None => ArgValue::Null,
        Some(DefaultSource::Static(value)) => value.clone(),
        Some(DefaultSource::Supply(f)) => f(
            ctx,
            &FailureData {
                phrase: phrase.to_string(),
                failure,
            },
        ),
    }
}

fn render_text(
    ctx: &Ctx,
    source: &Option<TextSource>,
    modifier: &Option<TextModifier>,
    data: &PromptData,
) -> String {
    let mut text = source
        .as_ref()
        .map(|s| s.render(ctx, data))
        .unwrap_or_default();
    if let Some(modify) = modifier {
        text = modify(ctx, text, data);
    }
    text
}

async fn send_otherwise(
    ctx: &Ctx,
    source: &TextSource,
    modifier: &Option<TextModifier>,
    phrase: &str,
    failure: Option<ArgValue>,
) -> Result<Outcome, HeraldError> {
    let data = PromptData {
        retries: 0,
        infinite: false,
        message: ctx.message.clone(),
        phrase: phrase.to_string(),
        failure,
    };
    let text = render_text(ctx, &Some(source.clone()), modifier, &data);
    if !text.is_empty() {
        ctx.client
            .send(&ctx.channel().id, Outgoing::text(text))
            .await?;
    }
    Ok(Outcome::Signal(Signal::Cancel))
}

/// Prompt the sender until the argument resolves, the retries run out, or
/// the wait times out. Registers the (channel, user) pair as in-prompt for
/// the whole exchange.
pub(crate) async fn collect(
    env: &ArgEnv,
    ctx: &Ctx,
    spec: &ArgSpec,
    command_input: &str,
    first_failure: Option<ArgValue>,
) -> Result<Outcome, HeraldError> {
    let prompt = effective_prompt(
        spec.prompt.as_ref(),
        &env.command_defaults.prompt,
        &env.handler_defaults.prompt,
    );
    let infinite =
        prompt.infinite || (spec.match_kind == MatchKind::Separate && command_input.is_empty());

    let channel_id = ctx.channel().id.clone();
    let author_id = ctx.author().id.clone();

    env.prompts.add(&channel_id, &author_id);
    let result = prompt_loop(env, ctx, spec, &prompt, infinite, command_input, first_failure).await;
    env.prompts.remove(&channel_id, &author_id);
    result
}

async fn prompt_loop(
    env: &ArgEnv,
    ctx: &Ctx,
    spec: &ArgSpec,
    prompt: &EffectivePrompt,
    infinite: bool,
    command_input: &str,
    first_failure: Option<ArgValue>,
) -> Result<Outcome, HeraldError> {
    let channel_id = ctx.channel().id.clone();
    let author_id = ctx.author().id.clone();

    let mut values: Vec<ArgValue> = Vec::new();
    // A phrase given on the command line already consumed one attempt.
    let mut retry_count: u32 = if command_input.is_empty() { 1 } else { 2 };
    let mut prev_message = ctx.message.clone();
    let mut prev_input = command_input.to_string();
    let mut prev_failure = first_failure;

    loop {
        // A retry prompt, the start of a run, or the start of an infinite
        // collection; follow-up asks of an infinite collection stay silent.
        if retry_count != 1 || !infinite || values.is_empty() {
            let (source, modifier) = if retry_count == 1 {
                (&prompt.start, &prompt.modify_start)
            } else {
                (&prompt.retry, &prompt.modify_retry)
            };
            let data = PromptData {
                retries: retry_count,
                infinite,
                message: prev_message.clone(),
                phrase: prev_input.clone(),
                failure: prev_failure.clone(),
            };
            let text = render_text(ctx, source, modifier, &data);
            if !text.is_empty() {
                ctx.responder.send(Outgoing::text(text)).await?;
                ctx.responder.set_editable(false).await;
            }
        }

        let Some(input) = ctx
            .client
            .next_reply(&channel_id, &author_id, prompt.time)
            .await
        else {
            debug!(argument = %spec.id, "prompt timed out");
            let data = PromptData {
                retries: retry_count,
                infinite,
                message: prev_message.clone(),
                phrase: prev_input.clone(),
                failure: None,
            };
            let text = render_text(ctx, &prompt.timeout, &prompt.modify_timeout, &data);
            if !text.is_empty() {
                ctx.client.send(&channel_id, Outgoing::text(text)).await?;
            }
            return Ok(Outcome::Signal(Signal::Cancel));
        };

        // A reply that is itself a command hands control back to the
        // dispatcher.
        if prompt.breakout {
            if let Some(probe) = &env.probe {
                if probe.parses_as_command(&input).await {
                    return Ok(Outcome::Signal(Signal::Retry(input)));
                }
            }
        }

        if input.content.to_lowercase() == prompt.cancel_word.to_lowercase() {
            let data = PromptData {
                retries: retry_count,
                infinite,
                message: input.clone(),
                phrase: input.content.clone(),
                failure: None,
            };
            let text = render_text(ctx, &prompt.cancel, &prompt.modify_cancel, &data);
            if !text.is_empty() {
                ctx.client.send(&channel_id, Outgoing::text(text)).await?;
            }
            return Ok(Outcome::Signal(Signal::Cancel));
        }

        if infinite && input.content.to_lowercase() == prompt.stop_word.to_lowercase() {
            if values.is_empty() {
                // Nothing collected yet; keep asking.
                retry_count += 1;
                prev_message = input.clone();
                prev_input = input.content.clone();
                prev_failure = None;
                continue;
            }
            return Ok(Outcome::Value(ArgValue::List(values)));
        }

        let parsed = cast(env, ctx, spec, &input.content).await;
        if parsed.is_failure() {
            if retry_count <= prompt.retries {
                retry_count += 1;
                prev_message = input.clone();
                prev_input = input.content.clone();
                prev_failure = parsed.failure_payload();
                continue;
            }
            let data = PromptData {
                retries: retry_count,
                infinite,
                message: input.clone(),
                phrase: input.content.clone(),
                failure: parsed.failure_payload(),
            };
            let text = render_text(ctx, &prompt.ended, &prompt.modify_ended, &data);
            if !text.is_empty() {
                ctx.client.send(&channel_id, Outgoing::text(text)).await?;
            }
            return Ok(Outcome::Signal(Signal::Cancel));
        }

        let value = parsed.into_resolved();
        if infinite {
            values.push(value);
            if values.len() < prompt.limit {
                retry_count = 1;
                prev_message = ctx.message.clone();
                prev_input = input.content.clone();
                prev_failure = None;
                continue;
            }
            return Ok(Outcome::Value(ArgValue::List(values)));
        }

        return Ok(Outcome::Value(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use herald_core::{Channel, MemoryChat, User};

    fn setup() -> (Arc<MemoryChat>, Ctx, ArgEnv, Channel, User) {
        let client = Arc::new(MemoryChat::new());
        let channel = Channel::text("c1", "general", "g1");
        client.add_channel(channel.clone());
        let author = User::new("u1", "sender");
        let message = client.inbound(&author, &channel, "trigger");
        let ctx = Ctx::new(message, client.clone());
        let env = ArgEnv::new(
            Arc::new(TypeRegistry::new()),
            Arc::new(PromptTracker::new()),
        );
        (client, ctx, env, channel, author)
    }

    fn prompted_spec(retries: u32) -> ArgSpec {
        ArgSpec {
            ty: "integer".into(),
            prompt: Some(PromptOptions {
                retries: Some(retries),
                time: Some(Duration::from_secs(5)),
                start: Some("give me a number".into()),
                retry: Some("not a number, again".into()),
                ended: Some("giving up".into()),
                cancel: Some("cancelled".into()),
                timeout: Some("too slow".into()),
                ..PromptOptions::default()
            }),
            ..ArgSpec::new("n")
        }
    }

    #[tokio::test]
    async fn empty_optional_argument_takes_the_default() {
        let (_, ctx, env, _, _) = setup();
        let spec = ArgSpec {
            ty: "integer".into(),
            default: Some(DefaultSource::value(9)),
            prompt: Some(PromptOptions {
                optional: Some(true),
                ..PromptOptions::default()
            }),
            ..ArgSpec::new("n")
        };

        let out = process(&env, &ctx, &spec, "").await.unwrap();
        assert_eq!(out, Outcome::Value(ArgValue::Int(9)));
    }

    #[tokio::test]
    async fn otherwise_sends_text_and_cancels() {
        let (client, ctx, env, _, _) = setup();
        let spec = ArgSpec {
            ty: "integer".into(),
            otherwise: Some("that is not a number".into()),
            ..ArgSpec::new("n")
        };

        let out = process(&env, &ctx, &spec, "abc").await.unwrap();
        assert_eq!(out, Outcome::Signal(Signal::Cancel));
        assert_eq!(client.sent_contents(), vec!["that is not a number"]);
    }

    #[tokio::test]
    async fn failure_without_fallback_returns_the_failure() {
        let (_, ctx, env, _, _) = setup();
        let spec = ArgSpec {
            ty: "integer".into(),
            ..ArgSpec::new("n")
        };

        let out = process(&env, &ctx, &spec, "abc").await.unwrap();
        assert!(out.is_failure());
    }

    #[tokio::test]
    async fn prompt_recovers_after_one_invalid_reply() {
        let (client, ctx, env, channel, author) = setup();
        client.queue_reply(client.inbound(&author, &channel, "abc"));
        client.queue_reply(client.inbound(&author, &channel, "5"));

        let out = process(&env, &ctx, &prompted_spec(1), "").await.unwrap();
        assert_eq!(out, Outcome::Value(ArgValue::Int(5)));

        let sent = client.sent_contents();
        assert!(sent.contains(&"give me a number".to_string()));
        assert!(sent.contains(&"not a number, again".to_string()));
        assert!(!env.prompts.has("c1", "u1"));
    }

    #[tokio::test]
    async fn prompt_gives_up_after_retries_run_out() {
        let (client, ctx, env, channel, author) = setup();
        client.queue_reply(client.inbound(&author, &channel, "abc"));
        client.queue_reply(client.inbound(&author, &channel, "def"));

        let out = process(&env, &ctx, &prompted_spec(1), "").await.unwrap();
        assert_eq!(out, Outcome::Signal(Signal::Cancel));

        let endings = client
            .sent_contents()
            .iter()
            .filter(|c| *c == "giving up")
            .count();
        assert_eq!(endings, 1);
        assert!(!env.prompts.has("c1", "u1"));
    }

    #[tokio::test]
    async fn cancel_word_cancels_the_prompt() {
        let (client, ctx, env, channel, author) = setup();
        client.queue_reply(client.inbound(&author, &channel, "CANCEL"));

        let out = process(&env, &ctx, &prompted_spec(3), "").await.unwrap();
        assert_eq!(out, Outcome::Signal(Signal::Cancel));
        assert!(client.sent_contents().contains(&"cancelled".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn prompt_timeout_cancels_and_notifies() {
        let (client, ctx, env, _, _) = setup();

        let out = process(&env, &ctx, &prompted_spec(1), "").await.unwrap();
        assert_eq!(out, Outcome::Signal(Signal::Cancel));
        assert!(client.sent_contents().contains(&"too slow".to_string()));
        assert!(!env.prompts.has("c1", "u1"));
    }

    #[tokio::test]
    async fn infinite_prompt_collects_until_stop_word() {
        let (client, ctx, env, channel, author) = setup();
        client.queue_reply(client.inbound(&author, &channel, "stop"));
        client.queue_reply(client.inbound(&author, &channel, "1"));
        client.queue_reply(client.inbound(&author, &channel, "2"));
        client.queue_reply(client.inbound(&author, &channel, "stop"));

        let mut spec = prompted_spec(5);
        if let Some(prompt) = &mut spec.prompt {
            prompt.infinite = Some(true);
        }

        // The first stop word arrives before any value and is ignored.
        let out = process(&env, &ctx, &spec, "").await.unwrap();
        assert_eq!(
            out,
            Outcome::Value(ArgValue::List(vec![ArgValue::Int(1), ArgValue::Int(2)]))
        );
    }

    #[tokio::test]
    async fn breakout_returns_retry_with_the_reply() {
        struct AlwaysCommand;

        #[async_trait::async_trait]
        impl DispatchProbe for AlwaysCommand {
            async fn parses_as_command(&self, _message: &herald_core::Message) -> bool {
                true
            }
            fn find_command(&self, _alias: &str) -> Option<String> {
                None
            }
            fn has_command(&self, _id: &str) -> bool {
                false
            }
        }

        let (client, ctx, mut env, channel, author) = setup();
        env.probe = Some(Arc::new(AlwaysCommand));
        let reply = client.inbound(&author, &channel, "!other command");
        client.queue_reply(reply.clone());

        let out = process(&env, &ctx, &prompted_spec(1), "").await.unwrap();
        assert_eq!(out, Outcome::Signal(Signal::Retry(reply)));
    }

    #[tokio::test]
    async fn in_prompt_marker_is_set_during_the_wait() {
        let (client, ctx, env, channel, author) = setup();
        let prompts = env.prompts.clone();

        let probe_client = client.clone();
        let spec = prompted_spec(1);
        let task = tokio::spawn({
            let ctx = ctx.clone();
            let env = env.clone();
            async move { process(&env, &ctx, &spec, "").await }
        });

        // Let the prompt register and send its start text.
        for _ in 0..50 {
            tokio::task::yield_now().await;
            if prompts.has("c1", "u1") {
                break;
            }
        }
        assert!(prompts.has("c1", "u1"));

        probe_client.queue_reply(client.inbound(&author, &channel, "7"));
        let out = task.await.unwrap().unwrap();
        assert_eq!(out, Outcome::Value(ArgValue::Int(7)));
        assert!(!prompts.has("c1", "u1"));
    }
}
