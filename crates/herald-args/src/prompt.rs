//! Prompt configuration and the shared in-prompt marker.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use herald_core::{Ctx, Message};

use crate::value::ArgValue;

/// Data handed to prompt-text suppliers and modifiers.
#[derive(Debug, Clone)]
pub struct PromptData {
    /// Current attempt number, starting at 1.
    pub retries: u32,
    pub infinite: bool,
    /// The message being reacted to: the trigger for the first prompt, the
    /// offending reply afterwards.
    pub message: Message,
    pub phrase: String,
    /// Payload of the failed cast, when one exists.
    pub failure: Option<ArgValue>,
}

/// Data handed to computed default values.
#[derive(Debug, Clone)]
pub struct FailureData {
    pub phrase: String,
    pub failure: Option<ArgValue>,
}

pub type TextSupplier = Arc<dyn Fn(&Ctx, &PromptData) -> String + Send + Sync>;
pub type TextModifier = Arc<dyn Fn(&Ctx, String, &PromptData) -> String + Send + Sync>;

/// A piece of response text: fixed, multi-line (joined with newlines), or
/// computed.
#[derive(Clone)]
pub enum TextSource {
    Static(String),
    Lines(Vec<String>),
    Supply(TextSupplier),
}

impl TextSource {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Static(content.into())
    }

    pub fn supply<F>(f: F) -> Self
    where
        F: Fn(&Ctx, &PromptData) -> String + Send + Sync + 'static,
    {
        Self::Supply(Arc::new(f))
    }

    pub fn render(&self, ctx: &Ctx, data: &PromptData) -> String {
        match self {
            Self::Static(text) => text.clone(),
            Self::Lines(lines) => lines.join("\n"),
            Self::Supply(f) => f(ctx, data),
        }
    }
}

impl From<&str> for TextSource {
    fn from(text: &str) -> Self {
        Self::Static(text.to_string())
    }
}

impl std::fmt::Debug for TextSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(text) => write!(f, "TextSource::Static({text:?})"),
            Self::Lines(lines) => write!(f, "TextSource::Lines({lines:?})"),
            Self::Supply(_) => write!(f, "TextSource::Supply(..)"),
        }
    }
}

/// Per-argument prompt configuration. Unset fields fall back to the
/// command's argument defaults, then the dispatcher's, then the built-in
/// defaults.
#[derive(Clone, Default)]
pub struct PromptOptions {
    pub retries: Option<u32>,
    pub time: Option<Duration>,
    pub cancel_word: Option<String>,
    pub stop_word: Option<String>,
    /// An empty phrase skips casting entirely and resolves the default.
    pub optional: Option<bool>,
    /// Collect values until the stop word or the limit.
    pub infinite: Option<bool>,
    pub limit: Option<usize>,
    /// Let a reply that parses as a command abort this prompt and dispatch
    /// that command instead.
    pub breakout: Option<bool>,
    pub start: Option<TextSource>,
    pub retry: Option<TextSource>,
    pub timeout: Option<TextSource>,
    pub ended: Option<TextSource>,
    pub cancel: Option<TextSource>,
    pub modify_start: Option<TextModifier>,
    pub modify_retry: Option<TextModifier>,
    pub modify_timeout: Option<TextModifier>,
    pub modify_ended: Option<TextModifier>,
    pub modify_cancel: Option<TextModifier>,
}

impl std::fmt::Debug for PromptOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptOptions")
            .field("retries", &self.retries)
            .field("time", &self.time)
            .field("optional", &self.optional)
            .field("infinite", &self.infinite)
            .finish_non_exhaustive()
    }
}

/// Argument-level defaults configurable on the command and the dispatcher.
#[derive(Clone, Default)]
pub struct ArgumentDefaults {
    pub prompt: PromptOptions,
    pub otherwise: Option<TextSource>,
    pub modify_otherwise: Option<TextModifier>,
}

impl std::fmt::Debug for ArgumentDefaults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArgumentDefaults")
            .field("prompt", &self.prompt)
            .finish_non_exhaustive()
    }
}

/// Fully-resolved prompt options for one collect run.
#[derive(Clone)]
pub(crate) struct EffectivePrompt {
    pub retries: u32,
    pub time: Duration,
    pub cancel_word: String,
    pub stop_word: String,
    pub infinite: bool,
    pub limit: usize,
    pub breakout: bool,
    pub start: Option<TextSource>,
    pub retry: Option<TextSource>,
    pub timeout: Option<TextSource>,
    pub ended: Option<TextSource>,
    pub cancel: Option<TextSource>,
    pub modify_start: Option<TextModifier>,
    pub modify_retry: Option<TextModifier>,
    pub modify_timeout: Option<TextModifier>,
    pub modify_ended: Option<TextModifier>,
    pub modify_cancel: Option<TextModifier>,
}

macro_rules! pick {
    ($field:ident, $arg:expr, $cmd:expr, $handler:expr) => {
        $arg.and_then(|p| p.$field.clone())
            .or_else(|| $cmd.$field.clone())
            .or_else(|| $handler.$field.clone())
    };
}

pub(crate) fn effective_prompt(
    arg: Option<&PromptOptions>,
    command: &PromptOptions,
    handler: &PromptOptions,
) -> EffectivePrompt {
    EffectivePrompt {
        retries: pick!(retries, arg, command, handler).unwrap_or(1),
        time: pick!(time, arg, command, handler).unwrap_or(Duration::from_secs(30)),
        cancel_word: pick!(cancel_word, arg, command, handler).unwrap_or_else(|| "cancel".into()),
        stop_word: pick!(stop_word, arg, command, handler).unwrap_or_else(|| "stop".into()),
        infinite: pick!(infinite, arg, command, handler).unwrap_or(false),
        limit: pick!(limit, arg, command, handler).unwrap_or(usize::MAX),
        breakout: pick!(breakout, arg, command, handler).unwrap_or(true),
        start: pick!(start, arg, command, handler),
        retry: pick!(retry, arg, command, handler),
        timeout: pick!(timeout, arg, command, handler),
        ended: pick!(ended, arg, command, handler),
        cancel: pick!(cancel, arg, command, handler),
        modify_start: pick!(modify_start, arg, command, handler),
        modify_retry: pick!(modify_retry, arg, command, handler),
        modify_timeout: pick!(modify_timeout, arg, command, handler),
        modify_ended: pick!(modify_ended, arg, command, handler),
        modify_cancel: pick!(modify_cancel, arg, command, handler),
    }
}

pub(crate) fn effective_optional(
    arg: Option<&PromptOptions>,
    command: &PromptOptions,
    handler: &PromptOptions,
) -> bool {
    pick!(optional, arg, command, handler).unwrap_or(false)
}

/// The set of (channel, user) pairs currently answering a prompt.
///
/// Updated before a prompt wait begins and cleared on every exit path, and
/// read by the dispatcher's all-tier check so concurrent messages from a
/// prompted user do not start new commands in that channel.
#[derive(Default)]
pub struct PromptTracker {
    inner: Mutex<HashMap<String, HashSet<String>>>,
}

impl PromptTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, channel_id: &str, user_id: &str) {
        self.inner
            .lock()
            .unwrap()
            .entry(channel_id.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    pub fn remove(&self, channel_id: &str, user_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(users) = inner.get_mut(channel_id) {
            users.remove(user_id);
            if users.is_empty() {
                inner.remove(channel_id);
            }
        }
    }

    pub fn has(&self, channel_id: &str, user_id: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .get(channel_id)
            .is_some_and(|users| users.contains(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_clears_empty_channel_buckets() {
        let tracker = PromptTracker::new();
        tracker.add("c1", "u1");
        assert!(tracker.has("c1", "u1"));

        tracker.remove("c1", "u1");
        assert!(!tracker.has("c1", "u1"));
        assert!(tracker.inner.lock().unwrap().is_empty());
    }

    #[test]
    fn argument_options_win_over_defaults() {
        let arg = PromptOptions {
            retries: Some(3),
            ..PromptOptions::default()
        };
        let command = PromptOptions {
            retries: Some(2),
            time: Some(Duration::from_secs(5)),
            ..PromptOptions::default()
        };
        let handler = PromptOptions::default();

        let effective = effective_prompt(Some(&arg), &command, &handler);
        assert_eq!(effective.retries, 3);
        assert_eq!(effective.time, Duration::from_secs(5));
        assert_eq!(effective.cancel_word, "cancel");
        assert!(effective.breakout);
    }
}
