//! The type registry: a mutable name → caster mapping with the built-in
//! casters, plus `TypeExpr` resolution for patterns, enumerations, and
//! ad-hoc caster functions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use herald_core::{lookup, ChannelKind, Ctx};
use regex::Regex;

use crate::probe::DispatchProbe;
use crate::signal::Outcome;
use crate::value::ArgValue;

/// What an argument casts through: a registered name, a caster value, a
/// pattern, or an enumeration of literals (optionally aliased).
#[derive(Clone)]
pub enum TypeExpr {
    Name(String),
    Caster(Arc<dyn TypeCaster>),
    Pattern(Regex),
    OneOf(Vec<String>),
    /// Groups of spellings; a match on any spelling yields the group's
    /// first entry.
    Aliased(Vec<Vec<String>>),
}

impl TypeExpr {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn one_of<S: Into<String>>(entries: impl IntoIterator<Item = S>) -> Self {
        Self::OneOf(entries.into_iter().map(Into::into).collect())
    }
}

impl Default for TypeExpr {
    fn default() -> Self {
        Self::Name("string".into())
    }
}

impl From<&str> for TypeExpr {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl std::fmt::Debug for TypeExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name(n) => write!(f, "TypeExpr::Name({n})"),
            Self::Caster(_) => write!(f, "TypeExpr::Caster(..)"),
            Self::Pattern(r) => write!(f, "TypeExpr::Pattern({r})"),
            Self::OneOf(e) => write!(f, "TypeExpr::OneOf({e:?})"),
            Self::Aliased(e) => write!(f, "TypeExpr::Aliased({e:?})"),
        }
    }
}

/// Everything a caster can reach: the dispatch context, the registry (for
/// nested resolution), and the dispatcher probe for command lookups.
pub struct CastContext<'a> {
    pub ctx: &'a Ctx,
    pub registry: &'a TypeRegistry,
    pub probe: Option<&'a Arc<dyn DispatchProbe>>,
}

#[async_trait]
pub trait TypeCaster: Send + Sync {
    async fn cast(&self, cx: &CastContext<'_>, phrase: &str) -> Outcome;
}

struct FnCaster<F>(F);

#[async_trait]
impl<F> TypeCaster for FnCaster<F>
where
    F: Fn(&CastContext<'_>, &str) -> Outcome + Send + Sync,
{
    async fn cast(&self, cx: &CastContext<'_>, phrase: &str) -> Outcome {
        (self.0)(cx, phrase)
    }
}

/// Wrap a synchronous casting function into a `TypeExpr`.
pub fn caster<F>(f: F) -> TypeExpr
where
    F: Fn(&CastContext<'_>, &str) -> Outcome + Send + Sync + 'static,
{
    TypeExpr::Caster(Arc::new(FnCaster(f)))
}

/// Resolve a `TypeExpr` against a phrase. Shared by arguments and by the
/// combinators for their nested casts.
pub async fn cast_expr(expr: &TypeExpr, cx: &CastContext<'_>, phrase: &str) -> Outcome {
    match expr {
        TypeExpr::OneOf(entries) => {
            for entry in entries {
                if entry.eq_ignore_ascii_case(phrase) {
                    return Outcome::value(entry.clone());
                }
            }
            Outcome::null()
        }
        TypeExpr::Aliased(groups) => {
            for group in groups {
                if group.iter().any(|alias| alias.eq_ignore_ascii_case(phrase)) {
                    if let Some(canonical) = group.first() {
                        return Outcome::value(canonical.clone());
                    }
                }
            }
            Outcome::null()
        }
        TypeExpr::Pattern(regex) => match regex.captures(phrase) {
            None => Outcome::null(),
            Some(caps) => {
                let text = caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default();
                let groups = caps
                    .iter()
                    .skip(1)
                    .map(|m| m.map(|m| m.as_str().to_string()))
                    .collect();
                let all = regex
                    .find_iter(phrase)
                    .map(|m| m.as_str().to_string())
                    .collect();
                Outcome::Value(ArgValue::Match { text, groups, all })
            }
        },
        TypeExpr::Caster(c) => c.cast(cx, phrase).await,
        TypeExpr::Name(name) => match cx.registry.get(name) {
            Some(c) => c.cast(cx, phrase).await,
            // Unregistered names degrade to the string cast.
            None if phrase.is_empty() => Outcome::null(),
            None => Outcome::value(phrase),
        },
    }
}

/// Mutable mapping from type name to caster. Ships with the built-in
/// casters; hosts register their own with `add_fn`/`add`.
pub struct TypeRegistry {
    types: HashMap<String, Arc<dyn TypeCaster>>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.add_builtins();
        registry
    }

    pub fn empty() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TypeCaster>> {
        self.types.get(name).cloned()
    }

    pub fn add(&mut self, name: impl Into<String>, caster: Arc<dyn TypeCaster>) -> &mut Self {
        self.types.insert(name.into(), caster);
        self
    }

    pub fn add_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&CastContext<'_>, &str) -> Outcome + Send + Sync + 'static,
    {
        self.add(name, Arc::new(FnCaster(f)))
    }

    /// Entry point for one cast.
    pub async fn resolve(
        &self,
        expr: &TypeExpr,
        ctx: &Ctx,
        probe: Option<&Arc<dyn DispatchProbe>>,
        phrase: &str,
    ) -> Outcome {
        let cx = CastContext {
            ctx,
            registry: self,
            probe,
        };
        cast_expr(expr, &cx, phrase).await
    }

    fn add_builtins(&mut self) {
        self.add_fn("string", |_, phrase| {
            if phrase.is_empty() {
                Outcome::null()
            } else {
                Outcome::value(phrase)
            }
        });

        self.add_fn("lowercase", |_, phrase| {
            if phrase.is_empty() {
                Outcome::null()
            } else {
                Outcome::value(phrase.to_lowercase())
            }
        });

        self.add_fn("uppercase", |_, phrase| {
            if phrase.is_empty() {
                Outcome::null()
            } else {
                Outcome::value(phrase.to_uppercase())
            }
        });

        self.add_fn("char_codes", |_, phrase| {
            if phrase.is_empty() {
                return Outcome::null();
            }
            let codes = phrase
                .chars()
                .map(|c| ArgValue::Int(c as u32 as i64))
                .collect();
            Outcome::Value(ArgValue::List(codes))
        });

        self.add_fn("number", |_, phrase| {
            match phrase.parse::<f64>() {
                Ok(n) if n.is_finite() => Outcome::Value(ArgValue::Num(n)),
                _ => Outcome::null(),
            }
        });

        self.add_fn("integer", |_, phrase| match phrase.parse::<i64>() {
            Ok(n) => Outcome::Value(ArgValue::Int(n)),
            Err(_) => Outcome::null(),
        });

        self.add_fn("bigint", |_, phrase| match phrase.parse::<i128>() {
            Ok(n) => Outcome::Value(ArgValue::BigInt(n)),
            Err(_) => Outcome::null(),
        });

        self.add_fn("emojint", |_, phrase| {
            if phrase.is_empty() {
                return Outcome::null();
            }
            let mut digits = phrase.replace('\u{1F51F}', "10");
            digits.retain(|c| c != '\u{20E3}' && c != '\u{FE0F}');
            match digits.parse::<i64>() {
                Ok(n) => Outcome::Value(ArgValue::Int(n)),
                Err(_) => Outcome::null(),
            }
        });

        self.add_fn("url", |_, phrase| {
            if phrase.is_empty() {
                return Outcome::null();
            }
            // Angle brackets suppress platform link previews.
            let bare = phrase
                .strip_prefix('<')
                .and_then(|p| p.strip_suffix('>'))
                .unwrap_or(phrase);
            match url::Url::parse(bare) {
                Ok(u) => Outcome::Value(ArgValue::Url(u)),
                Err(_) => Outcome::null(),
            }
        });

        self.add_fn("date", |_, phrase| {
            if phrase.is_empty() {
                return Outcome::null();
            }
            match parse_date(phrase) {
                Some(date) => Outcome::Value(ArgValue::Date(date)),
                None => Outcome::null(),
            }
        });

        self.add_fn("color", |_, phrase| {
            if phrase.is_empty() {
                return Outcome::null();
            }
            let hex = phrase.strip_prefix('#').unwrap_or(phrase);
            match u32::from_str_radix(hex, 16) {
                Ok(color) if color <= 0xFF_FF_FF => Outcome::Value(ArgValue::Color(color)),
                _ => Outcome::null(),
            }
        });

        // --- platform entity lookups -----------------------------------

        self.add_fn("user", |cx, phrase| {
            if phrase.is_empty() {
                return Outcome::null();
            }
            match lookup::resolve_user(phrase, &cx.ctx.client.users(), false, false) {
                Some(user) => Outcome::Value(ArgValue::User(user)),
                None => Outcome::null(),
            }
        });

        self.add_fn("users", |cx, phrase| {
            if phrase.is_empty() {
                return Outcome::null();
            }
            let users = lookup::resolve_users(phrase, &cx.ctx.client.users(), false, false);
            if users.is_empty() {
                Outcome::null()
            } else {
                Outcome::Value(ArgValue::List(
                    users.into_iter().map(ArgValue::User).collect(),
                ))
            }
        });

        self.add_fn("channel", |cx, phrase| resolve_channel_kind(cx, phrase, None));
        self.add_fn("channels", |cx, phrase| resolve_channels_kind(cx, phrase, None));
        self.add_fn("text_channel", |cx, phrase| {
            resolve_channel_kind(cx, phrase, Some(ChannelKind::Text))
        });
        self.add_fn("text_channels", |cx, phrase| {
            resolve_channels_kind(cx, phrase, Some(ChannelKind::Text))
        });
        self.add_fn("voice_channel", |cx, phrase| {
            resolve_channel_kind(cx, phrase, Some(ChannelKind::Voice))
        });
        self.add_fn("voice_channels", |cx, phrase| {
            resolve_channels_kind(cx, phrase, Some(ChannelKind::Voice))
        });
        self.add_fn("category_channel", |cx, phrase| {
            resolve_channel_kind(cx, phrase, Some(ChannelKind::Category))
        });
        self.add_fn("category_channels", |cx, phrase| {
            resolve_channels_kind(cx, phrase, Some(ChannelKind::Category))
        });
        self.add_fn("news_channel", |cx, phrase| {
            resolve_channel_kind(cx, phrase, Some(ChannelKind::News))
        });
        self.add_fn("news_channels", |cx, phrase| {
            resolve_channels_kind(cx, phrase, Some(ChannelKind::News))
        });
        self.add_fn("store_channel", |cx, phrase| {
            resolve_channel_kind(cx, phrase, Some(ChannelKind::Store))
        });
        self.add_fn("store_channels", |cx, phrase| {
            resolve_channels_kind(cx, phrase, Some(ChannelKind::Store))
        });

        self.add_fn("role", |cx, phrase| {
            let Some(guild) = guild_id(cx) else {
                return Outcome::null();
            };
            if phrase.is_empty() {
                return Outcome::null();
            }
            match lookup::resolve_role(phrase, &cx.ctx.client.guild_roles(&guild), false, false) {
                Some(role) => Outcome::Value(ArgValue::Role(role)),
                None => Outcome::null(),
            }
        });

        self.add_fn("roles", |cx, phrase| {
            let Some(guild) = guild_id(cx) else {
                return Outcome::null();
            };
            if phrase.is_empty() {
                return Outcome::null();
            }
            let roles = lookup::resolve_roles(phrase, &cx.ctx.client.guild_roles(&guild), false, false);
            if roles.is_empty() {
                Outcome::null()
            } else {
                Outcome::Value(ArgValue::List(
                    roles.into_iter().map(ArgValue::Role).collect(),
                ))
            }
        });

        self.add_fn("emoji", |cx, phrase| {
            let Some(guild) = guild_id(cx) else {
                return Outcome::null();
            };
            if phrase.is_empty() {
                return Outcome::null();
            }
            match lookup::resolve_emoji(phrase, &cx.ctx.client.guild_emojis(&guild), false, false) {
                Some(emoji) => Outcome::Value(ArgValue::Emoji(emoji)),
                None => Outcome::null(),
            }
        });

        self.add_fn("emojis", |cx, phrase| {
            let Some(guild) = guild_id(cx) else {
                return Outcome::null();
            };
            if phrase.is_empty() {
                return Outcome::null();
            }
            let emojis =
                lookup::resolve_emojis(phrase, &cx.ctx.client.guild_emojis(&guild), false, false);
            if emojis.is_empty() {
                Outcome::null()
            } else {
                Outcome::Value(ArgValue::List(
                    emojis.into_iter().map(ArgValue::Emoji).collect(),
                ))
            }
        });

        self.add_fn("guild", |cx, phrase| {
            if phrase.is_empty() {
                return Outcome::null();
            }
            match lookup::resolve_guild(phrase, &cx.ctx.client.guilds(), false, false) {
                Some(guild) => Outcome::Value(ArgValue::Guild(guild)),
                None => Outcome::null(),
            }
        });

        self.add_fn("guilds", |cx, phrase| {
            if phrase.is_empty() {
                return Outcome::null();
            }
            let guilds = lookup::resolve_guilds(phrase, &cx.ctx.client.guilds(), false, false);
            if guilds.is_empty() {
                Outcome::null()
            } else {
                Outcome::Value(ArgValue::List(
                    guilds.into_iter().map(ArgValue::Guild).collect(),
                ))
            }
        });

        // The person the phrase most plausibly refers to, scoped to the
        // conversation: DM channels search the two participants, guild
        // channels search the user cache.
        self.add_fn("relevant", |cx, phrase| {
            if phrase.is_empty() {
                return Outcome::null();
            }
            let candidates = relevant_users(cx);
            match lookup::resolve_user(phrase, &candidates, false, false) {
                Some(user) => Outcome::Value(ArgValue::User(user)),
                None => Outcome::null(),
            }
        });

        self.add_fn("relevants", |cx, phrase| {
            if phrase.is_empty() {
                return Outcome::null();
            }
            let candidates = relevant_users(cx);
            let users = lookup::resolve_users(phrase, &candidates, false, false);
            if users.is_empty() {
                Outcome::null()
            } else {
                Outcome::Value(ArgValue::List(
                    users.into_iter().map(ArgValue::User).collect(),
                ))
            }
        });

        // --- mention-only forms ----------------------------------------

        self.add_fn("user_mention", |cx, phrase| {
            let Some(id) = lookup::user_mention_id(phrase) else {
                return Outcome::null();
            };
            match cx.ctx.client.users().into_iter().find(|u| u.id == id) {
                Some(user) => Outcome::Value(ArgValue::User(user)),
                None => Outcome::null(),
            }
        });

        self.add_fn("channel_mention", |cx, phrase| {
            let Some(id) = lookup::channel_mention_id(phrase) else {
                return Outcome::null();
            };
            let Some(guild) = guild_id(cx) else {
                return Outcome::null();
            };
            match cx
                .ctx
                .client
                .guild_channels(&guild)
                .into_iter()
                .find(|c| c.id == id)
            {
                Some(channel) => Outcome::Value(ArgValue::Channel(channel)),
                None => Outcome::null(),
            }
        });

        self.add_fn("role_mention", |cx, phrase| {
            let Some(id) = lookup::role_mention_id(phrase) else {
                return Outcome::null();
            };
            let Some(guild) = guild_id(cx) else {
                return Outcome::null();
            };
            match cx
                .ctx
                .client
                .guild_roles(&guild)
                .into_iter()
                .find(|r| r.id == id)
            {
                Some(role) => Outcome::Value(ArgValue::Role(role)),
                None => Outcome::null(),
            }
        });

        self.add_fn("emoji_mention", |cx, phrase| {
            let Some(id) = lookup::emoji_mention_id(phrase) else {
                return Outcome::null();
            };
            let Some(guild) = guild_id(cx) else {
                return Outcome::null();
            };
            match cx
                .ctx
                .client
                .guild_emojis(&guild)
                .into_iter()
                .find(|e| e.id == id)
            {
                Some(emoji) => Outcome::Value(ArgValue::Emoji(emoji)),
                None => Outcome::null(),
            }
        });

        // --- dispatcher-backed lookups ---------------------------------

        self.add_fn("command_alias", |cx, phrase| {
            if phrase.is_empty() {
                return Outcome::null();
            }
            match cx.probe.and_then(|p| p.find_command(phrase)) {
                Some(id) => Outcome::Value(ArgValue::CommandRef(id)),
                None => Outcome::null(),
            }
        });

        self.add_fn("command", |cx, phrase| {
            if phrase.is_empty() {
                return Outcome::null();
            }
            match cx.probe {
                Some(p) if p.has_command(phrase) => {
                    Outcome::Value(ArgValue::CommandRef(phrase.to_string()))
                }
                _ => Outcome::null(),
            }
        });
    }
}

fn guild_id(cx: &CastContext<'_>) -> Option<String> {
    cx.ctx.guild().map(|g| g.id.clone())
}

fn relevant_users(cx: &CastContext<'_>) -> Vec<herald_core::User> {
    let channel = cx.ctx.channel();
    if channel.is_dm() {
        let mut candidates = Vec::new();
        if let Some(recipient) = &channel.recipient {
            candidates.push(recipient.clone());
        }
        candidates.push(cx.ctx.client.client_user());
        candidates
    } else {
        cx.ctx.client.users()
    }
}

fn resolve_channel_kind(cx: &CastContext<'_>, phrase: &str, kind: Option<ChannelKind>) -> Outcome {
    let Some(guild) = guild_id(cx) else {
        return Outcome::null();
    };
    if phrase.is_empty() {
        return Outcome::null();
    }
    let channel = lookup::resolve_channel(phrase, &cx.ctx.client.guild_channels(&guild), false, false);
    match channel {
        Some(c) if kind.is_none() || Some(c.kind) == kind => Outcome::Value(ArgValue::Channel(c)),
        _ => Outcome::null(),
    }
}

fn resolve_channels_kind(cx: &CastContext<'_>, phrase: &str, kind: Option<ChannelKind>) -> Outcome {
    let Some(guild) = guild_id(cx) else {
        return Outcome::null();
    };
    if phrase.is_empty() {
        return Outcome::null();
    }
    let channels: Vec<_> =
        lookup::resolve_channels(phrase, &cx.ctx.client.guild_channels(&guild), false, false)
            .into_iter()
            .filter(|c| kind.is_none() || Some(c.kind) == kind)
            .collect();
    if channels.is_empty() {
        Outcome::null()
    } else {
        Outcome::Value(ArgValue::List(
            channels.into_iter().map(ArgValue::Channel).collect(),
        ))
    }
}

fn parse_date(phrase: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(phrase) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(phrase, "%Y-%m-%d %H:%M:%S") {
        return Utc.from_local_datetime(&naive).single();
    }
    if let Ok(date) = NaiveDate::parse_from_str(phrase, "%Y-%m-%d") {
        return Utc
            .from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
            .single();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use herald_core::{Channel, Guild, MemoryChat, Role, User};

    fn guild_ctx(client: Arc<MemoryChat>) -> Ctx {
        client.add_guild(Guild {
            id: "g1".into(),
            name: "guild one".into(),
        });
        let channel = Channel::text("c1", "general", "g1");
        client.add_channel(channel.clone());
        let author = User::new("u1", "sender");
        let message = client.inbound(&author, &channel, "irrelevant");
        Ctx::new(message, client)
    }

    async fn cast(ctx: &Ctx, registry: &TypeRegistry, name: &str, phrase: &str) -> Outcome {
        registry
            .resolve(&TypeExpr::name(name), ctx, None, phrase)
            .await
    }

    #[tokio::test]
    async fn numeric_casters() {
        let registry = TypeRegistry::new();
        let ctx = guild_ctx(Arc::new(MemoryChat::new()));

        assert_eq!(
            cast(&ctx, &registry, "integer", "42").await,
            Outcome::Value(ArgValue::Int(42))
        );
        assert!(cast(&ctx, &registry, "integer", "4.5").await.is_failure());
        assert_eq!(
            cast(&ctx, &registry, "number", "4.5").await,
            Outcome::Value(ArgValue::Num(4.5))
        );
        assert!(cast(&ctx, &registry, "number", "abc").await.is_failure());
        assert_eq!(
            cast(&ctx, &registry, "bigint", "170141183460469231731687303715884105727").await,
            Outcome::Value(ArgValue::BigInt(i128::MAX))
        );
    }

    #[tokio::test]
    async fn emojint_reads_keycap_digits() {
        let registry = TypeRegistry::new();
        let ctx = guild_ctx(Arc::new(MemoryChat::new()));

        assert_eq!(
            cast(&ctx, &registry, "emojint", "1\u{FE0F}\u{20E3}2\u{FE0F}\u{20E3}").await,
            Outcome::Value(ArgValue::Int(12))
        );
        assert_eq!(
            cast(&ctx, &registry, "emojint", "\u{1F51F}").await,
            Outcome::Value(ArgValue::Int(10))
        );
    }

    #[tokio::test]
    async fn url_caster_strips_angle_wrapping() {
        let registry = TypeRegistry::new();
        let ctx = guild_ctx(Arc::new(MemoryChat::new()));

        let out = cast(&ctx, &registry, "url", "<https://example.com/a>").await;
        match out {
            Outcome::Value(ArgValue::Url(u)) => assert_eq!(u.as_str(), "https://example.com/a"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(cast(&ctx, &registry, "url", "not a url").await.is_failure());
    }

    #[tokio::test]
    async fn color_caster_bounds() {
        let registry = TypeRegistry::new();
        let ctx = guild_ctx(Arc::new(MemoryChat::new()));

        assert_eq!(
            cast(&ctx, &registry, "color", "#ff0000").await,
            Outcome::Value(ArgValue::Color(0xFF0000))
        );
        assert!(cast(&ctx, &registry, "color", "1000000").await.is_failure());
    }

    #[tokio::test]
    async fn entity_casters_search_the_client_cache() {
        let client = Arc::new(MemoryChat::new());
        client.add_user(User::new("20000000000000000", "carol"));
        client.add_role(Role {
            id: "30000000000000000".into(),
            name: "mods".into(),
            guild_id: "g1".into(),
        });
        let registry = TypeRegistry::new();
        let ctx = guild_ctx(client);

        match cast(&ctx, &registry, "user", "caro").await {
            Outcome::Value(ArgValue::User(u)) => assert_eq!(u.name, "carol"),
            other => panic!("unexpected: {other:?}"),
        }
        match cast(&ctx, &registry, "role", "<@&30000000000000000>").await {
            Outcome::Value(ArgValue::Role(r)) => assert_eq!(r.name, "mods"),
            other => panic!("unexpected: {other:?}"),
        }
        match cast(&ctx, &registry, "channel", "#gen").await {
            Outcome::Value(ArgValue::Channel(c)) => assert_eq!(c.id, "c1"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(cast(&ctx, &registry, "voice_channel", "general")
            .await
            .is_failure());
    }

    #[tokio::test]
    async fn enumerations_match_case_insensitively() {
        let registry = TypeRegistry::new();
        let ctx = guild_ctx(Arc::new(MemoryChat::new()));

        let one_of = TypeExpr::one_of(["North", "South"]);
        assert_eq!(
            registry.resolve(&one_of, &ctx, None, "north").await,
            Outcome::value("North")
        );
        assert!(registry.resolve(&one_of, &ctx, None, "east").await.is_failure());

        let aliased = TypeExpr::Aliased(vec![
            vec!["red".into(), "r".into()],
            vec!["blue".into(), "b".into()],
        ]);
        assert_eq!(
            registry.resolve(&aliased, &ctx, None, "B").await,
            Outcome::value("blue")
        );
    }

    #[tokio::test]
    async fn pattern_collects_groups_and_occurrences() {
        let registry = TypeRegistry::new();
        let ctx = guild_ctx(Arc::new(MemoryChat::new()));

        let pattern = TypeExpr::Pattern(Regex::new(r"(\d+)-(\d+)").unwrap());
        match registry.resolve(&pattern, &ctx, None, "3-4 and 5-6").await {
            Outcome::Value(ArgValue::Match { text, groups, all }) => {
                assert_eq!(text, "3-4");
                assert_eq!(groups, vec![Some("3".to_string()), Some("4".to_string())]);
                assert_eq!(all, vec!["3-4".to_string(), "5-6".to_string()]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_name_degrades_to_string() {
        let registry = TypeRegistry::new();
        let ctx = guild_ctx(Arc::new(MemoryChat::new()));

        assert_eq!(
            cast(&ctx, &registry, "no_such_type", "hello").await,
            Outcome::value("hello")
        );
        assert!(cast(&ctx, &registry, "no_such_type", "").await.is_failure());
    }

    #[tokio::test]
    async fn user_registered_types_override_nothing_but_resolve() {
        let mut registry = TypeRegistry::new();
        registry.add_fn("shout", |_, phrase| {
            if phrase.is_empty() {
                Outcome::null()
            } else {
                Outcome::value(format!("{}!", phrase.to_uppercase()))
            }
        });
        let ctx = guild_ctx(Arc::new(MemoryChat::new()));

        assert_eq!(
            cast(&ctx, &registry, "shout", "hey").await,
            Outcome::value("HEY!")
        );
    }
}
