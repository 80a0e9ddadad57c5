//! The argument runner: drives a sequence of argument specs against one
//! tokenized result, maintaining shared cursor state so phrase-matching
//! arguments consume disjoint tokens.

use std::collections::HashSet;

use herald_core::{Ctx, HeraldError};
use herald_parse::{Tokenized, TokenKind};

use crate::argument::{self, ArgEnv, ArgSpec, MatchKind, Unordered};
use crate::signal::{Outcome, Signal};
use crate::source::{ArgumentSource, SourceStep};
use crate::value::{ArgValue, Args};

/// Mutable cursor state scoped to one run. `index` (over all tokens) only
/// ever advances.
#[derive(Debug, Default)]
pub struct RunnerState {
    pub used_indices: HashSet<usize>,
    pub phrase_index: usize,
    pub index: usize,
}

/// Result of one argument run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunResult {
    Args(Args),
    Signal(Signal),
}

/// Run an argument source to completion against tokenized content.
pub async fn run(
    env: &ArgEnv,
    ctx: &Ctx,
    parsed: &Tokenized,
    source: &mut dyn ArgumentSource,
) -> Result<RunResult, HeraldError> {
    let mut state = RunnerState::default();
    let mut previous: Option<ArgValue> = None;

    loop {
        match source.next(previous.take()) {
            SourceStep::Done(args) => return Ok(RunResult::Args(args)),
            SourceStep::Signal(signal) => return Ok(finish_signal(parsed, &state, signal)),
            SourceStep::Arg(spec) => {
                let outcome = run_one(env, ctx, parsed, &mut state, &spec).await?;
                match outcome {
                    Outcome::Value(value) => previous = Some(value),
                    Outcome::Signal(Signal::Fail(payload)) => {
                        previous = Some(ArgValue::Failure(payload.map(Box::new)));
                    }
                    Outcome::Signal(signal) => {
                        return Ok(finish_signal(parsed, &state, signal));
                    }
                }
            }
        }
    }
}

/// Attach the untouched remainder after the token cursor to a `Continue`
/// handoff before surfacing the signal.
fn finish_signal(parsed: &Tokenized, state: &RunnerState, mut signal: Signal) -> RunResult {
    if let Signal::Continue { rest, .. } = &mut signal {
        *rest = Some(parsed.join_all_raws(state.index, usize::MAX));
    }
    RunResult::Signal(signal)
}

async fn run_one(
    env: &ArgEnv,
    ctx: &Ctx,
    parsed: &Tokenized,
    state: &mut RunnerState,
    spec: &ArgSpec,
) -> Result<Outcome, HeraldError> {
    match spec.match_kind {
        MatchKind::Phrase => run_phrase(env, ctx, parsed, state, spec).await,
        MatchKind::Rest => run_rest(env, ctx, parsed, state, spec).await,
        MatchKind::Separate => run_separate(env, ctx, parsed, state, spec).await,
        MatchKind::Flag => Ok(run_flag(parsed, spec)),
        MatchKind::Option => run_option(env, ctx, parsed, spec).await,
        MatchKind::Text => run_text(env, ctx, parsed, spec).await,
        MatchKind::Content => run_content(env, ctx, parsed, spec).await,
        MatchKind::RestContent => run_rest_content(env, ctx, parsed, state, spec).await,
        MatchKind::None => argument::process(env, ctx, spec, "").await,
    }
}

async fn run_phrase(
    env: &ArgEnv,
    ctx: &Ctx,
    parsed: &Tokenized,
    state: &mut RunnerState,
    spec: &ArgSpec,
) -> Result<Outcome, HeraldError> {
    if spec.unordered != Unordered::No {
        let indices: Vec<usize> = match &spec.unordered {
            Unordered::All => (0..parsed.phrase_count()).collect(),
            Unordered::From(start) => (*start..parsed.phrase_count()).collect(),
            Unordered::Indices(indices) => indices.clone(),
            Unordered::No => unreachable!(),
        };

        for i in indices {
            if state.used_indices.contains(&i) {
                continue;
            }
            let phrase = parsed.phrase(i).map(|t| t.value_str()).unwrap_or("");
            // Probe with a bare cast; prompting belongs to the fallthrough.
            let res = argument::cast(env, ctx, spec, phrase).await;
            if !res.is_failure() {
                state.used_indices.insert(i);
                return Ok(res);
            }
        }

        // No candidate matched.
        return argument::process(env, ctx, spec, "").await;
    }

    let index = spec.index.unwrap_or(state.phrase_index);
    let phrase = parsed
        .phrase(index)
        .map(|t| t.value_str().to_string())
        .unwrap_or_default();
    let ret = argument::process(env, ctx, spec, &phrase).await;
    if spec.index.is_none() {
        increase_index(parsed, state, 1);
    }
    ret
}

async fn run_rest(
    env: &ArgEnv,
    ctx: &Ctx,
    parsed: &Tokenized,
    state: &mut RunnerState,
    spec: &ArgSpec,
) -> Result<Outcome, HeraldError> {
    let index = spec.index.unwrap_or(state.phrase_index);
    let rest = parsed.join_phrase_raws(index, spec.limit);
    let ret = argument::process(env, ctx, spec, rest.trim()).await;
    if spec.index.is_none() {
        increase_index(parsed, state, 1);
    }
    ret
}

async fn run_separate(
    env: &ArgEnv,
    ctx: &Ctx,
    parsed: &Tokenized,
    state: &mut RunnerState,
    spec: &ArgSpec,
) -> Result<Outcome, HeraldError> {
    let index = spec.index.unwrap_or(state.phrase_index);
    let phrases: Vec<String> = (index..)
        .take(spec.limit.min(parsed.phrase_count().saturating_sub(index)))
        .filter_map(|i| parsed.phrase(i).map(|t| t.value_str().to_string()))
        .collect();

    if phrases.is_empty() {
        let ret = argument::process(env, ctx, spec, "").await;
        if spec.index.is_none() {
            increase_index(parsed, state, 1);
        }
        return ret;
    }

    let mut results = Vec::with_capacity(phrases.len());
    for phrase in &phrases {
        let outcome = argument::process(env, ctx, spec, phrase).await?;
        match outcome {
            Outcome::Signal(signal) if signal.is_short_circuit() => {
                return Ok(Outcome::Signal(signal));
            }
            other => results.push(other.into_resolved()),
        }
    }

    if spec.index.is_none() {
        increase_index(parsed, state, 1);
    }
    Ok(Outcome::Value(ArgValue::List(results)))
}

fn run_flag(parsed: &Tokenized, spec: &ArgSpec) -> Outcome {
    let matches = |key: Option<&str>| {
        key.is_some_and(|k| spec.flags.iter().any(|name| name.eq_ignore_ascii_case(k)))
    };

    if spec.multiple_flags {
        let count = parsed.flags().filter(|t| matches(t.key.as_deref())).count();
        return Outcome::Value(ArgValue::Int(count as i64));
    }

    let found = parsed.flags().any(|t| matches(t.key.as_deref()));
    Outcome::Value(ArgValue::Bool(found))
}

async fn run_option(
    env: &ArgEnv,
    ctx: &Ctx,
    parsed: &Tokenized,
    spec: &ArgSpec,
) -> Result<Outcome, HeraldError> {
    let matches = |key: Option<&str>| {
        key.is_some_and(|k| spec.flags.iter().any(|name| name.eq_ignore_ascii_case(k)))
    };

    if spec.multiple_flags {
        let values: Vec<String> = parsed
            .option_flags()
            .filter(|t| matches(t.key.as_deref()))
            .map(|t| t.value_str().to_string())
            .take(spec.limit)
            .collect();

        let mut results = Vec::with_capacity(values.len());
        for value in &values {
            let outcome = argument::process(env, ctx, spec, value).await?;
            match outcome {
                Outcome::Signal(signal) if signal.is_short_circuit() => {
                    return Ok(Outcome::Signal(signal));
                }
                other => results.push(other.into_resolved()),
            }
        }
        return Ok(Outcome::Value(ArgValue::List(results)));
    }

    let value = parsed
        .option_flags()
        .find(|t| matches(t.key.as_deref()))
        .map(|t| t.value_str().to_string())
        .unwrap_or_default();
    argument::process(env, ctx, spec, &value).await
}

async fn run_text(
    env: &ArgEnv,
    ctx: &Ctx,
    parsed: &Tokenized,
    spec: &ArgSpec,
) -> Result<Outcome, HeraldError> {
    let index = spec.index.unwrap_or(0);
    let text = parsed.join_phrase_raws(index, spec.limit);
    argument::process(env, ctx, spec, text.trim()).await
}

async fn run_content(
    env: &ArgEnv,
    ctx: &Ctx,
    parsed: &Tokenized,
    spec: &ArgSpec,
) -> Result<Outcome, HeraldError> {
    let index = spec.index.unwrap_or(0);
    let content = parsed.join_all_raws(index, spec.limit);
    argument::process(env, ctx, spec, content.trim()).await
}

async fn run_rest_content(
    env: &ArgEnv,
    ctx: &Ctx,
    parsed: &Tokenized,
    state: &mut RunnerState,
    spec: &ArgSpec,
) -> Result<Outcome, HeraldError> {
    let index = spec.index.unwrap_or(state.index);
    let rest = parsed.join_all_raws(index, spec.limit);
    let ret = argument::process(env, ctx, spec, rest.trim()).await;
    if spec.index.is_none() {
        increase_index(parsed, state, 1);
    }
    ret
}

/// Advance the phrase cursor by `n`, moving the all-token cursor past any
/// interleaved flag tokens.
pub fn increase_index(parsed: &Tokenized, state: &mut RunnerState, n: usize) {
    state.phrase_index += n;
    let mut remaining = n;
    while remaining > 0 {
        loop {
            state.index += 1;
            match parsed.all().get(state.index) {
                Some(token) if token.kind != TokenKind::Phrase => continue,
                _ => break,
            }
        }
        remaining -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use herald_core::{Channel, MemoryChat, User};
    use herald_parse::{tokenize, TokenizerConfig};

    use crate::prompt::PromptTracker;
    use crate::source::ListSource;
    use crate::types::TypeRegistry;

    fn setup() -> (Ctx, ArgEnv) {
        let client = Arc::new(MemoryChat::new());
        let channel = Channel::text("c1", "general", "g1");
        client.add_channel(channel.clone());
        let author = User::new("u1", "sender");
        let message = client.inbound(&author, &channel, "trigger");
        let ctx = Ctx::new(message, client);
        let env = ArgEnv::new(
            Arc::new(TypeRegistry::new()),
            Arc::new(PromptTracker::new()),
        );
        (ctx, env)
    }

    fn words(text: &str) -> Tokenized {
        tokenize(text, &TokenizerConfig::default())
    }

    async fn run_list(
        env: &ArgEnv,
        ctx: &Ctx,
        parsed: &Tokenized,
        specs: Vec<ArgSpec>,
    ) -> RunResult {
        let mut source = ListSource::new(specs);
        run(env, ctx, parsed, &mut source).await.unwrap()
    }

    #[tokio::test]
    async fn ordered_phrases_consume_disjoint_tokens() {
        let (ctx, env) = setup();
        let parsed = words("one two three");
        let specs = vec![ArgSpec::new("a"), ArgSpec::new("b"), ArgSpec::new("c")];

        match run_list(&env, &ctx, &parsed, specs).await {
            RunResult::Args(args) => {
                assert_eq!(args.str("a"), Some("one"));
                assert_eq!(args.str("b"), Some("two"));
                assert_eq!(args.str("c"), Some("three"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn explicit_index_does_not_advance_the_cursor() {
        let (ctx, env) = setup();
        let parsed = words("one two");
        let specs = vec![
            ArgSpec {
                index: Some(1),
                ..ArgSpec::new("second")
            },
            ArgSpec::new("first"),
        ];

        match run_list(&env, &ctx, &parsed, specs).await {
            RunResult::Args(args) => {
                assert_eq!(args.str("second"), Some("two"));
                assert_eq!(args.str("first"), Some("one"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unordered_probes_for_the_first_successful_cast() {
        let (ctx, env) = setup();
        let parsed = words("apple 7 pear");
        let specs = vec![
            ArgSpec {
                ty: "integer".into(),
                unordered: Unordered::All,
                ..ArgSpec::new("n")
            },
            ArgSpec::new("word"),
        ];

        match run_list(&env, &ctx, &parsed, specs).await {
            RunResult::Args(args) => {
                assert_eq!(args.int("n"), Some(7));
                // The shared cursor never moved.
                assert_eq!(args.str("word"), Some("apple"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rest_joins_remaining_phrases() {
        let (ctx, env) = setup();
        let parsed = words(r#"first "two words" three"#);
        let specs = vec![
            ArgSpec::new("head"),
            ArgSpec {
                match_kind: MatchKind::Rest,
                ..ArgSpec::new("tail")
            },
        ];

        match run_list(&env, &ctx, &parsed, specs).await {
            RunResult::Args(args) => {
                assert_eq!(args.str("head"), Some("first"));
                assert_eq!(args.str("tail"), Some(r#""two words" three"#));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn separate_casts_each_phrase_independently() {
        let (ctx, env) = setup();
        let parsed = words("1 x 3");
        let specs = vec![ArgSpec {
            match_kind: MatchKind::Separate,
            ty: "integer".into(),
            ..ArgSpec::new("nums")
        }];

        match run_list(&env, &ctx, &parsed, specs).await {
            RunResult::Args(args) => {
                assert_eq!(
                    args.get("nums"),
                    Some(&ArgValue::List(vec![
                        ArgValue::Int(1),
                        ArgValue::Null,
                        ArgValue::Int(3),
                    ]))
                );
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn flags_and_options_read_their_tokens() {
        let (ctx, env) = setup();
        let config = TokenizerConfig {
            flag_words: vec!["loud".into()],
            option_flag_words: vec!["times".into()],
            ..TokenizerConfig::default()
        };
        let parsed = tokenize("go --loud --times 3", &config);
        let specs = vec![
            ArgSpec::new("what"),
            ArgSpec {
                match_kind: MatchKind::Flag,
                flags: vec!["loud".into()],
                ..ArgSpec::new("loud")
            },
            ArgSpec {
                match_kind: MatchKind::Option,
                flags: vec!["times".into()],
                ty: "integer".into(),
                ..ArgSpec::new("times")
            },
        ];

        match run_list(&env, &ctx, &parsed, specs).await {
            RunResult::Args(args) => {
                assert_eq!(args.str("what"), Some("go"));
                assert!(args.flag("loud"));
                assert_eq!(args.int("times"), Some(3));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_flag_is_false_and_missing_option_fails_through() {
        let (ctx, env) = setup();
        let parsed = words("go");
        let specs = vec![
            ArgSpec {
                match_kind: MatchKind::Flag,
                flags: vec!["loud".into()],
                ..ArgSpec::new("loud")
            },
            ArgSpec {
                match_kind: MatchKind::Option,
                flags: vec!["times".into()],
                ty: "integer".into(),
                default: Some(crate::argument::DefaultSource::value(1)),
                ..ArgSpec::new("times")
            },
        ];

        match run_list(&env, &ctx, &parsed, specs).await {
            RunResult::Args(args) => {
                assert!(!args.flag("loud"));
                assert_eq!(args.int("times"), Some(1));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn continue_signal_carries_the_unconsumed_remainder() {
        let (ctx, env) = setup();
        let parsed = words("first second third");

        struct HandOff {
            asked: bool,
        }

        impl ArgumentSource for HandOff {
            fn next(&mut self, _previous: Option<ArgValue>) -> SourceStep {
                if self.asked {
                    SourceStep::Signal(Signal::continue_to("other"))
                } else {
                    self.asked = true;
                    SourceStep::Arg(ArgSpec::new("head"))
                }
            }
        }

        let mut source = HandOff { asked: false };
        match run(&env, &ctx, &parsed, &mut source).await.unwrap() {
            RunResult::Signal(Signal::Continue { command, rest, .. }) => {
                assert_eq!(command, "other");
                assert_eq!(rest.as_deref(), Some("second third"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dynamic_source_sees_previous_values() {
        let (ctx, env) = setup();
        let parsed = words("sum 2 3");

        // Ask for an operation first, then shape the rest off it.
        struct Calculator {
            stage: usize,
            op: Option<String>,
            total: i64,
        }

        impl ArgumentSource for Calculator {
            fn next(&mut self, previous: Option<ArgValue>) -> SourceStep {
                match self.stage {
                    0 => {
                        self.stage = 1;
                        SourceStep::Arg(ArgSpec {
                            ty: crate::types::TypeExpr::one_of(["sum", "max"]),
                            ..ArgSpec::new("op")
                        })
                    }
                    1 => {
                        self.op = previous.and_then(|v| v.as_str().map(String::from));
                        self.stage = 2;
                        SourceStep::Arg(ArgSpec {
                            ty: "integer".into(),
                            ..ArgSpec::new("lhs")
                        })
                    }
                    2 => {
                        self.total += previous.and_then(|v| v.as_int()).unwrap_or(0);
                        self.stage = 3;
                        SourceStep::Arg(ArgSpec {
                            ty: "integer".into(),
                            ..ArgSpec::new("rhs")
                        })
                    }
                    _ => {
                        self.total += previous.and_then(|v| v.as_int()).unwrap_or(0);
                        let mut args = Args::new();
                        args.insert("op", ArgValue::str(self.op.take().unwrap_or_default()));
                        args.insert("total", ArgValue::Int(self.total));
                        SourceStep::Done(args)
                    }
                }
            }
        }

        let mut source = Calculator {
            stage: 0,
            op: None,
            total: 0,
        };
        match run(&env, &ctx, &parsed, &mut source).await.unwrap() {
            RunResult::Args(args) => {
                assert_eq!(args.str("op"), Some("sum"));
                assert_eq!(args.int("total"), Some(5));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failure_without_default_lands_in_the_result_map() {
        let (ctx, env) = setup();
        let parsed = words("abc");
        let specs = vec![ArgSpec {
            ty: "integer".into(),
            ..ArgSpec::new("n")
        }];

        match run_list(&env, &ctx, &parsed, specs).await {
            RunResult::Args(args) => {
                assert!(args.get("n").unwrap().is_failure());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
