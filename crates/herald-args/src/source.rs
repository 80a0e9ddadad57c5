//! Argument sources: where the runner gets the next argument spec from.
//!
//! A source is asked for one spec at a time and receives each resolved
//! value back before producing the next, so a dynamic schema can shape
//! later arguments from earlier results. A static list is just the trivial
//! source.

use std::sync::Arc;

use crate::argument::{ArgSpec, MatchKind};
use crate::signal::Signal;
use crate::value::{ArgValue, Args};

/// One step of an argument source.
#[derive(Debug, Clone)]
pub enum SourceStep {
    /// Resolve this argument next.
    Arg(ArgSpec),
    /// Short-circuit the run with a signal.
    Signal(Signal),
    /// All arguments resolved; here is the result map.
    Done(Args),
}

pub trait ArgumentSource: Send {
    /// Produce the next step. `previous` carries the value resolved for the
    /// previously produced spec (absent on the first call).
    fn next(&mut self, previous: Option<ArgValue>) -> SourceStep;
}

/// Walks a static spec list, accumulating the result map keyed by spec id.
pub struct ListSource {
    specs: Vec<ArgSpec>,
    position: usize,
    resolved: Args,
}

impl ListSource {
    pub fn new(specs: Vec<ArgSpec>) -> Self {
        Self {
            specs,
            position: 0,
            resolved: Args::new(),
        }
    }
}

impl ArgumentSource for ListSource {
    fn next(&mut self, previous: Option<ArgValue>) -> SourceStep {
        if self.position > 0 {
            if let Some(value) = previous {
                let id = self.specs[self.position - 1].id.clone();
                self.resolved.insert(id, value);
            }
        }
        match self.specs.get(self.position) {
            Some(spec) => {
                self.position += 1;
                SourceStep::Arg(spec.clone())
            }
            None => SourceStep::Done(std::mem::take(&mut self.resolved)),
        }
    }
}

/// A command's argument schema: a static list, or a factory producing a
/// fresh dynamic source per run.
#[derive(Clone)]
pub enum Schema {
    List(Vec<ArgSpec>),
    Dynamic(Arc<dyn Fn() -> Box<dyn ArgumentSource> + Send + Sync>),
}

impl Schema {
    pub fn list(specs: Vec<ArgSpec>) -> Self {
        Self::List(specs)
    }

    pub fn dynamic<F>(factory: F) -> Self
    where
        F: Fn() -> Box<dyn ArgumentSource> + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(factory))
    }

    pub fn source(&self) -> Box<dyn ArgumentSource> {
        match self {
            Self::List(specs) => Box::new(ListSource::new(specs.clone())),
            Self::Dynamic(factory) => factory(),
        }
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::List(specs) => write!(f, "Schema::List({} specs)", specs.len()),
            Self::Dynamic(_) => write!(f, "Schema::Dynamic(..)"),
        }
    }
}

/// Collect the flag and option-flag words declared by a static spec list,
/// for the tokenizer configuration.
pub fn extract_flag_words(specs: &[ArgSpec]) -> (Vec<String>, Vec<String>) {
    let mut flag_words = Vec::new();
    let mut option_flag_words = Vec::new();
    for spec in specs {
        match spec.match_kind {
            MatchKind::Flag => flag_words.extend(spec.flags.iter().cloned()),
            MatchKind::Option => option_flag_words.extend(spec.flags.iter().cloned()),
            _ => {}
        }
    }
    (flag_words, option_flag_words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_source_maps_values_to_spec_ids() {
        let mut source = ListSource::new(vec![ArgSpec::new("a"), ArgSpec::new("b")]);

        let step = source.next(None);
        assert!(matches!(step, SourceStep::Arg(ref spec) if spec.id == "a"));
        let step = source.next(Some(ArgValue::Int(1)));
        assert!(matches!(step, SourceStep::Arg(ref spec) if spec.id == "b"));
        let step = source.next(Some(ArgValue::Int(2)));
        match step {
            SourceStep::Done(args) => {
                assert_eq!(args.int("a"), Some(1));
                assert_eq!(args.int("b"), Some(2));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn flag_words_come_from_flag_and_option_specs() {
        let specs = vec![
            ArgSpec {
                match_kind: MatchKind::Flag,
                flags: vec!["loud".into()],
                ..ArgSpec::new("loud")
            },
            ArgSpec {
                match_kind: MatchKind::Option,
                flags: vec!["times".into()],
                ..ArgSpec::new("times")
            },
            ArgSpec::new("plain"),
        ];
        let (flags, options) = extract_flag_words(&specs);
        assert_eq!(flags, vec!["loud"]);
        assert_eq!(options, vec!["times"]);
    }
}
