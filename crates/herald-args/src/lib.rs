pub mod argument;
pub mod combinator;
pub mod probe;
pub mod prompt;
pub mod runner;
pub mod signal;
pub mod source;
pub mod types;
pub mod value;

pub use argument::{ArgEnv, ArgSpec, DefaultSource, MatchKind, Unordered};
pub use probe::DispatchProbe;
pub use prompt::{
    ArgumentDefaults, FailureData, PromptData, PromptOptions, PromptTracker, TextModifier,
    TextSource,
};
pub use runner::{run, RunResult, RunnerState};
pub use signal::{Outcome, Signal};
pub use source::{extract_flag_words, ArgumentSource, ListSource, Schema, SourceStep};
pub use types::{caster, cast_expr, CastContext, TypeCaster, TypeExpr, TypeRegistry};
pub use value::{ArgValue, Args};
