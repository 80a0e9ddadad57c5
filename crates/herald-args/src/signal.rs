//! Short-circuit control signals.
//!
//! A `Signal` may surface at any point of casting or argument running and
//! aborts normal sequencing the moment it appears. Consumption sites match
//! exhaustively; there is no "is this actually a signal" ambiguity.

use herald_core::Message;

use crate::value::ArgValue;

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// Stop the command silently.
    Cancel,
    /// Re-enter the dispatch pipeline with the carried message.
    Retry(Message),
    /// Hand off to another command with the unconsumed remainder text.
    Continue {
        command: String,
        ignore_checks: bool,
        rest: Option<String>,
    },
    /// A cast failure carrying an optional payload.
    Fail(Option<ArgValue>),
}

impl Signal {
    pub fn continue_to(command: impl Into<String>) -> Self {
        Self::Continue {
            command: command.into(),
            ignore_checks: false,
            rest: None,
        }
    }

    pub fn fail() -> Self {
        Self::Fail(None)
    }

    pub fn fail_with(payload: ArgValue) -> Self {
        Self::Fail(Some(payload))
    }

    /// Whether this signal terminates an argument run outright.
    /// `Fail` does not: it is recorded as a failed value instead.
    pub fn is_short_circuit(&self) -> bool {
        matches!(self, Self::Cancel | Self::Retry(_) | Self::Continue { .. })
    }
}

/// Result of a cast or of one argument's processing: a value (possibly
/// `Null`, meaning "no match") or a control signal.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Value(ArgValue),
    Signal(Signal),
}

impl Outcome {
    pub fn null() -> Self {
        Self::Value(ArgValue::Null)
    }

    pub fn value(value: impl Into<ArgValue>) -> Self {
        Self::Value(value.into())
    }

    /// A cast failure is a `Null` value or an explicit `Fail` signal.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::Value(ArgValue::Null) | Self::Signal(Signal::Fail(_))
        )
    }

    /// The payload a failure carries, if any.
    pub fn failure_payload(&self) -> Option<ArgValue> {
        match self {
            Self::Signal(Signal::Fail(payload)) => payload.clone(),
            _ => None,
        }
    }

    /// Fold into a plain value: failures become `ArgValue::Failure`.
    /// Short-circuit signals never reach this point.
    pub fn into_resolved(self) -> ArgValue {
        match self {
            Self::Value(value) => value,
            Self::Signal(Signal::Fail(payload)) => ArgValue::Failure(payload.map(Box::new)),
            Self::Signal(_) => ArgValue::Null,
        }
    }
}

impl From<ArgValue> for Outcome {
    fn from(value: ArgValue) -> Self {
        Self::Value(value)
    }
}

impl From<Signal> for Outcome {
    fn from(signal: Signal) -> Self {
        Self::Signal(signal)
    }
}
