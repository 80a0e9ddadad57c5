//! The dynamic value domain produced by argument casts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use herald_core::{Channel, Emoji, Guild, Role, User};

/// A resolved argument value.
///
/// `Failure` records a failed cast *as a value*: the argument runner folds a
/// `Signal::Fail` into it so result maps and `separate` lists can carry the
/// failure payload to the command body.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Null,
    Bool(bool),
    Int(i64),
    BigInt(i128),
    Num(f64),
    Str(String),
    List(Vec<ArgValue>),
    Date(DateTime<Utc>),
    Url(url::Url),
    Color(u32),
    /// Result of a pattern cast: the matched text, capture groups, and
    /// every occurrence in the phrase.
    Match {
        text: String,
        groups: Vec<Option<String>>,
        all: Vec<String>,
    },
    WithInput {
        input: String,
        value: Box<ArgValue>,
    },
    Tagged {
        tag: String,
        value: Box<ArgValue>,
    },
    User(User),
    Channel(Channel),
    Role(Role),
    Emoji(Emoji),
    Guild(Guild),
    CommandRef(String),
    Failure(Option<Box<ArgValue>>),
}

impl ArgValue {
    pub fn str(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Null | Self::Failure(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Self::Num(n) => Some(*n),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ArgValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_user(&self) -> Option<&User> {
        match self {
            Self::User(u) => Some(u),
            _ => None,
        }
    }

    /// The quantity a range check compares: the numeric value for numbers,
    /// the length for strings and lists.
    pub fn magnitude(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::BigInt(n) => Some(*n as f64),
            Self::Num(n) => Some(*n),
            Self::Str(s) => Some(s.chars().count() as f64),
            Self::List(items) => Some(items.len() as f64),
            _ => None,
        }
    }

    /// Stringify a value for the next stage of a cast pipeline.
    pub(crate) fn as_phrase(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Int(n) => n.to_string(),
            Self::BigInt(n) => n.to_string(),
            Self::Num(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Url(u) => u.to_string(),
            Self::Color(c) => format!("{c:x}"),
            _ => String::new(),
        }
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// The resolved-arguments map handed to a command body, keyed by argument
/// id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    values: HashMap<String, ArgValue>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, value: ArgValue) {
        self.values.insert(id.into(), value);
    }

    pub fn get(&self, id: &str) -> Option<&ArgValue> {
        self.values.get(id)
    }

    pub fn str(&self, id: &str) -> Option<&str> {
        self.get(id).and_then(ArgValue::as_str)
    }

    pub fn int(&self, id: &str) -> Option<i64> {
        self.get(id).and_then(ArgValue::as_int)
    }

    pub fn num(&self, id: &str) -> Option<f64> {
        self.get(id).and_then(ArgValue::as_num)
    }

    pub fn flag(&self, id: &str) -> bool {
        self.get(id).and_then(ArgValue::as_bool).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, ArgValue)> for Args {
    fn from_iter<T: IntoIterator<Item = (String, ArgValue)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
