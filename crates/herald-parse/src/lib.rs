//! Command content tokenizer.
//!
//! Splits the text after a command alias into phrases, flags (`--word`),
//! and option-flags (`--word value`), honoring double-quoted spans and an
//! optional phrase separator. Tokenizing is pure and never fails: malformed
//! quoting degrades to literal text.
//!
//! Every token's `raw` span absorbs the separator run next to it, so
//! concatenating all raws reproduces the input exactly.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenizerConfig {
    /// Bare flag words; written `--word` in message text, matched
    /// case-insensitively.
    pub flag_words: Vec<String>,
    /// Bare option-flag words; written `--word value` in message text.
    pub option_flag_words: Vec<String>,
    /// Honor double-quoted phrase spans. Ignored when a separator is set.
    pub quoted: bool,
    /// Literal phrase separator. `None` separates on whitespace runs.
    pub separator: Option<String>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            flag_words: Vec::new(),
            option_flag_words: Vec::new(),
            quoted: true,
            separator: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    Phrase,
    Flag,
    OptionFlag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    /// The original span, including the adjacent separator run.
    pub raw: String,
    /// Flag word for flag and option-flag tokens.
    pub key: Option<String>,
    /// Phrase content (quotes stripped) or option-flag value.
    pub value: Option<String>,
}

impl Token {
    fn phrase(value: String, raw: String) -> Self {
        Self {
            kind: TokenKind::Phrase,
            raw,
            key: None,
            value: Some(value),
        }
    }

    fn flag(key: String, raw: String) -> Self {
        Self {
            kind: TokenKind::Flag,
            raw,
            key: Some(key),
            value: None,
        }
    }

    fn option_flag(key: String, value: String, raw: String) -> Self {
        Self {
            kind: TokenKind::OptionFlag,
            raw,
            key: Some(key),
            value: Some(value),
        }
    }

    pub fn value_str(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

/// One tokenizing result: the ordered token vector plus index views over
/// each token kind. Owned by a single dispatch attempt.
#[derive(Debug, Clone, Default)]
pub struct Tokenized {
    tokens: Vec<Token>,
    phrases: Vec<usize>,
    flags: Vec<usize>,
    option_flags: Vec<usize>,
}

impl Tokenized {
    pub fn all(&self) -> &[Token] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn phrase_count(&self) -> usize {
        self.phrases.len()
    }

    pub fn phrase(&self, index: usize) -> Option<&Token> {
        self.phrases.get(index).map(|&i| &self.tokens[i])
    }

    pub fn phrases(&self) -> impl Iterator<Item = &Token> {
        self.phrases.iter().map(move |&i| &self.tokens[i])
    }

    pub fn flags(&self) -> impl Iterator<Item = &Token> {
        self.flags.iter().map(move |&i| &self.tokens[i])
    }

    pub fn option_flags(&self) -> impl Iterator<Item = &Token> {
        self.option_flags.iter().map(move |&i| &self.tokens[i])
    }

    /// Join raw spans of phrases `[start, start + limit)`.
    pub fn join_phrase_raws(&self, start: usize, limit: usize) -> String {
        self.phrases
            .iter()
            .skip(start)
            .take(limit)
            .map(|&i| self.tokens[i].raw.as_str())
            .collect()
    }

    /// Join raw spans of all tokens `[start, start + limit)`.
    pub fn join_all_raws(&self, start: usize, limit: usize) -> String {
        self.tokens
            .iter()
            .skip(start)
            .take(limit)
            .map(|t| t.raw.as_str())
            .collect()
    }
}

pub fn tokenize(text: &str, config: &TokenizerConfig) -> Tokenized {
    let mut scanner = Scanner::new(text, config);
    let mut tokens: Vec<Token> = Vec::new();

    let leading = scanner.take_separator_run();
    while !scanner.at_end() {
        let mut token = scanner.next_token();
        token.raw.push_str(scanner.take_separator_run());
        tokens.push(token);
    }
    if let Some(first) = tokens.first_mut() {
        first.raw.insert_str(0, leading);
    }

    let mut result = Tokenized {
        tokens,
        ..Tokenized::default()
    };
    for (i, token) in result.tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Phrase => result.phrases.push(i),
            TokenKind::Flag => result.flags.push(i),
            TokenKind::OptionFlag => result.option_flags.push(i),
        }
    }
    result
}

struct Scanner<'a> {
    text: &'a str,
    pos: usize,
    quoted: bool,
    separator: Option<&'a str>,
    /// Prebuilt `--word` spellings, longest first so overlapping words
    /// resolve to the longest match.
    flag_words: Vec<String>,
    option_flag_words: Vec<String>,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str, config: &'a TokenizerConfig) -> Self {
        let spell = |words: &[String]| {
            let mut spelled: Vec<String> = words.iter().map(|w| format!("--{w}")).collect();
            spelled.sort_by(|a, b| b.len().cmp(&a.len()));
            spelled
        };
        Self {
            text,
            pos: 0,
            quoted: config.quoted && config.separator.is_none(),
            separator: config.separator.as_deref(),
            flag_words: spell(&config.flag_words),
            option_flag_words: spell(&config.option_flag_words),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    /// Consume whitespace (or repeated separators) and return the consumed
    /// span.
    fn take_separator_run(&mut self) -> &'a str {
        let start = self.pos;
        match self.separator {
            None => {
                let trimmed = self.rest().trim_start();
                self.pos = self.text.len() - trimmed.len();
            }
            Some(sep) if !sep.is_empty() => {
                while self.rest().starts_with(sep) {
                    self.pos += sep.len();
                }
            }
            Some(_) => {}
        }
        &self.text[start..self.pos]
    }

    /// Length of the matching `--word` spelling at the cursor, if any.
    fn match_spelled(&self, spelled: &[String]) -> Option<usize> {
        let rest = self.rest();
        spelled
            .iter()
            .find(|w| {
                rest.get(..w.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(w))
            })
            .map(|w| w.len())
    }

    fn at_any_flag(&self) -> bool {
        self.match_spelled(&self.option_flag_words).is_some()
            || self.match_spelled(&self.flag_words).is_some()
    }

    fn next_token(&mut self) -> Token {
        if let Some(len) = self.match_spelled(&self.option_flag_words) {
            let word = &self.text[self.pos..self.pos + len];
            let key = word[2..].to_string();
            self.pos += len;

            let before_gap = self.pos;
            let gap = self.take_separator_run();
            if !self.at_end() && !self.at_any_flag() {
                let (value, raw_value) = self.take_span();
                let raw = format!("{word}{gap}{raw_value}");
                return Token::option_flag(key, value, raw);
            }
            // No value follows; leave the gap to trail the bare token.
            self.pos = before_gap;
            return Token::option_flag(key, String::new(), word.to_string());
        }

        if let Some(len) = self.match_spelled(&self.flag_words) {
            let word = &self.text[self.pos..self.pos + len];
            let key = word[2..].to_string();
            self.pos += len;
            return Token::flag(key, word.to_string());
        }

        let (value, raw) = self.take_span();
        Token::phrase(value, raw)
    }

    /// Consume one phrase/value span: a quoted span (quotes stripped in the
    /// value) or a run up to the next separator. An unclosed quote runs to
    /// the end of input.
    fn take_span(&mut self) -> (String, String) {
        if self.quoted && self.rest().starts_with('"') {
            let start = self.pos;
            match self.text[self.pos + 1..].find('"') {
                Some(offset) => {
                    let close = self.pos + 1 + offset;
                    let value = self.text[self.pos + 1..close].to_string();
                    self.pos = close + 1;
                    (value, self.text[start..self.pos].to_string())
                }
                None => {
                    let value = self.text[self.pos + 1..].to_string();
                    self.pos = self.text.len();
                    (value, self.text[start..].to_string())
                }
            }
        } else {
            let start = self.pos;
            let rest = self.rest();
            let len = match self.separator {
                None => rest.find(char::is_whitespace).unwrap_or(rest.len()),
                Some(sep) if !sep.is_empty() => rest.find(sep).unwrap_or(rest.len()),
                Some(_) => rest.len(),
            };
            self.pos += len;
            let raw = &self.text[start..self.pos];
            let value = if self.separator.is_some() {
                raw.trim().to_string()
            } else {
                raw.to_string()
            };
            (value, raw.to_string())
        }
    }
}
