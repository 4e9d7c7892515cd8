//! Compiled lexical patterns
//!
//! Every pattern list in the SOP rule set is compiled once at session start.
//! Matching runs against [`normalize_text`] output and is case-insensitive.

use regex::{Regex, RegexBuilder};

use sop_monitor_config::ConfigError;

/// Normalize utterance text before matching
///
/// Curly quotes become straight ones so that `I’m` and `I'm` match the same
/// patterns regardless of the transcriber's punctuation.
pub fn normalize_text(text: &str) -> String {
    text.trim()
        .chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{02BC}' | '`' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            other => other,
        })
        .collect()
}

fn compile(rule: &str, pattern: &str) -> Result<Regex, ConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| ConfigError::InvalidPattern {
            rule: rule.to_string(),
            message: e.to_string(),
        })
}

/// Set of alternatives; matches when any member matches
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Regex>,
}

impl PatternSet {
    /// Compile patterns for the named rule
    pub fn compile(rule: &str, patterns: &[String]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|p| compile(rule, p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Check if any pattern matches
    pub fn is_match(&self, text: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(text))
    }

    /// First match across the set, in pattern order
    pub fn find<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.patterns
            .iter()
            .find_map(|re| re.find(text))
            .map(|m| m.as_str())
    }
}

/// Prohibited phrase compiled for lexical matching
///
/// Whitespace runs in the phrase match any whitespace run, and word boundaries
/// are enforced at alphanumeric edges so `calm down` does not fire inside
/// `becalm downtown`.
#[derive(Debug, Clone)]
pub struct PhrasePattern {
    phrase: String,
    regex: Regex,
}

impl PhrasePattern {
    pub fn new(phrase: &str) -> Result<Self, ConfigError> {
        let normalized = normalize_text(phrase).to_lowercase();
        let body = normalized
            .split_whitespace()
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(r"\s+");

        let starts_word = normalized.chars().next().is_some_and(|c| c.is_alphanumeric());
        let ends_word = normalized.chars().last().is_some_and(|c| c.is_alphanumeric());

        let pattern = format!(
            "{}{}{}",
            if starts_word { r"\b" } else { "" },
            body,
            if ends_word { r"\b" } else { "" }
        );

        Ok(Self {
            phrase: phrase.trim().to_string(),
            regex: compile(&format!("prohibited phrase '{}'", phrase), &pattern)?,
        })
    }

    /// Phrase as configured
    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    /// Number of non-overlapping occurrences in normalized text
    pub fn occurrences(&self, text: &str) -> usize {
        self.regex.find_iter(text).count()
    }
}

/// Matches references to the known customer name
///
/// Any name token of two or more characters counts, so "Hello John" and
/// "Thanks, Mr. Smith" both reference "John Smith".
#[derive(Debug, Clone)]
pub struct NameMatcher {
    name: String,
    regex: Regex,
}

impl NameMatcher {
    pub fn new(name: &str) -> Option<Self> {
        let tokens: Vec<String> = name
            .split(|c: char| c.is_whitespace() || c == ',' || c == '.')
            .map(str::trim)
            .filter(|t| t.chars().count() >= 2)
            .map(regex::escape)
            .collect();

        if tokens.is_empty() {
            return None;
        }

        let pattern = format!(r"\b({})\b", tokens.join("|"));
        let regex = RegexBuilder::new(&pattern).case_insensitive(true).build().ok()?;

        Some(Self {
            name: name.trim().to_string(),
            regex,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}
