//! Label matchers used to select series from a store.

use regex::Regex;

use super::labels::Labels;

#[derive(Debug, thiserror::Error)]
pub enum MatcherError {
    #[error("invalid regex {pattern:?} for label {name}: {source}")]
    InvalidRegex {
        name: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Label matcher operators, with Prometheus semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    /// Exact string match (=)
    Equal,
    /// Not equal (!=)
    NotEqual,
    /// Regex match (=~)
    RegexMatch,
    /// Regex not match (!~)
    RegexNotMatch,
}

impl std::fmt::Display for MatchOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Equal => write!(f, "="),
            Self::NotEqual => write!(f, "!="),
            Self::RegexMatch => write!(f, "=~"),
            Self::RegexNotMatch => write!(f, "!~"),
        }
    }
}

#[derive(Debug, Clone)]
enum Predicate {
    Equal(String),
    NotEqual(String),
    Regex { pattern: String, re: Regex },
    NotRegex { pattern: String, re: Regex },
}

/// A predicate over the value of one label.
///
/// An absent label is matched as if its value were the empty string, so
/// `host=""` selects series without a `host` label and `host!="a"` also
/// selects them.
#[derive(Debug, Clone)]
pub struct Matcher {
    name: String,
    predicate: Predicate,
}

impl Matcher {
    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            predicate: Predicate::Equal(value.into()),
        }
    }

    pub fn not_equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            predicate: Predicate::NotEqual(value.into()),
        }
    }

    /// Regex matcher. The pattern is anchored at both ends.
    pub fn regex(name: impl Into<String>, pattern: impl Into<String>) -> Result<Self, MatcherError> {
        let name = name.into();
        let pattern = pattern.into();
        let re = compile_anchored(&name, &pattern)?;
        Ok(Self {
            name,
            predicate: Predicate::Regex { pattern, re },
        })
    }

    pub fn not_regex(
        name: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Result<Self, MatcherError> {
        let name = name.into();
        let pattern = pattern.into();
        let re = compile_anchored(&name, &pattern)?;
        Ok(Self {
            name,
            predicate: Predicate::NotRegex { pattern, re },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op(&self) -> MatchOp {
        match &self.predicate {
            Predicate::Equal(_) => MatchOp::Equal,
            Predicate::NotEqual(_) => MatchOp::NotEqual,
            Predicate::Regex { .. } => MatchOp::RegexMatch,
            Predicate::NotRegex { .. } => MatchOp::RegexNotMatch,
        }
    }

    /// The literal value or the regex pattern as written by the caller.
    pub fn value(&self) -> &str {
        match &self.predicate {
            Predicate::Equal(v) | Predicate::NotEqual(v) => v,
            Predicate::Regex { pattern, .. } | Predicate::NotRegex { pattern, .. } => pattern,
        }
    }

    pub fn matches_value(&self, value: &str) -> bool {
        match &self.predicate {
            Predicate::Equal(v) => v == value,
            Predicate::NotEqual(v) => v != value,
            Predicate::Regex { re, .. } => re.is_match(value),
            Predicate::NotRegex { re, .. } => !re.is_match(value),
        }
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        self.matches_value(labels.get(&self.name).unwrap_or(""))
    }
}

impl std::fmt::Display for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{:?}", self.name, self.op(), self.value())
    }
}

/// True if `labels` satisfies every matcher.
pub fn matches_all(matchers: &[Matcher], labels: &Labels) -> bool {
    matchers.iter().all(|m| m.matches(labels))
}

fn compile_anchored(name: &str, pattern: &str) -> Result<Regex, MatcherError> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|source| MatcherError::InvalidRegex {
        name: name.to_string(),
        pattern: pattern.to_string(),
        source,
    })
}
