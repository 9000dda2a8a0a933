//! PromQL-specific error types

use std::fmt;

/// Errors that can occur while turning a selector into matchers
#[derive(Debug, Clone, PartialEq)]
pub enum PromQLError {
    /// Error parsing the PromQL query syntax
    ParseError(String),
    /// A regex matcher whose pattern does not compile
    InvalidRegex {
        label: String,
        pattern: String,
        reason: String,
    },
    /// Matcher operator or matcher combination outside `=`, `!=`, `=~`, `!~`
    UnsupportedMatcher(String),
    /// Anything other than a plain vector selector
    UnsupportedExpression(String),
}

impl std::error::Error for PromQLError {}

impl fmt::Display for PromQLError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParseError(msg) => write!(f, "PromQL parse error: {msg}"),
            Self::InvalidRegex {
                label,
                pattern,
                reason,
            } => write!(f, "Invalid regex {pattern:?} for label '{label}': {reason}"),
            Self::UnsupportedMatcher(msg) => write!(f, "Unsupported label matcher: {msg}"),
            Self::UnsupportedExpression(kind) => {
                write!(f, "Unsupported PromQL expression: {kind}")
            }
        }
    }
}

impl From<common::model::MatcherError> for PromQLError {
    fn from(err: common::model::MatcherError) -> Self {
        match err {
            common::model::MatcherError::InvalidRegex {
                name,
                pattern,
                source,
            } => Self::InvalidRegex {
                label: name,
                pattern,
                reason: source.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::model::Matcher;

    #[test]
    fn test_display() {
        let err = PromQLError::UnsupportedExpression("function call".to_string());
        assert_eq!(
            err.to_string(),
            "Unsupported PromQL expression: function call"
        );

        let err = PromQLError::UnsupportedMatcher("'or' between matcher groups".to_string());
        assert_eq!(
            err.to_string(),
            "Unsupported label matcher: 'or' between matcher groups"
        );
    }

    #[test]
    fn test_from_matcher_error() {
        let err: PromQLError = Matcher::regex("host", "(").unwrap_err().into();
        match err {
            PromQLError::InvalidRegex { label, pattern, .. } => {
                assert_eq!(label, "host");
                assert_eq!(pattern, "(");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
