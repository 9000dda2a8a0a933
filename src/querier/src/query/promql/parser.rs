//! PromQL selector translation
//!
//! Wraps the promql-parser crate and turns a vector selector such as
//! `cpu{host=~"a|b"}` into store [`Matcher`]s.

use common::model::{METRIC_NAME_LABEL, Matcher};
use promql_parser::label::{MatchOp, Matcher as PromMatcher};
use promql_parser::parser::{self, Expr, VectorSelector};

use super::error::PromQLError;

/// Label Prometheus uses for the metric name
pub const PROMETHEUS_NAME_LABEL: &str = "__name__";

/// Prefix promql-parser puts on a regex matcher that does not compile
const ILLEGAL_REGEX_PREFIX: &str = "illegal regex for ";

/// Parse a PromQL query string into an AST expression
pub fn parse(query: &str) -> Result<Expr, PromQLError> {
    parser::parse(query).map_err(PromQLError::ParseError)
}

/// Translate a selector expression into matchers, in the parser's order.
///
/// A metric name written outside the braces becomes an equality matcher on
/// the `name` label and comes first. An empty selector, blank or braces
/// holding only whitespace, yields no matchers.
///
/// # Examples
/// ```ignore
/// let matchers = parse_matchers(r#"cpu{host="a"}"#)?;
/// assert_eq!(matchers.len(), 2);
/// ```
pub fn parse_matchers(selector: &str) -> Result<Vec<Matcher>, PromQLError> {
    if is_empty_selector(selector) {
        return Ok(Vec::new());
    }

    let expr = parse(selector).map_err(|err| match err {
        PromQLError::ParseError(msg) => invalid_regex(selector, msg),
        other => other,
    })?;
    match unwrap_parens(&expr) {
        Expr::VectorSelector(vs) => selector_matchers(vs),
        other => Err(PromQLError::UnsupportedExpression(
            expression_kind(other).to_string(),
        )),
    }
}

fn is_empty_selector(selector: &str) -> bool {
    let selector = selector.trim();
    selector.is_empty()
        || selector
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .is_some_and(|inner| inner.trim().is_empty())
}

/// Turn promql-parser's regex compile failure back into `InvalidRegex`.
fn invalid_regex(selector: &str, msg: String) -> PromQLError {
    let Some(pattern) = msg.strip_prefix(ILLEGAL_REGEX_PREFIX) else {
        return PromQLError::ParseError(msg);
    };
    let label = regex_matcher_label(selector, pattern);

    match Matcher::regex(&label, pattern) {
        Err(err) => err.into(),
        Ok(_) => PromQLError::InvalidRegex {
            label,
            pattern: pattern.to_string(),
            reason: msg,
        },
    }
}

/// Label of the `=~`/`!~` matcher whose literal starts with `pattern`,
/// else of the first regex matcher in the text.
fn regex_matcher_label(selector: &str, pattern: &str) -> String {
    let mut candidates: Vec<(usize, &str, bool)> = ["=~", "!~"]
        .into_iter()
        .flat_map(|op| selector.match_indices(op))
        .map(|(at, op)| {
            let head = selector[..at].trim_end();
            let start = head
                .char_indices()
                .rev()
                .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
                .map_or(0, |(i, c)| i + c.len_utf8());
            let literal = selector[at + op.len()..].trim_start();
            let hit = literal
                .get(1..)
                .is_some_and(|value| value.starts_with(pattern));
            (at, &head[start..], hit)
        })
        .collect();
    candidates.sort_by_key(|(at, _, _)| *at);

    candidates
        .iter()
        .find(|(_, _, hit)| *hit)
        .or_else(|| candidates.first())
        .map(|(_, label, _)| {
            if *label == PROMETHEUS_NAME_LABEL {
                METRIC_NAME_LABEL.to_string()
            } else {
                label.to_string()
            }
        })
        .unwrap_or_default()
}

fn unwrap_parens(mut expr: &Expr) -> &Expr {
    while let Expr::Paren(paren) = expr {
        expr = &paren.expr;
    }
    expr
}

fn selector_matchers(vs: &VectorSelector) -> Result<Vec<Matcher>, PromQLError> {
    if vs.offset.is_some() || vs.at.is_some() {
        return Err(PromQLError::UnsupportedExpression(
            "selector modifiers (offset, @)".to_string(),
        ));
    }
    if !vs.matchers.or_matchers.is_empty() {
        return Err(PromQLError::UnsupportedMatcher(
            "'or' between matcher groups".to_string(),
        ));
    }

    let mut matchers = Vec::with_capacity(vs.matchers.matchers.len() + 1);

    let has_name_matcher = vs
        .matchers
        .matchers
        .iter()
        .any(|m| m.name == PROMETHEUS_NAME_LABEL);
    if let Some(name) = vs.name.as_deref() {
        if !has_name_matcher {
            matchers.push(Matcher::equal(METRIC_NAME_LABEL, name));
        }
    }

    for matcher in &vs.matchers.matchers {
        matchers.push(convert_matcher(matcher)?);
    }

    Ok(matchers)
}

fn convert_matcher(matcher: &PromMatcher) -> Result<Matcher, PromQLError> {
    let name = if matcher.name == PROMETHEUS_NAME_LABEL {
        METRIC_NAME_LABEL
    } else {
        matcher.name.as_str()
    };
    let value = matcher.value.as_str();

    #[allow(unreachable_patterns)]
    let converted = match &matcher.op {
        MatchOp::Equal => Matcher::equal(name, value),
        MatchOp::NotEqual => Matcher::not_equal(name, value),
        MatchOp::Re(_) => Matcher::regex(name, value)?,
        MatchOp::NotRe(_) => Matcher::not_regex(name, value)?,
        other => {
            return Err(PromQLError::UnsupportedMatcher(format!(
                "{name} {other:?} {value:?}"
            )));
        }
    };

    Ok(converted)
}

fn expression_kind(expr: &Expr) -> &'static str {
    match expr {
        Expr::Aggregate(_) => "aggregation",
        Expr::Unary(_) => "unary expression",
        Expr::Binary(_) => "binary expression",
        Expr::Paren(_) => "parenthesised expression",
        Expr::Subquery(_) => "subquery",
        Expr::NumberLiteral(_) => "number literal",
        Expr::StringLiteral(_) => "string literal",
        Expr::VectorSelector(_) => "vector selector",
        Expr::MatrixSelector(_) => "range selector",
        Expr::Call(_) => "function call",
        Expr::Extension(_) => "extension",
        #[allow(unreachable_patterns)]
        _ => "expression",
    }
}
