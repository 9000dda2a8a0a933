//! PromQL selector support
//!
//! Only plain vector selectors are understood:
//!
//! ```text
//! selector string → promql-parser → VectorSelector → [Matcher] → Storage::select
//! ```
//!
//! # Supported Features
//!
//! - Instant vector selectors: `metric_name{label="value"}`, `{label="value"}`
//! - Label matchers: `=`, `!=`, `=~`, `!~`
//! - `__name__` as an alias of the `name` label
//!
//! Functions, aggregations, range selectors, binary operators and selector
//! modifiers are rejected.

pub mod error;
pub mod parser;

pub use error::PromQLError;
pub use parser::parse_matchers;
