pub mod labels;
pub mod matcher;
pub mod sample;

pub use labels::{Label, LabelError, Labels, METRIC_NAME_LABEL};
pub use matcher::{MatchOp, Matcher, MatcherError};
pub use sample::{Point, Sample, Series};
