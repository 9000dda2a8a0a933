//! Turns a line-protocol body into samples.

use common::config::{NonNumericPolicy, Precision};
use common::model::{LabelError, Labels, Sample};

use crate::line_protocol::{self, LineProtocolError, ParsedLine};

/// Per-request decoding parameters
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// Unit of the timestamps in the body
    pub precision: Precision,
    pub non_numeric: NonNumericPolicy,
    /// Timestamp in milliseconds given to records without one
    pub now_millis: i64,
}

impl DecodeOptions {
    pub fn new(precision: Precision, non_numeric: NonNumericPolicy) -> Self {
        Self {
            precision,
            non_numeric,
            now_millis: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("request body is not valid UTF-8")]
    InvalidUtf8,
    #[error("malformed record: {0}")]
    Malformed(#[from] LineProtocolError),
    #[error("line {line}: {source}")]
    Labels { line: usize, source: LabelError },
    #[error("line {line}: record for '{measurement}' has no numeric field")]
    NoNumericField { line: usize, measurement: String },
    #[error("line {line}: timestamp {timestamp} is out of range for precision {precision}")]
    TimestampOutOfRange {
        line: usize,
        timestamp: i64,
        precision: Precision,
    },
}

/// Decode every record of `body` into one sample each, in input order.
///
/// Fails on the first record that cannot be decoded; nothing is returned
/// for the records before it.
pub fn decode_samples(body: &[u8], options: &DecodeOptions) -> Result<Vec<Sample>, DecodeError> {
    let text = std::str::from_utf8(body).map_err(|_| DecodeError::InvalidUtf8)?;

    line_protocol::parse_lines(text)?
        .into_iter()
        .map(|record| decode_record(record, options))
        .collect()
}

fn decode_record(record: ParsedLine, options: &DecodeOptions) -> Result<Sample, DecodeError> {
    let line = record.line;

    let labels = Labels::from_tags(&record.measurement, record.tags)
        .map_err(|source| DecodeError::Labels { line, source })?;

    let value = match sample_value(&record.fields) {
        Some(value) => value,
        None => match options.non_numeric {
            NonNumericPolicy::Zero => {
                tracing::warn!(
                    line,
                    measurement = %record.measurement,
                    "Record has no numeric field, storing 0"
                );
                0.0
            }
            NonNumericPolicy::Reject => {
                return Err(DecodeError::NoNumericField {
                    line,
                    measurement: record.measurement,
                });
            }
        },
    };

    let timestamp = match record.timestamp {
        Some(raw) => options.precision.to_millis(raw).ok_or(
            DecodeError::TimestampOutOfRange {
                line,
                timestamp: raw,
                precision: options.precision,
            },
        )?,
        None => options.now_millis,
    };

    Ok(Sample::new(labels, timestamp, value))
}

/// Last integer or float field wins.
fn sample_value(fields: &[(String, line_protocol::FieldValue)]) -> Option<f64> {
    fields.iter().rev().find_map(|(_, value)| value.as_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::model::Label;

    fn options() -> DecodeOptions {
        DecodeOptions {
            precision: Precision::Milliseconds,
            non_numeric: NonNumericPolicy::Zero,
            now_millis: 42,
        }
    }

    #[test]
    fn test_decode_single_record() {
        let samples = decode_samples(b"cpu,host=a value=1.5 1000", &options()).unwrap();

        assert_eq!(samples.len(), 1);
        let sample = &samples[0];
        assert_eq!(
            sample.labels.as_slice(),
            &[Label::new("host", "a"), Label::new("name", "cpu")]
        );
        assert_eq!(sample.timestamp, 1000);
        assert_eq!(sample.value, 1.5);
    }

    #[test]
    fn test_records_keep_input_order() {
        let body = b"b v=2 2\na v=1 1\nc v=3 3\n";
        let samples = decode_samples(body, &options()).unwrap();
        let names: Vec<_> = samples
            .iter()
            .map(|s| s.labels.metric_name().unwrap_or_default().to_string())
            .collect();
        assert_eq!(names, ["b", "a", "c"]);
    }

    #[test]
    fn test_last_numeric_field_wins() {
        let body = br#"m a=1,b=2i,s="x",ok=true 1"#;
        let samples = decode_samples(body, &options()).unwrap();
        assert_eq!(samples[0].value, 2.0);

        let body = b"m a=7u,b=t 1";
        let samples = decode_samples(body, &options()).unwrap();
        assert_eq!(samples[0].value, 7.0);
    }

    #[test]
    fn test_no_numeric_field_policy() {
        let body = br#"m s="x",ok=true 1"#;

        let samples = decode_samples(body, &options()).unwrap();
        assert_eq!(samples[0].value, 0.0);

        let reject = DecodeOptions {
            non_numeric: NonNumericPolicy::Reject,
            ..options()
        };
        assert_eq!(
            decode_samples(body, &reject).unwrap_err(),
            DecodeError::NoNumericField {
                line: 1,
                measurement: "m".to_string()
            }
        );
    }

    #[test]
    fn test_timestamp_precision() {
        let opts = |precision| DecodeOptions {
            precision,
            ..options()
        };

        let body = b"m v=1 1700000000123456789";
        let samples = decode_samples(body, &opts(Precision::Nanoseconds)).unwrap();
        assert_eq!(samples[0].timestamp, 1700000000123);

        let body = b"m v=1 1700000000";
        let samples = decode_samples(body, &opts(Precision::Seconds)).unwrap();
        assert_eq!(samples[0].timestamp, 1700000000000);

        let body = b"m v=1 1700000000123";
        let samples = decode_samples(body, &opts(Precision::Milliseconds)).unwrap();
        assert_eq!(samples[0].timestamp, 1700000000123);
    }

    #[test]
    fn test_timestamp_overflow() {
        let opts = DecodeOptions {
            precision: Precision::Seconds,
            ..options()
        };
        let err = decode_samples(b"m v=1 9223372036854775807", &opts).unwrap_err();
        assert!(matches!(err, DecodeError::TimestampOutOfRange { line: 1, .. }));
    }

    #[test]
    fn test_missing_timestamp_uses_arrival_time() {
        let samples = decode_samples(b"m v=1", &options()).unwrap();
        assert_eq!(samples[0].timestamp, 42);
    }

    #[test]
    fn test_duplicate_tag_fails_whole_body() {
        let body = b"ok v=1 1\ncpu,host=a,host=b v=1 2\n";
        let err = decode_samples(body, &options()).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Labels {
                line: 2,
                source: LabelError::Duplicate { .. }
            }
        ));
    }

    #[test]
    fn test_reserved_label_collision() {
        let err = decode_samples(b"cpu,name=x v=1 1", &options()).unwrap_err();
        assert!(matches!(err, DecodeError::Labels { line: 1, .. }));
    }

    #[test]
    fn test_malformed_body() {
        assert!(matches!(
            decode_samples(b"cpu v=1 1\nnot a record", &options()),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode_samples(b"cpu v=1 1\ncpu v=1e999 2", &options()),
            Err(DecodeError::Malformed(ref e)) if e.line() == 2
        ));
        assert_eq!(
            decode_samples(&[0xff, 0xfe], &options()),
            Err(DecodeError::InvalidUtf8)
        );
    }

    #[test]
    fn test_empty_body_has_no_samples() {
        assert!(decode_samples(b"", &options()).unwrap().is_empty());
    }
}
