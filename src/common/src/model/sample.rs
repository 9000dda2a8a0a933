use serde::{Deserialize, Serialize};

use super::labels::Labels;

/// One decoded measurement, ready to be appended to a store.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: Labels,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub value: f64,
}

impl Sample {
    pub fn new(labels: Labels, timestamp: i64, value: f64) -> Self {
        Self {
            labels,
            timestamp,
            value,
        }
    }
}

/// A `(timestamp, value)` pair as returned to query clients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub t: i64,
    pub v: f64,
}

impl From<(i64, f64)> for Point {
    fn from((t, v): (i64, f64)) -> Self {
        Self { t, v }
    }
}

/// A series with its points, materialized for a query response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub labels: Labels,
    pub points: Vec<Point>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_wire_format() {
        let series = Series {
            labels: Labels::from_tags("cpu", [("host", "a")]).unwrap(),
            points: vec![Point::from((1_000, 1.5))],
        };

        let json = serde_json::to_value(&series).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "labels": [
                    {"name": "host", "value": "a"},
                    {"name": "name", "value": "cpu"}
                ],
                "points": [{"t": 1000, "v": 1.5}]
            })
        );
    }
}
