//! Label sets identifying a series.
//!
//! A [`Labels`] value is always sorted by label name and never holds two
//! labels with the same name, so it can be compared, hashed and ordered
//! directly as a series identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reserved label holding the measurement (metric) name.
pub const METRIC_NAME_LABEL: &str = "name";

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("duplicate label name: {name}")]
    Duplicate { name: String },
    #[error("label name must not be empty")]
    EmptyName,
}

/// A single `(name, value)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Canonical label set: sorted by name, names unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Labels(Vec<Label>);

impl Labels {
    /// Build the label set of a measurement from its tags.
    ///
    /// Adds the reserved [`METRIC_NAME_LABEL`] holding `measurement` and
    /// sorts the result. Fails if two tags share a name or a tag uses the
    /// reserved name.
    pub fn from_tags<K, V>(
        measurement: &str,
        tags: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Self, LabelError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let tags = tags.into_iter();
        let mut labels = Vec::with_capacity(tags.size_hint().0 + 1);
        for (name, value) in tags {
            labels.push(Label::new(name, value));
        }
        labels.push(Label::new(METRIC_NAME_LABEL, measurement));

        Self::try_from_vec(labels)
    }

    /// Sort `labels` by name and reject empty or repeated names.
    pub fn try_from_vec(mut labels: Vec<Label>) -> Result<Self, LabelError> {
        if labels.iter().any(|l| l.name.is_empty()) {
            return Err(LabelError::EmptyName);
        }

        labels.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(pair) = labels.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(LabelError::Duplicate {
                name: pair[0].name.clone(),
            });
        }

        Ok(Self(labels))
    }

    /// Value of the label called `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .binary_search_by(|l| l.name.as_str().cmp(name))
            .ok()
            .map(|idx| self.0[idx].value.as_str())
    }

    /// The measurement name, i.e. the value of [`METRIC_NAME_LABEL`].
    pub fn metric_name(&self) -> Option<&str> {
        self.get(METRIC_NAME_LABEL)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Label> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Label] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a Labels {
    type Item = &'a Label;
    type IntoIter = std::slice::Iter<'a, Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<'de> Deserialize<'de> for Labels {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let labels = Vec::<Label>::deserialize(deserializer)?;
        Labels::try_from_vec(labels).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, label) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={:?}", label.name, label.value)?;
        }
        write!(f, "}}")
    }
}
