use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Label set attached to a field or series.
///
/// Iteration follows insertion order, which keeps label ordering stable from input through to the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Labels(IndexMap<String, String>);

impl Labels {
    /// Creates an empty label set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of the given label, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Sets a label, returning the previous value.
    ///
    /// An existing label keeps its position; a new label is appended.
    pub fn insert<K, V>(&mut self, name: K, value: V) -> Option<String>
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.insert(name.into(), value.into())
    }

    /// Removes a label, preserving the order of the remaining labels.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for Labels
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Labels
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={:?}", name, value)?;
        }
        f.write_str("}")
    }
}

/// Shape of a set of frames holding numeric results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// One frame per series, each holding a single numeric field with at most one row.
    NumericMulti,

    /// A single frame with one numeric field per series, each with at most one row.
    NumericWide,

    /// A single frame where string columns carry the labels and each row holds one value per numeric field.
    NumericLong,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NumericMulti => "numeric_multi",
            Self::NumericWide => "numeric_wide",
            Self::NumericLong => "numeric_long",
        };
        f.write_str(name)
    }
}

/// Metadata describing a frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameMeta {
    /// Declared shape of the frame, if the producer knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FrameKind>,
}

/// Column data of a field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum FieldValues {
    Float64(Vec<Option<f64>>),
    Int64(Vec<Option<i64>>),
    String(Vec<Option<String>>),
    Time(Vec<Option<DateTime<Utc>>>),
}

impl FieldValues {
    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        match self {
            Self::Float64(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::String(v) => v.len(),
            Self::Time(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the values are numbers.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Float64(_) | Self::Int64(_))
    }

    /// Returns the numeric value at `row`, widened to `f64`.
    ///
    /// Returns `None` for null entries, out-of-range rows, and non-numeric columns.
    pub fn f64_at(&self, row: usize) -> Option<f64> {
        match self {
            Self::Float64(v) => v.get(row).copied().flatten(),
            Self::Int64(v) => v.get(row).copied().flatten().map(|i| i as f64),
            Self::String(_) | Self::Time(_) => None,
        }
    }

    /// Returns the string value at `row`, if this is a string column.
    pub fn str_at(&self, row: usize) -> Option<&str> {
        match self {
            Self::String(v) => v.get(row).and_then(Option::as_deref),
            _ => None,
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Self::Float64(_) => "float64",
            Self::Int64(_) => "int64",
            Self::String(_) => "string",
            Self::Time(_) => "time",
        }
    }
}

/// A named, optionally labeled column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    pub values: FieldValues,
}

impl Field {
    /// Creates a float column.
    pub fn float64<N>(name: N, labels: Labels, values: Vec<Option<f64>>) -> Self
    where
        N: Into<String>,
    {
        Self {
            name: name.into(),
            labels,
            values: FieldValues::Float64(values),
        }
    }

    /// Creates an integer column.
    pub fn int64<N>(name: N, labels: Labels, values: Vec<Option<i64>>) -> Self
    where
        N: Into<String>,
    {
        Self {
            name: name.into(),
            labels,
            values: FieldValues::Int64(values),
        }
    }

    /// Creates an unlabeled string column.
    pub fn string<N>(name: N, values: Vec<Option<String>>) -> Self
    where
        N: Into<String>,
    {
        Self {
            name: name.into(),
            labels: Labels::new(),
            values: FieldValues::String(values),
        }
    }

    /// Creates an unlabeled time column.
    pub fn time<N>(name: N, values: Vec<Option<DateTime<Utc>>>) -> Self
    where
        N: Into<String>,
    {
        Self {
            name: name.into(),
            labels: Labels::new(),
            values: FieldValues::Time(values),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A named group of equal-length columns.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<FrameMeta>,
}

impl Frame {
    /// Creates an empty frame.
    pub fn new<N>(name: N) -> Self
    where
        N: Into<String>,
    {
        Self {
            name: name.into(),
            fields: Vec::new(),
            meta: None,
        }
    }

    /// Appends a field.
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Declares the shape of this frame.
    pub fn with_kind(mut self, kind: FrameKind) -> Self {
        self.meta.get_or_insert_with(FrameMeta::default).kind = Some(kind);
        self
    }

    /// Returns the declared shape, if any.
    pub fn kind(&self) -> Option<FrameKind> {
        self.meta.as_ref().and_then(|meta| meta.kind)
    }

    /// Returns the number of rows, taken from the first field.
    pub fn row_count(&self) -> usize {
        self.fields.first().map_or(0, Field::len)
    }
}

/// An ordered set of frames, as produced by a single query.
pub type Frames = Vec<Frame>;
