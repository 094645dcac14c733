//! Points extracted from rule evaluation results.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use scribe_frame::{CollectionError, CollectionReader, Frame, Labels};
use serde::Serialize;
use snafu::{ResultExt as _, Snafu};

/// Reserved label holding the metric name on the wire.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// Frames that could not be read as points.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ExtractionError {
    /// The frames do not form a numeric collection.
    #[snafu(display("Failed to read frames as numeric data: {}", source))]
    Collection {
        /// Error source.
        source: CollectionError,
    },

    /// Two series end up with the same labels once `__name__` is dropped and extra labels are applied.
    ///
    /// Sending both would put two samples for one series and timestamp in a single request.
    #[snafu(display("Several series share the labels {}.", labels))]
    DuplicateSeries {
        /// The shared label set.
        labels: String,
    },
}

/// A single observation.
///
/// A NaN value means the series had no sample at this instant.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Metric {
    /// Observation time.
    pub timestamp: DateTime<Utc>,

    /// Observed value.
    pub value: f64,
}

/// An observation of one series, identified by its metric name and labels.
///
/// `labels` never holds [`METRIC_NAME_LABEL`]: the name travels in `name` and only becomes a label when encoded.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Point {
    /// Metric name.
    pub name: String,

    /// Series labels.
    pub labels: Labels,

    /// The observation.
    pub metric: Metric,
}

/// Extracts one point per series found in `frames`.
///
/// Points follow the order in which the frames hold their series. Each point carries a copy of its series labels with
/// any `__name__` label removed, overlaid with `extra_labels`. Extra labels replace series labels of the same name
/// in place, and the remaining extra labels are appended in order. A `__name__` extra label is ignored, since `name`
/// always names the metric. Null or missing values become NaN.
///
/// # Errors
///
/// If the frames cannot be read as numeric data, or two series share the same labels once the metric name label is
/// dropped and the extra labels are applied, an error is returned.
pub fn extract_points(
    name: &str, timestamp: DateTime<Utc>, frames: &[Frame], extra_labels: &Labels,
) -> Result<Vec<Point>, ExtractionError> {
    let collection = CollectionReader::from_frames(frames)
        .and_then(|reader| reader.collection())
        .context(Collection)?;

    let points: Vec<Point> = collection
        .into_iter()
        .map(|series| {
            let value = series.nullable_value().unwrap_or(f64::NAN);

            let mut labels = series.labels().clone();
            labels.remove(METRIC_NAME_LABEL);
            for (label, label_value) in extra_labels.iter().filter(|(label, _)| *label != METRIC_NAME_LABEL) {
                labels.insert(label, label_value);
            }

            Point {
                name: name.to_string(),
                labels,
                metric: Metric { timestamp, value },
            }
        })
        .collect();

    check_distinct_series(&points)?;

    Ok(points)
}

fn check_distinct_series(points: &[Point]) -> Result<(), ExtractionError> {
    let mut seen = HashSet::with_capacity(points.len());
    for point in points {
        let mut key: Vec<(&str, &str)> = point.labels.iter().collect();
        key.sort_unstable();
        if !seen.insert(key) {
            return Err(ExtractionError::DuplicateSeries {
                labels: point.labels.to_string(),
            });
        }
    }
    Ok(())
}
