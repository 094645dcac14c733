//! Reading frames as a collection of numeric series.
//!
//! Query results arrive as frames in one of several numeric shapes (see [`FrameKind`]). [`CollectionReader`] detects
//! or validates the shape and flattens it into a list of [`NumericRef`]s: one label set and one optional value per
//! series.

use snafu::Snafu;

use crate::{Field, FieldValues, Frame, FrameKind, Labels};

const METRIC_NAME_LABEL: &str = "__name__";

/// A frame set that could not be read as a numeric collection.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum CollectionError {
    /// Frames declare different kinds.
    #[snafu(display("Frames declare conflicting kinds '{}' and '{}'.", first, other))]
    MixedKinds { first: FrameKind, other: FrameKind },

    /// A frame holds a time column, so it is a time series rather than a numeric result.
    #[snafu(display(
        "Frame '{}' contains time field '{}'; numeric collections cannot hold time fields.",
        frame,
        field
    ))]
    TimeField { frame: String, field: String },

    /// The frames match none of the numeric shapes.
    #[snafu(display("Frames do not form a numeric collection: {}.", reason))]
    UnsupportedShape { reason: String },

    /// The frames declare a kind but do not have its shape.
    #[snafu(display("Frames are declared as '{}' but {}.", kind, reason))]
    InvalidShape { kind: FrameKind, reason: String },
}

/// A single series in a numeric collection.
#[derive(Clone, Debug, PartialEq)]
pub struct NumericRef {
    labels: Labels,
    value: Option<f64>,
    empty: bool,
}

impl NumericRef {
    fn new(labels: Labels, value: Option<f64>, empty: bool) -> Self {
        Self { labels, value, empty }
    }

    /// Returns the series labels.
    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// Returns `true` if the series has no row at all, as opposed to a null row.
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Returns the series value, or `None` when the series is empty or its value is null.
    pub fn nullable_value(&self) -> Option<f64> {
        if self.empty {
            None
        } else {
            self.value
        }
    }
}

/// Series read from a set of frames, in frame order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NumericCollection {
    kind: Option<FrameKind>,
    refs: Vec<NumericRef>,
}

impl NumericCollection {
    /// Returns the shape the collection was read from, or `None` if there were no frames to read.
    pub fn kind(&self) -> Option<FrameKind> {
        self.kind
    }

    pub fn refs(&self) -> &[NumericRef] {
        &self.refs
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

impl IntoIterator for NumericCollection {
    type Item = NumericRef;
    type IntoIter = std::vec::IntoIter<NumericRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.refs.into_iter()
    }
}

/// Reads frames as a numeric collection.
///
/// The shape is taken from the frames' declared kind when present. Otherwise it is inferred:
///
/// - no frames, or only frames without fields: an empty collection
/// - several frames, or one frame with a single numeric field: [`FrameKind::NumericMulti`]
/// - one frame with string and numeric fields: [`FrameKind::NumericLong`]
/// - one frame with only numeric fields: [`FrameKind::NumericWide`]
#[derive(Debug)]
pub struct CollectionReader<'a> {
    frames: &'a [Frame],
    kind: Option<FrameKind>,
}

impl<'a> CollectionReader<'a> {
    /// Creates a reader over the given frames, detecting their shape.
    ///
    /// # Errors
    ///
    /// If the frames declare conflicting kinds, hold time fields, or match no numeric shape, an error is returned.
    pub fn from_frames(frames: &'a [Frame]) -> Result<Self, CollectionError> {
        for frame in frames {
            if let Some(field) = frame.fields.iter().find(|f| matches!(f.values, FieldValues::Time(_))) {
                return Err(CollectionError::TimeField {
                    frame: frame.name.clone(),
                    field: field.name.clone(),
                });
            }
        }

        let kind = match declared_kind(frames)? {
            Some(kind) => Some(kind),
            None => infer_kind(frames)?,
        };

        Ok(Self { frames, kind })
    }

    /// Returns the detected shape, or `None` if the frames hold no data.
    pub fn kind(&self) -> Option<FrameKind> {
        self.kind
    }

    /// Reads the collection.
    ///
    /// # Errors
    ///
    /// If the frames do not have the shape of the detected or declared kind, an error is returned.
    pub fn collection(&self) -> Result<NumericCollection, CollectionError> {
        let refs = match self.kind {
            None => Vec::new(),
            Some(FrameKind::NumericMulti) => read_multi(self.frames)?,
            Some(FrameKind::NumericWide) => read_wide(self.frames)?,
            Some(FrameKind::NumericLong) => read_long(self.frames)?,
        };

        Ok(NumericCollection { kind: self.kind, refs })
    }
}

fn declared_kind(frames: &[Frame]) -> Result<Option<FrameKind>, CollectionError> {
    let mut declared = None;
    for kind in frames.iter().filter_map(Frame::kind) {
        match declared {
            None => declared = Some(kind),
            Some(first) if first != kind => return Err(CollectionError::MixedKinds { first, other: kind }),
            Some(_) => {}
        }
    }
    Ok(declared)
}

fn infer_kind(frames: &[Frame]) -> Result<Option<FrameKind>, CollectionError> {
    if frames.iter().all(|frame| frame.fields.is_empty()) {
        return Ok(None);
    }

    if let [frame] = frames {
        let numeric = frame.fields.iter().filter(|f| f.values.is_numeric()).count();
        let strings = frame.fields.len() - numeric;

        return match (numeric, strings) {
            (0, _) => Err(CollectionError::UnsupportedShape {
                reason: format!("frame '{}' has no numeric fields", frame.name),
            }),
            (1, 0) => Ok(Some(FrameKind::NumericMulti)),
            (_, 0) => Ok(Some(FrameKind::NumericWide)),
            (_, _) => Ok(Some(FrameKind::NumericLong)),
        };
    }

    Ok(Some(FrameKind::NumericMulti))
}

fn read_multi(frames: &[Frame]) -> Result<Vec<NumericRef>, CollectionError> {
    let kind = FrameKind::NumericMulti;
    let mut refs = Vec::with_capacity(frames.len());

    for frame in frames {
        let field = match frame.fields.as_slice() {
            [field] => field,
            // Frames without fields carry no series.
            [] => continue,
            _ => {
                return Err(CollectionError::InvalidShape {
                    kind,
                    reason: format!("frame '{}' has {} fields instead of one", frame.name, frame.fields.len()),
                })
            }
        };

        refs.push(single_row_ref(kind, frame, field)?);
    }

    Ok(refs)
}

fn read_wide(frames: &[Frame]) -> Result<Vec<NumericRef>, CollectionError> {
    let kind = FrameKind::NumericWide;
    let frame = single_frame(kind, frames)?;

    frame
        .fields
        .iter()
        .map(|field| single_row_ref(kind, frame, field))
        .collect()
}

fn read_long(frames: &[Frame]) -> Result<Vec<NumericRef>, CollectionError> {
    let kind = FrameKind::NumericLong;
    let frame = single_frame(kind, frames)?;
    let rows = frame.row_count();

    if let Some(field) = frame.fields.iter().find(|f| f.len() != rows) {
        return Err(CollectionError::InvalidShape {
            kind,
            reason: format!(
                "field '{}' has {} rows while the frame has {}",
                field.name,
                field.len(),
                rows
            ),
        });
    }

    let (numeric, strings): (Vec<&Field>, Vec<&Field>) = frame.fields.iter().partition(|f| f.values.is_numeric());
    if numeric.is_empty() {
        return Err(CollectionError::InvalidShape {
            kind,
            reason: format!("frame '{}' has no numeric fields", frame.name),
        });
    }

    let name_by_field = numeric.len() > 1;
    let mut refs = Vec::with_capacity(rows * numeric.len());
    for row in 0..rows {
        let mut row_labels = Labels::new();
        for field in &strings {
            row_labels.insert(field.name.as_str(), field.values.str_at(row).unwrap_or_default());
        }

        for field in &numeric {
            let mut labels = row_labels.clone();
            for (name, value) in field.labels.iter() {
                labels.insert(name, value);
            }
            if name_by_field {
                labels.insert(METRIC_NAME_LABEL, field.name.as_str());
            }

            refs.push(NumericRef::new(labels, field.values.f64_at(row), false));
        }
    }

    Ok(refs)
}

fn single_frame(kind: FrameKind, frames: &[Frame]) -> Result<&Frame, CollectionError> {
    match frames {
        [frame] => Ok(frame),
        _ => Err(CollectionError::InvalidShape {
            kind,
            reason: format!("{} frames were given instead of one", frames.len()),
        }),
    }
}

fn single_row_ref(kind: FrameKind, frame: &Frame, field: &Field) -> Result<NumericRef, CollectionError> {
    if !field.values.is_numeric() {
        return Err(CollectionError::InvalidShape {
            kind,
            reason: format!(
                "field '{}' of frame '{}' is {}, not numeric",
                field.name,
                frame.name,
                field.values.type_name()
            ),
        });
    }

    match field.len() {
        0 => Ok(NumericRef::new(field.labels.clone(), None, true)),
        1 => Ok(NumericRef::new(field.labels.clone(), field.values.f64_at(0), false)),
        rows => Err(CollectionError::InvalidShape {
            kind,
            reason: format!(
                "field '{}' of frame '{}' has {} rows instead of at most one",
                field.name, frame.name, rows
            ),
        }),
    }
}
