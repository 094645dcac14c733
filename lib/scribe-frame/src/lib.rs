//! Columnar query results.
//!
//! Rule evaluation produces its results as frames: named groups of typed, optionally labeled columns. This crate
//! models those frames and reads them as a flat collection of numeric series.

mod frame;
pub use self::frame::{Field, FieldValues, Frame, FrameKind, FrameMeta, Frames, Labels};

pub mod numeric;
pub use self::numeric::{CollectionError, CollectionReader, NumericCollection, NumericRef};
