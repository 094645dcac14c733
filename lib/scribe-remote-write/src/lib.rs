//! Remote write of rule evaluation results.
//!
//! Results of a recording rule arrive as frames. [`RemoteWriter`] reads them as points, encodes the points as a
//! Prometheus remote-write request, and sends that request to a remote metrics store. Rejections caused by a sample
//! already existing for the same timestamp are not treated as failures (see [`DuplicateSampleClassifier`]).
#![deny(warnings)]
#![deny(missing_docs)]

mod classifier;
pub use self::classifier::{
    DuplicateSampleClassifier, DuplicateSignature, SignatureKind, WriteOutcome, DUPLICATE_TIMESTAMP_SIGNATURES,
};

mod client;
pub use self::client::{RemoteWriteClient, WriteError, DEFAULT_USER_AGENT};

mod config;
pub use self::config::{ConfigError, WriterConfig};

mod error;
pub use self::error::Error;

pub mod points;
pub use self::points::{extract_points, ExtractionError, Metric, Point};

pub mod proto;

mod writer;
pub use self::writer::{to_write_request, RemoteWriter};
