use std::borrow::Cow;

use http::StatusCode;

use crate::WriteError;

/// How reliable a duplicate-timestamp signature is.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignatureKind {
    /// A stable error identifier documented by the remote store.
    Official,

    /// Free-form error text, which may change between releases of the remote store.
    BestEffort,
}

/// Text identifying a rejection caused by a sample already existing at the same timestamp.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DuplicateSignature {
    pattern: Cow<'static, str>,
    kind: SignatureKind,
}

impl DuplicateSignature {
    /// Creates a signature from a stable error identifier.
    pub const fn official(pattern: &'static str) -> Self {
        Self {
            pattern: Cow::Borrowed(pattern),
            kind: SignatureKind::Official,
        }
    }

    /// Creates a signature from free-form error text.
    pub const fn best_effort(pattern: &'static str) -> Self {
        Self {
            pattern: Cow::Borrowed(pattern),
            kind: SignatureKind::BestEffort,
        }
    }

    /// Creates a signature from any text.
    pub fn new<P>(pattern: P, kind: SignatureKind) -> Self
    where
        P: Into<Cow<'static, str>>,
    {
        Self {
            pattern: pattern.into(),
            kind,
        }
    }

    /// Returns the text searched for in error messages.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns the signature kind.
    pub fn kind(&self) -> SignatureKind {
        self.kind
    }
}

/// Known duplicate-timestamp rejection signatures.
///
/// - `err-mimir-sample-duplicate-timestamp`: the error identifier Mimir attaches to these rejections.
/// - `duplicate sample for timestamp`: the message Prometheus-compatible stores, older Mimir and Cortex included, use
///   for the same rejection.
pub const DUPLICATE_TIMESTAMP_SIGNATURES: &[DuplicateSignature] = &[
    DuplicateSignature::official("err-mimir-sample-duplicate-timestamp"),
    DuplicateSignature::best_effort("duplicate sample for timestamp"),
];

/// Result of a remote write that did not fail.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WriteOutcome {
    /// The remote store accepted the samples.
    Written,

    /// The remote store rejected the samples because samples already exist at the same timestamp.
    ///
    /// Rule evaluations are retried and replayed, so writing the same sample twice is expected.
    ToleratedDuplicate {
        /// The signature found in the rejection.
        signature: DuplicateSignature,
    },
}

/// Decides whether a failed remote write is a duplicate-sample rejection.
///
/// A failure is a duplicate-sample rejection when the remote store answered with `400 Bad Request` and the response
/// message contains one of the configured signatures. Every other failure, including a signature match under a
/// different status, stays an error.
#[derive(Clone, Debug)]
pub struct DuplicateSampleClassifier {
    signatures: Vec<DuplicateSignature>,
}

impl DuplicateSampleClassifier {
    /// Creates a classifier with the given signatures.
    pub fn new<I>(signatures: I) -> Self
    where
        I: IntoIterator<Item = DuplicateSignature>,
    {
        Self {
            signatures: signatures.into_iter().collect(),
        }
    }

    /// Adds a signature.
    pub fn with_signature(mut self, signature: DuplicateSignature) -> Self {
        self.signatures.push(signature);
        self
    }

    /// Returns the configured signatures.
    pub fn signatures(&self) -> &[DuplicateSignature] {
        &self.signatures
    }

    /// Returns the first signature matching the given error, if it is a duplicate-sample rejection.
    pub fn matching_signature(&self, error: &WriteError) -> Option<&DuplicateSignature> {
        match error {
            WriteError::Status { status, message } if *status == StatusCode::BAD_REQUEST => self
                .signatures
                .iter()
                .find(|signature| message.contains(signature.pattern())),
            _ => None,
        }
    }

    /// Classifies the result of a remote write.
    ///
    /// # Errors
    ///
    /// If the write failed for any reason other than a duplicate-sample rejection, the original error is returned.
    pub fn classify(&self, result: Result<(), WriteError>) -> Result<WriteOutcome, WriteError> {
        match result {
            Ok(()) => Ok(WriteOutcome::Written),
            Err(e) => match self.matching_signature(&e) {
                Some(signature) => Ok(WriteOutcome::ToleratedDuplicate {
                    signature: signature.clone(),
                }),
                None => Err(e),
            },
        }
    }
}

impl Default for DuplicateSampleClassifier {
    fn default() -> Self {
        Self::new(DUPLICATE_TIMESTAMP_SIGNATURES.iter().cloned())
    }
}
