use scribe_error::GenericError;
use snafu::Snafu;

use crate::{ConfigError, ExtractionError, WriteError};

/// A remote writer error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum Error {
    /// The writer configuration is invalid.
    #[snafu(display("Invalid remote write configuration: {}", source))]
    Config {
        /// Error source.
        source: ConfigError,
    },

    /// The transport or the remote-write client could not be created.
    #[snafu(display("Failed to create remote write transport: {}", source))]
    Transport {
        /// Error source.
        source: GenericError,
    },

    /// The frames could not be read as points.
    #[snafu(display("Failed to extract points: {}", source))]
    Extraction {
        /// Error source.
        source: ExtractionError,
    },

    /// The remote write failed, and the failure was not a tolerated duplicate sample rejection.
    #[snafu(display("failed to write time series: {}", source))]
    RemoteWrite {
        /// Error source.
        source: WriteError,
    },
}
