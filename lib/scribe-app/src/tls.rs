//! TLS.

use scribe_error::{ErrorContext as _, GenericError};

/// Initializes the TLS subsystem.
///
/// Installs the process-wide cryptography provider and loads the platform's root certificates, which HTTPS clients
/// built afterwards validate servers against.
///
/// ## Errors
///
/// If a conflicting cryptography provider was already installed, or no root certificates could be loaded, an error
/// will be returned.
pub fn initialize_tls() -> Result<(), GenericError> {
    scribe_tls::initialize_default_crypto_provider()?;
    scribe_tls::load_platform_root_certificates().error_context("Failed to load platform root certificates.")
}
