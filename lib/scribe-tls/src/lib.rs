//! TLS client configuration for outbound remote-write connections.

use std::sync::{Arc, Mutex, OnceLock};

use rustls::{client::Resumption, crypto::CryptoProvider, ClientConfig, RootCertStore};
use scribe_error::{generic_error, ErrorContext as _, GenericError};
use tracing::debug;

static DEFAULT_CRYPTO_PROVIDER_SET: OnceLock<()> = OnceLock::new();

static DEFAULT_ROOT_CERT_STORE_MUTEX: Mutex<()> = Mutex::new(());
static DEFAULT_ROOT_CERT_STORE: OnceLock<Arc<RootCertStore>> = OnceLock::new();

const DEFAULT_MAX_TLS12_RESUMPTION_SESSIONS: usize = 8;

/// A TLS client configuration builder.
///
/// Produces a `rustls` client configuration backed by AWS-LC. Unless a root certificate store is given explicitly, the
/// process-wide store loaded by [`load_platform_root_certificates`] is used.
///
/// ## Missing
///
/// - client certificates (mTLS)
/// - skipping server certificate verification
#[derive(Clone, Default)]
pub struct ClientTLSConfigBuilder {
    max_tls12_resumption_sessions: Option<usize>,
    root_cert_store: Option<RootCertStore>,
}

impl ClientTLSConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of TLS 1.2 sessions to cache.
    ///
    /// Defaults to 8.
    pub fn with_max_tls12_resumption_sessions(mut self, max: usize) -> Self {
        self.max_tls12_resumption_sessions = Some(max);
        self
    }

    /// Sets the root certificate store to verify servers against.
    pub fn with_root_cert_store(mut self, store: RootCertStore) -> Self {
        self.root_cert_store = Some(store);
        self
    }

    /// Builds the client TLS configuration.
    ///
    /// ## Errors
    ///
    /// If no root certificate store was provided and the default store has not been loaded, or if the AWS-LC provider
    /// rejects the default protocol versions, an error is returned.
    pub fn build(self) -> Result<ClientConfig, GenericError> {
        let max_tls12_resumption_sessions = self
            .max_tls12_resumption_sessions
            .unwrap_or(DEFAULT_MAX_TLS12_RESUMPTION_SESSIONS);

        let root_cert_store = match self.root_cert_store {
            Some(store) => Arc::new(store),
            None => DEFAULT_ROOT_CERT_STORE
                .get()
                .map(Arc::clone)
                .ok_or_else(|| generic_error!("Default TLS root certificate store not initialized."))?,
        };

        let mut config = ClientConfig::builder_with_provider(crypto_provider())
            .with_safe_default_protocol_versions()
            .error_context("Failed to select TLS protocol versions.")?
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        config.resumption = Resumption::in_memory_sessions(max_tls12_resumption_sessions);

        Ok(config)
    }
}

fn crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// Installs AWS-LC as the process-wide default cryptography provider for `rustls`.
///
/// ## Errors
///
/// If a default provider was already installed, an error is returned.
pub fn initialize_default_crypto_provider() -> Result<(), GenericError> {
    if DEFAULT_CRYPTO_PROVIDER_SET.get().is_some() {
        return Err(generic_error!("Default TLS cryptography provider already initialized."));
    }

    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| generic_error!("Failed to install AWS-LC as default cryptography provider. A conflicting provider is already installed."))?;

    // Only ever set here, after the install above succeeded.
    let _ = DEFAULT_CRYPTO_PROVIDER_SET.set(());

    Ok(())
}

/// Loads the default root certificate store from the platform's native certificate store.
///
/// `SSL_CERT_FILE` and `SSL_CERT_DIR` are honored: when either is set, certificates are only loaded from those
/// locations. Certificates must be PEM encoded.
///
/// ## Errors
///
/// If the store was already loaded, if the platform store cannot be read, or if no certificate could be added, an
/// error is returned.
pub fn load_platform_root_certificates() -> Result<(), GenericError> {
    let _guard = DEFAULT_ROOT_CERT_STORE_MUTEX
        .lock()
        .map_err(|_| generic_error!("Default TLS root certificate store update lock poisoned."))?;
    if DEFAULT_ROOT_CERT_STORE.get().is_some() {
        return Err(generic_error!("Default TLS root certificate store already initialized."));
    }

    let result = rustls_native_certs::load_native_certs();
    if !result.errors.is_empty() {
        let joined_errors = result
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        return Err(generic_error!(
            "Failed to load certificates from platform's native certificate store: {}",
            joined_errors
        ));
    }

    let mut root_cert_store = RootCertStore::empty();
    let (added, failed) = root_cert_store.add_parsable_certificates(result.certs);
    if added == 0 {
        return Err(generic_error!(
            "Failed to add any certificates from environment to the default root certificate store."
        ));
    }
    debug!(added, failed, "Loaded default root certificate store.");

    let _ = DEFAULT_ROOT_CERT_STORE.set(Arc::new(root_cert_store));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_root_store_builds() {
        let config = ClientTLSConfigBuilder::new()
            .with_root_cert_store(RootCertStore::empty())
            .with_max_tls12_resumption_sessions(2)
            .build();

        assert!(config.is_ok());
    }

    #[test]
    fn missing_default_store_is_an_error() {
        // The default store is never loaded by unit tests.
        let result = ClientTLSConfigBuilder::new().build();
        assert!(result.is_err());
    }
}
