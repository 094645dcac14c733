use std::time::Duration;

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::ClientConfig;

/// A connector that supports HTTP or HTTPS.
pub type HttpsCapableConnector = HttpsConnector<HttpConnector>;

/// A builder for [`HttpsCapableConnector`].
#[derive(Clone, Debug, Default)]
pub struct HttpsCapableConnectorBuilder {
    connect_timeout: Option<Duration>,
}

impl HttpsCapableConnectorBuilder {
    /// Sets the timeout when connecting to the remote host.
    ///
    /// Defaults to 30 seconds.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Builds the `HttpsCapableConnector` from the given TLS configuration.
    pub fn build(self, tls_config: ClientConfig) -> HttpsCapableConnector {
        let connect_timeout = self.connect_timeout.unwrap_or(Duration::from_secs(30));

        // Plain HTTP must stay allowed here, or wrapping in the HTTPS connector breaks `http://` endpoints.
        let mut http_connector = HttpConnector::new();
        http_connector.set_connect_timeout(Some(connect_timeout));
        http_connector.enforce_http(false);

        HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_all_versions()
            .wrap_connector(http_connector)
    }
}
