use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Request, Response};
use http_body_util::BodyExt as _;
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::Builder,
    rt::{TokioExecutor, TokioTimer},
};
use scribe_error::GenericError;
use scribe_tls::ClientTLSConfigBuilder;
use tower::{timeout::TimeoutLayer, util::BoxCloneSyncService, BoxError, ServiceBuilder, ServiceExt as _};

use super::conn::HttpsCapableConnectorBuilder;
use crate::net::{
    util::{middleware::with_default_headers, FixedBody},
    BasicAuth, Transport,
};

/// An HTTP client.
///
/// Response bodies are read to completion before the response is handed back, so callers always see a fully buffered
/// body. Cloning is cheap, and clones share the same connection pool.
#[derive(Clone)]
pub struct HttpClient {
    inner: Transport,
}

impl HttpClient {
    /// Creates a new builder for configuring an HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Sends a request to the server, and waits for the full response.
    ///
    /// # Errors
    ///
    /// If the request could not be sent, the response body could not be read, or the request timeout elapsed, an error
    /// will be returned.
    pub async fn send(&self, req: Request<FixedBody>) -> Result<Response<Bytes>, BoxError> {
        self.inner.clone().oneshot(req).await
    }

    /// Consumes the client, returning the underlying transport.
    pub fn into_transport(self) -> Transport {
        self.inner
    }
}

/// An HTTP client builder.
///
/// # Defaults
///
/// - support for both HTTP and HTTPS (server certificates are validated against the configured root store)
/// - support for both HTTP/1.1 and HTTP/2 (negotiated via ALPN)
/// - 30 second connect timeout and 20 second per-request timeout
/// - connection pool with a 45 second idle timeout and at most 5 idle connections per host
/// - no default headers and no authentication
#[derive(Clone)]
pub struct HttpClientBuilder {
    connector_builder: HttpsCapableConnectorBuilder,
    hyper_builder: Builder,
    tls_builder: ClientTLSConfigBuilder,
    request_timeout: Option<Duration>,
    default_headers: HeaderMap,
    basic_auth: Option<BasicAuth>,
}

impl HttpClientBuilder {
    /// Sets the timeout when connecting to the remote host.
    ///
    /// Defaults to 30 seconds.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connector_builder = self.connector_builder.with_connect_timeout(timeout);
        self
    }

    /// Sets the per-request timeout.
    ///
    /// Covers sending the request and reading the full response body.
    ///
    /// Defaults to 20 seconds.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Allow requests to run indefinitely.
    ///
    /// The connect timeout still applies. Useful when the caller enforces its own deadline.
    pub fn without_request_timeout(mut self) -> Self {
        self.request_timeout = None;
        self
    }

    /// Sets headers to add to every request.
    ///
    /// These replace any header of the same name set on an individual request.
    pub fn with_default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = headers;
        self
    }

    /// Sets basic auth credentials to attach to every request.
    pub fn with_basic_auth<A>(mut self, basic_auth: A) -> Self
    where
        A: Into<Option<BasicAuth>>,
    {
        self.basic_auth = basic_auth.into();
        self
    }

    /// Sets the TLS configuration.
    pub fn with_tls_config<F>(mut self, f: F) -> Self
    where
        F: FnOnce(ClientTLSConfigBuilder) -> ClientTLSConfigBuilder,
    {
        self.tls_builder = f(self.tls_builder);
        self
    }

    /// Builds the `HttpClient`.
    ///
    /// # Errors
    ///
    /// If the TLS configuration could not be built, an error will be returned.
    pub fn build(self) -> Result<HttpClient, GenericError> {
        let tls_config = self.tls_builder.build()?;
        let connector = self.connector_builder.build(tls_config);
        let client = self.hyper_builder.build::<_, FixedBody>(connector);

        let service = ServiceBuilder::new()
            .option_layer(self.request_timeout.map(TimeoutLayer::new))
            .map_request(with_default_headers::<FixedBody>(self.default_headers, self.basic_auth))
            .service(client.map_err(BoxError::from).and_then(collect_body));

        Ok(HttpClient {
            inner: BoxCloneSyncService::new(service),
        })
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        let mut hyper_builder = Builder::new(TokioExecutor::new());
        hyper_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(45));

        Self {
            connector_builder: HttpsCapableConnectorBuilder::default(),
            hyper_builder,
            tls_builder: ClientTLSConfigBuilder::new(),
            request_timeout: Some(Duration::from_secs(20)),
            default_headers: HeaderMap::new(),
            basic_auth: None,
        }
    }
}

async fn collect_body(response: Response<Incoming>) -> Result<Response<Bytes>, BoxError> {
    let (parts, body) = response.into_parts();
    let body = body.collect().await?.to_bytes();
    Ok(Response::from_parts(parts, body))
}
