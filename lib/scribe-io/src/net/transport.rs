use std::fmt;

use bytes::Bytes;
use http::{HeaderMap, Request, Response};
use scribe_error::GenericError;
use tower::{util::BoxCloneSyncService, BoxError};

use super::{client::http::HttpClientBuilder, util::FixedBody};

/// A type-erased HTTP transport.
///
/// Takes a request with a fully-buffered body and resolves to a response whose body has already been read to
/// completion.
pub type Transport = BoxCloneSyncService<Request<FixedBody>, Response<Bytes>, BoxError>;

/// Basic authentication credentials.
#[derive(Clone, Eq, PartialEq)]
pub struct BasicAuth {
    username: String,
    password: String,
}

impl BasicAuth {
    /// Creates a new `BasicAuth` from the given username and password.
    pub fn new<U, P>(username: U, password: P) -> Self
    where
        U: Into<String>,
        P: Into<String>,
    {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the password.
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Options used when requesting a transport from a [`TransportProvider`].
#[derive(Clone, Debug, Default)]
pub struct TransportOptions {
    /// Credentials to attach to every request, if any.
    pub basic_auth: Option<BasicAuth>,

    /// Headers to attach to every request.
    pub headers: HeaderMap,
}

/// A source of HTTP transports.
///
/// Every transport handed out applies the given options to each request that passes through it.
pub trait TransportProvider {
    /// Returns a transport configured with the given options.
    ///
    /// # Errors
    ///
    /// If the transport cannot be created, an error is returned.
    fn get_transport(&self, options: TransportOptions) -> Result<Transport, GenericError>;
}

impl<F> TransportProvider for F
where
    F: Fn(TransportOptions) -> Result<Transport, GenericError>,
{
    fn get_transport(&self, options: TransportOptions) -> Result<Transport, GenericError> {
        self(options)
    }
}

/// A [`TransportProvider`] backed by a real HTTP client.
///
/// By default, clients have no request timeout: remote-write clients enforce their own.
#[derive(Clone)]
pub struct HttpTransportProvider {
    builder: HttpClientBuilder,
}

impl HttpTransportProvider {
    /// Creates a new `HttpTransportProvider` with the default client settings, minus the request timeout.
    pub fn new() -> Self {
        Self::from_builder(HttpClientBuilder::default().without_request_timeout())
    }

    /// Creates a new `HttpTransportProvider` that builds clients from the given builder.
    pub fn from_builder(builder: HttpClientBuilder) -> Self {
        Self { builder }
    }
}

impl TransportProvider for HttpTransportProvider {
    fn get_transport(&self, options: TransportOptions) -> Result<Transport, GenericError> {
        let client = self
            .builder
            .clone()
            .with_default_headers(options.headers)
            .with_basic_auth(options.basic_auth)
            .build()?;

        Ok(client.into_transport())
    }
}

impl Default for HttpTransportProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use http::{HeaderValue, StatusCode};
    use tower::ServiceExt as _;

    use super::*;

    #[test]
    fn basic_auth_debug_redacts_password() {
        let auth = BasicAuth::new("admin", "hunter2");
        let rendered = format!("{:?}", auth);

        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }

    #[tokio::test]
    async fn closures_are_providers() {
        let provider = |options: TransportOptions| -> Result<Transport, GenericError> {
            let has_auth = options.basic_auth.is_some();
            Ok(Transport::new(tower::service_fn(move |_: Request<FixedBody>| async move {
                let status = if has_auth {
                    StatusCode::OK
                } else {
                    StatusCode::UNAUTHORIZED
                };
                let mut response = Response::new(Bytes::new());
                *response.status_mut() = status;
                Ok::<_, BoxError>(response)
            })))
        };

        let options = TransportOptions {
            basic_auth: Some(BasicAuth::new("user", "pass")),
            headers: HeaderMap::new(),
        };
        let transport = provider.get_transport(options).unwrap();
        let response = transport
            .oneshot(Request::new(FixedBody::default()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn http_provider_builds_transport() {
        let provider = HttpTransportProvider::from_builder(
            HttpClientBuilder::default().with_tls_config(|tls| tls.with_root_cert_store(rustls::RootCertStore::empty())),
        );

        let mut headers = HeaderMap::new();
        headers.insert("x-scope-orgid", HeaderValue::from_static("tenant-1"));
        let options = TransportOptions {
            basic_auth: None,
            headers,
        };

        assert!(provider.get_transport(options).is_ok());
    }
}
