use std::{fmt, time::Duration};

use http::{
    header::{InvalidHeaderName, InvalidHeaderValue},
    HeaderMap, HeaderName, HeaderValue, Uri,
};
use indexmap::IndexMap;
use scribe_io::net::BasicAuth;
use serde::Deserialize;
use serde_with::{serde_as, DurationSecondsWithFrac};
use snafu::{ResultExt as _, Snafu};
use url::Url;

const fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

/// An invalid writer configuration.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigError {
    /// A basic auth username was given without a password.
    #[snafu(display("Basic auth password must be set when a basic auth username is set."))]
    MissingPassword,

    /// The URL is not a valid absolute HTTP(S) URL.
    #[snafu(display("Invalid remote write URL '{}': {}.", url, reason))]
    InvalidUrl {
        /// The configured URL.
        url: String,

        /// Why the URL was rejected.
        reason: String,
    },

    /// The timeout is zero.
    #[snafu(display("Remote write timeout must be greater than zero."))]
    NonPositiveTimeout,

    /// A custom header name is not a valid HTTP header name.
    #[snafu(display("Invalid custom header name '{}'.", name))]
    InvalidCustomHeaderName {
        /// The configured header name.
        name: String,

        /// Error source.
        source: InvalidHeaderName,
    },

    /// A custom header value is not a valid HTTP header value.
    #[snafu(display("Invalid value for custom header '{}'.", name))]
    InvalidCustomHeaderValue {
        /// The configured header name.
        name: String,

        /// Error source.
        source: InvalidHeaderValue,
    },
}

/// Remote writer configuration.
#[serde_as]
#[derive(Clone, Deserialize)]
pub struct WriterConfig {
    /// Remote write endpoint, such as `http://mimir:9009/api/v1/push`.
    pub url: String,

    /// Per-request timeout.
    ///
    /// Read from `timeout_secs`, in seconds. Fractions are allowed, such as `0.5`. Defaults to 30 seconds.
    #[serde(rename = "timeout_secs", default = "default_timeout")]
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub timeout: Duration,

    /// Basic auth username.
    ///
    /// When empty, no credentials are sent and `basic_auth_password` is ignored.
    #[serde(default)]
    pub basic_auth_username: String,

    /// Basic auth password.
    #[serde(default)]
    pub basic_auth_password: String,

    /// Headers sent with every request, such as `X-Scope-OrgID`.
    #[serde(default)]
    pub custom_headers: IndexMap<String, String>,
}

impl WriterConfig {
    /// Creates a configuration for the given endpoint with default settings.
    pub fn new<U: Into<String>>(url: U) -> Self {
        Self {
            url: url.into(),
            timeout: default_timeout(),
            basic_auth_username: String::new(),
            basic_auth_password: String::new(),
            custom_headers: IndexMap::new(),
        }
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the per-request timeout, in whole seconds.
    pub fn with_timeout_secs(self, timeout_secs: u64) -> Self {
        self.with_timeout(Duration::from_secs(timeout_secs))
    }

    /// Sets the basic auth credentials.
    pub fn with_basic_auth<U, P>(mut self, username: U, password: P) -> Self
    where
        U: Into<String>,
        P: Into<String>,
    {
        self.basic_auth_username = username.into();
        self.basic_auth_password = password.into();
        self
    }

    /// Adds a header sent with every request.
    pub fn with_custom_header<N, V>(mut self, name: N, value: V) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        self.custom_headers.insert(name.into(), value.into());
        self
    }

    /// Returns the per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Checks the configuration, and converts it into the values the writer is built from.
    ///
    /// Checks run in order: basic auth pairing, then the URL, then the timeout, then custom headers. The first failing
    /// check is reported.
    pub(crate) fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        let basic_auth = if self.basic_auth_username.is_empty() {
            None
        } else if self.basic_auth_password.is_empty() {
            return Err(ConfigError::MissingPassword);
        } else {
            Some(BasicAuth::new(&self.basic_auth_username, &self.basic_auth_password))
        };

        let endpoint = parse_endpoint(&self.url)?;

        if self.timeout.is_zero() {
            return Err(ConfigError::NonPositiveTimeout);
        }

        let mut headers = HeaderMap::with_capacity(self.custom_headers.len());
        for (name, value) in &self.custom_headers {
            let header_name = HeaderName::try_from(name.as_str()).context(InvalidCustomHeaderName { name })?;
            let header_value = HeaderValue::try_from(value.as_str()).context(InvalidCustomHeaderValue { name })?;
            headers.insert(header_name, header_value);
        }

        Ok(ValidatedConfig {
            endpoint,
            timeout: self.timeout(),
            basic_auth,
            headers,
        })
    }
}

impl fmt::Debug for WriterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = if self.basic_auth_password.is_empty() {
            ""
        } else {
            "<redacted>"
        };

        f.debug_struct("WriterConfig")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .field("basic_auth_username", &self.basic_auth_username)
            .field("basic_auth_password", &password)
            .field("custom_headers", &self.custom_headers)
            .finish()
    }
}

/// A checked writer configuration.
#[derive(Debug)]
pub(crate) struct ValidatedConfig {
    pub endpoint: Uri,
    pub timeout: Duration,
    pub basic_auth: Option<BasicAuth>,
    pub headers: HeaderMap,
}

fn parse_endpoint(raw: &str) -> Result<Uri, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host().is_none() {
        return Err(invalid("missing host".to_string()));
    }

    url.as_str().parse::<Uri>().map_err(|e| invalid(e.to_string()))
}
