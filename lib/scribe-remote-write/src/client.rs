use std::time::Duration;

use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode, Uri};
use prost::Message as _;
use scribe_io::net::{util::FixedBody, Transport};
use snafu::Snafu;
use tokio::time::Instant;
use tower::{BoxError, ServiceExt as _};
use tracing::trace;

use crate::proto::WriteRequest;

/// User agent sent with every remote write.
pub const DEFAULT_USER_AGENT: &str = "scribe-recording-rule";

static CONTENT_ENCODING_SNAPPY: HeaderValue = HeaderValue::from_static("snappy");
static CONTENT_TYPE_PROTOBUF: HeaderValue = HeaderValue::from_static("application/x-protobuf");
static REMOTE_WRITE_VERSION: HeaderValue = HeaderValue::from_static("0.1.0");

const REMOTE_WRITE_VERSION_HEADER: &str = "x-prometheus-remote-write-version";

/// A remote write error.
#[derive(Debug, Snafu)]
pub enum WriteError {
    /// The remote store answered with a non-success status.
    ///
    /// `message` holds the response body, which is where remote stores put their error details.
    #[snafu(display("server returned HTTP status {}: {}", status, message))]
    Status {
        /// Response status.
        status: StatusCode,

        /// Response body, as text.
        message: String,
    },

    /// The request could not be sent, or the response could not be read.
    #[snafu(display("failed to send remote write request: {}", source))]
    Transport {
        /// Error source.
        source: BoxError,
    },

    /// The deadline elapsed before the remote store answered.
    #[snafu(display("remote write request timed out"))]
    Timeout,

    /// The request payload could not be compressed.
    #[snafu(display("failed to compress remote write request: {}", source))]
    Encode {
        /// Error source.
        source: snap::Error,
    },

    /// The HTTP request could not be built.
    #[snafu(display("failed to build remote write request: {}", source))]
    Request {
        /// Error source.
        source: http::Error,
    },
}

/// A Prometheus remote-write client.
///
/// Sends [`WriteRequest`]s, encoded as snappy-compressed protobuf, to a single endpoint over the given transport.
/// Cloning is cheap, and clones share the same transport.
#[derive(Clone)]
pub struct RemoteWriteClient {
    endpoint: Uri,
    user_agent: HeaderValue,
    timeout: Duration,
    transport: Transport,
}

impl RemoteWriteClient {
    /// Creates a new client for the given endpoint.
    ///
    /// Every request is bounded by `timeout`, from the moment it is sent until the full response is read.
    pub fn new(endpoint: Uri, timeout: Duration, transport: Transport) -> Self {
        Self {
            endpoint,
            user_agent: HeaderValue::from_static(DEFAULT_USER_AGENT),
            timeout,
            transport,
        }
    }

    /// Sets the user agent sent with every request.
    pub fn with_user_agent(mut self, user_agent: HeaderValue) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Returns the endpoint requests are sent to.
    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    /// Returns the per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends the given request.
    ///
    /// # Errors
    ///
    /// If the request could not be encoded or sent, if the timeout elapsed, or if the remote store answered with a
    /// non-success status, an error is returned.
    pub async fn store(&self, request: &WriteRequest) -> Result<(), WriteError> {
        self.store_until(request, Instant::now() + self.timeout).await
    }

    /// Sends the given request, giving up at `deadline` or when the timeout elapses, whichever comes first.
    ///
    /// # Errors
    ///
    /// If the request could not be encoded or sent, if the deadline passed, or if the remote store answered with a
    /// non-success status, an error is returned.
    pub async fn store_until(&self, request: &WriteRequest, deadline: Instant) -> Result<(), WriteError> {
        let deadline = deadline.min(Instant::now() + self.timeout);
        let http_request = self.build_request(request)?;

        let response = match tokio::time::timeout_at(deadline, self.transport.clone().oneshot(http_request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is::<tower::timeout::error::Elapsed>() => return Err(WriteError::Timeout),
            Ok(Err(e)) => return Err(WriteError::Transport { source: e }),
            Err(_) => return Err(WriteError::Timeout),
        };

        check_response(response)
    }

    fn build_request(&self, request: &WriteRequest) -> Result<Request<FixedBody>, WriteError> {
        let encoded = request.encode_to_vec();
        let compressed = snap::raw::Encoder::new()
            .compress_vec(&encoded)
            .map_err(|source| WriteError::Encode { source })?;

        trace!(
            endpoint = %self.endpoint,
            series = request.timeseries.len(),
            encoded_len = encoded.len(),
            compressed_len = compressed.len(),
            "Built remote write request."
        );

        Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.clone())
            .header(header::CONTENT_ENCODING, CONTENT_ENCODING_SNAPPY.clone())
            .header(header::CONTENT_TYPE, CONTENT_TYPE_PROTOBUF.clone())
            .header(header::USER_AGENT, self.user_agent.clone())
            .header(REMOTE_WRITE_VERSION_HEADER, REMOTE_WRITE_VERSION.clone())
            .body(FixedBody::new(compressed))
            .map_err(|source| WriteError::Request { source })
    }
}

fn check_response(response: Response<Bytes>) -> Result<(), WriteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let message = String::from_utf8_lossy(response.body()).trim().to_string();
    Err(WriteError::Status { status, message })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::proto::{Label, Sample, TimeSeries};

    type Captured = Arc<Mutex<Vec<Request<FixedBody>>>>;

    fn responding(status: StatusCode, body: &'static str) -> (Transport, Captured) {
        let captured = Captured::default();
        let requests = Arc::clone(&captured);
        let transport = Transport::new(tower::service_fn(move |req: Request<FixedBody>| {
            requests.lock().unwrap().push(req);
            async move {
                let mut response = Response::new(Bytes::from_static(body.as_bytes()));
                *response.status_mut() = status;
                Ok::<_, BoxError>(response)
            }
        }));
        (transport, captured)
    }

    fn client(transport: Transport) -> RemoteWriteClient {
        RemoteWriteClient::new(
            Uri::from_static("http://mimir.local/api/v1/push"),
            Duration::from_secs(10),
            transport,
        )
    }

    fn write_request() -> WriteRequest {
        WriteRequest {
            timeseries: vec![TimeSeries {
                labels: vec![Label {
                    name: "__name__".to_string(),
                    value: "up".to_string(),
                }],
                samples: vec![Sample {
                    value: 1.0,
                    timestamp: 1_700_000_000_000,
                }],
            }],
        }
    }

    #[tokio::test]
    async fn sends_protocol_headers_and_compressed_body() {
        let (transport, captured) = responding(StatusCode::NO_CONTENT, "");

        client(transport).store(&write_request()).await.unwrap();

        let requests = captured.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.uri(), "http://mimir.local/api/v1/push");

        let headers = request.headers();
        assert_eq!(headers[header::CONTENT_ENCODING], "snappy");
        assert_eq!(headers[header::CONTENT_TYPE], "application/x-protobuf");
        assert_eq!(headers[header::USER_AGENT], DEFAULT_USER_AGENT);
        assert_eq!(headers[REMOTE_WRITE_VERSION_HEADER], "0.1.0");

        let decompressed = snap::raw::Decoder::new()
            .decompress_vec(request.body().as_bytes())
            .unwrap();
        let decoded = WriteRequest::decode(decompressed.as_slice()).unwrap();
        assert_eq!(decoded, write_request());
    }

    #[tokio::test]
    async fn custom_user_agent() {
        let (transport, captured) = responding(StatusCode::OK, "");

        client(transport)
            .with_user_agent(HeaderValue::from_static("scribe-backfill"))
            .store(&write_request())
            .await
            .unwrap();

        assert_eq!(captured.lock().unwrap()[0].headers()[header::USER_AGENT], "scribe-backfill");
    }

    #[tokio::test]
    async fn error_status_carries_body() {
        let (transport, _) = responding(StatusCode::BAD_REQUEST, "duplicate sample for timestamp\n");

        let err = client(transport).store(&write_request()).await.unwrap_err();
        match err {
            WriteError::Status { status, message } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(message, "duplicate sample for timestamp");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn transport_failures_are_reported() {
        let transport = Transport::new(tower::service_fn(|_: Request<FixedBody>| async {
            Err::<Response<Bytes>, BoxError>("connection refused".into())
        }));

        let err = client(transport).store(&write_request()).await.unwrap_err();
        assert!(matches!(err, WriteError::Transport { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_elapses() {
        let transport = Transport::new(tower::service_fn(|_: Request<FixedBody>| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, BoxError>(Response::new(Bytes::new()))
        }));

        let err = client(transport).store(&write_request()).await.unwrap_err();
        assert!(matches!(err, WriteError::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn earlier_deadline_wins() {
        let transport = Transport::new(tower::service_fn(|_: Request<FixedBody>| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, BoxError>(Response::new(Bytes::new()))
        }));

        let client = client(transport);
        let deadline = Instant::now() + Duration::from_secs(1);
        let err = client.store_until(&write_request(), deadline).await.unwrap_err();
        assert!(matches!(err, WriteError::Timeout));

        // The 10 second timeout leaves enough room without the explicit deadline.
        client.store(&write_request()).await.unwrap();
    }
}
