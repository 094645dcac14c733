use chrono::{DateTime, Utc};
use scribe_frame::{Frame, Labels};
use scribe_io::net::{TransportOptions, TransportProvider};
use snafu::ResultExt as _;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::{
    classifier::{DuplicateSampleClassifier, WriteOutcome},
    client::RemoteWriteClient,
    config::WriterConfig,
    error::{Config, Extraction, RemoteWrite, Transport},
    points::{extract_points, Point, METRIC_NAME_LABEL},
    proto::{Label, Sample, TimeSeries, WriteRequest},
    Error,
};

/// Writes rule evaluation results to a remote metrics store.
///
/// The writer holds no per-write state: a single instance can be shared and used for concurrent writes.
#[derive(Clone)]
pub struct RemoteWriter {
    client: RemoteWriteClient,
    classifier: DuplicateSampleClassifier,
}

impl RemoteWriter {
    /// Creates a new `RemoteWriter` from the given configuration.
    ///
    /// The configuration is validated before a transport is requested from `transport_provider`, so an invalid
    /// configuration never allocates network resources.
    ///
    /// # Errors
    ///
    /// If the configuration is invalid, or the transport could not be created, an error is returned.
    pub fn new<P>(config: &WriterConfig, transport_provider: &P) -> Result<Self, Error>
    where
        P: TransportProvider + ?Sized,
    {
        let validated = config.validate().context(Config)?;

        let options = TransportOptions {
            basic_auth: validated.basic_auth,
            headers: validated.headers,
        };
        let transport = transport_provider.get_transport(options).context(Transport)?;

        Ok(Self {
            client: RemoteWriteClient::new(validated.endpoint, validated.timeout, transport),
            classifier: DuplicateSampleClassifier::default(),
        })
    }

    /// Sets the classifier deciding which failures are tolerated duplicate-sample rejections.
    pub fn with_classifier(mut self, classifier: DuplicateSampleClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Returns the underlying remote-write client.
    pub fn client(&self) -> &RemoteWriteClient {
        &self.client
    }

    /// Writes the series found in `frames` as samples of the metric `name` at `timestamp`.
    ///
    /// `extra_labels` are added to every series, replacing series labels of the same name. All series are sent in a
    /// single request. When the remote store rejects the request because samples already exist at the same timestamp,
    /// the write is considered successful.
    ///
    /// Dropping the returned future cancels the request.
    ///
    /// # Errors
    ///
    /// If the frames cannot be read as numeric data, or the remote write fails for any other reason than a duplicate
    /// sample, an error is returned.
    pub async fn write(
        &self, name: &str, timestamp: DateTime<Utc>, frames: &[Frame], extra_labels: &Labels,
    ) -> Result<(), Error> {
        self.write_until(Instant::now() + self.client.timeout(), name, timestamp, frames, extra_labels)
            .await
    }

    /// Writes like [`write`][Self::write], giving up once `deadline` passes.
    ///
    /// The configured timeout still applies when it elapses before `deadline`.
    ///
    /// # Errors
    ///
    /// If the frames cannot be read as numeric data, the deadline passes, or the remote write fails for any other
    /// reason than a duplicate sample, an error is returned.
    pub async fn write_until(
        &self, deadline: Instant, name: &str, timestamp: DateTime<Utc>, frames: &[Frame], extra_labels: &Labels,
    ) -> Result<(), Error> {
        let points = extract_points(name, timestamp, frames, extra_labels).context(Extraction)?;
        let request = to_write_request(&points);

        debug!(metric = name, series = request.timeseries.len(), "Writing time series to remote store.");

        let result = self.client.store_until(&request, deadline).await;
        match self.classifier.classify(result).context(RemoteWrite)? {
            WriteOutcome::Written => {}
            WriteOutcome::ToleratedDuplicate { signature } => {
                trace!(
                    metric = name,
                    signature = signature.pattern(),
                    "Remote store already holds samples at this timestamp. Ignoring rejection."
                );
            }
        }

        Ok(())
    }
}

/// Encodes points as a remote-write request.
///
/// Each point becomes one time series with a single sample. Its labels start with `__name__`, followed by the point
/// labels in order.
pub fn to_write_request(points: &[Point]) -> WriteRequest {
    let timeseries = points
        .iter()
        .map(|point| {
            let mut labels = Vec::with_capacity(point.labels.len() + 1);
            labels.push(Label {
                name: METRIC_NAME_LABEL.to_string(),
                value: point.name.clone(),
            });
            labels.extend(point.labels.iter().map(|(name, value)| Label {
                name: name.to_string(),
                value: value.to_string(),
            }));

            TimeSeries {
                labels,
                samples: vec![Sample {
                    value: point.metric.value,
                    timestamp: point.metric.timestamp.timestamp_millis(),
                }],
            }
        })
        .collect();

    WriteRequest { timeseries }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use bytes::Bytes;
    use chrono::TimeZone as _;
    use http::{header, Request, Response, StatusCode};
    use prost::Message as _;
    use scribe_error::{generic_error, GenericError};
    use scribe_frame::{Field, FrameKind};
    use scribe_io::net::{util::FixedBody, BasicAuth, Transport as HttpTransport};
    use tower::BoxError;

    use super::*;
    use crate::{
        classifier::{DuplicateSignature, SignatureKind},
        ConfigError, ExtractionError, WriteError,
    };

    const ENDPOINT: &str = "http://mimir.local/api/v1/push";

    /// Records the options each transport was built with, and the requests sent through it.
    #[derive(Clone)]
    struct MockProvider {
        status: StatusCode,
        body: &'static str,
        delay: Option<Duration>,
        options: Arc<Mutex<Vec<TransportOptions>>>,
        requests: Arc<Mutex<Vec<Request<FixedBody>>>>,
    }

    impl MockProvider {
        fn responding(status: StatusCode, body: &'static str) -> Self {
            Self {
                status,
                body,
                delay: None,
                options: Arc::default(),
                requests: Arc::default(),
            }
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn transports_built(&self) -> usize {
            self.options.lock().unwrap().len()
        }

        fn sent(&self) -> Vec<WriteRequest> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|request| {
                    let decompressed = snap::raw::Decoder::new()
                        .decompress_vec(request.body().as_bytes())
                        .unwrap();
                    WriteRequest::decode(decompressed.as_slice()).unwrap()
                })
                .collect()
        }
    }

    impl TransportProvider for MockProvider {
        fn get_transport(&self, options: TransportOptions) -> Result<HttpTransport, GenericError> {
            self.options.lock().unwrap().push(options);

            let (status, body, delay) = (self.status, self.body, self.delay);
            let requests = Arc::clone(&self.requests);
            Ok(HttpTransport::new(tower::service_fn(move |req: Request<FixedBody>| {
                requests.lock().unwrap().push(req);
                async move {
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                    let mut response = Response::new(Bytes::from_static(body.as_bytes()));
                    *response.status_mut() = status;
                    Ok::<_, BoxError>(response)
                }
            })))
        }
    }

    fn ts() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn host_frames() -> Vec<Frame> {
        ["a", "b"]
            .into_iter()
            .map(|host| {
                Frame::new(host)
                    .with_kind(FrameKind::NumericMulti)
                    .with_field(Field::float64("Value", Labels::from([("host", host)]), vec![Some(0.5)]))
            })
            .collect()
    }

    fn writer(provider: &MockProvider) -> RemoteWriter {
        RemoteWriter::new(&WriterConfig::new(ENDPOINT), provider).unwrap()
    }

    fn label_pairs(series: &TimeSeries) -> Vec<(&str, &str)> {
        series
            .labels
            .iter()
            .map(|label| (label.name.as_str(), label.value.as_str()))
            .collect()
    }

    #[tokio::test]
    async fn writes_one_series_per_point() {
        let provider = MockProvider::responding(StatusCode::NO_CONTENT, "");
        let writer = writer(&provider);

        writer
            .write("cpu_usage", ts(), &host_frames(), &Labels::from([("env", "prod")]))
            .await
            .unwrap();

        let sent = provider.sent();
        assert_eq!(sent.len(), 1);

        let timeseries = &sent[0].timeseries;
        similar_asserts::assert_eq!(
            timeseries.iter().map(label_pairs).collect::<Vec<_>>(),
            vec![
                vec![("__name__", "cpu_usage"), ("host", "a"), ("env", "prod")],
                vec![("__name__", "cpu_usage"), ("host", "b"), ("env", "prod")],
            ]
        );
        for series in timeseries {
            assert_eq!(
                series.samples,
                vec![Sample {
                    value: 0.5,
                    timestamp: 1_700_000_000_000
                }]
            );
        }

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests[0].uri(), ENDPOINT);
        assert_eq!(requests[0].headers()[header::USER_AGENT], "scribe-recording-rule");
    }

    #[tokio::test]
    async fn null_values_are_sent_as_nan() {
        let provider = MockProvider::responding(StatusCode::OK, "");
        let frames = vec![Frame::new("A").with_field(Field::float64("Value", Labels::new(), vec![None]))];

        writer(&provider).write("up", ts(), &frames, &Labels::new()).await.unwrap();

        let sent = provider.sent();
        assert!(sent[0].timeseries[0].samples[0].value.is_nan());
    }

    #[tokio::test]
    async fn empty_result_sends_empty_request() {
        let provider = MockProvider::responding(StatusCode::OK, "");

        writer(&provider).write("up", ts(), &[], &Labels::new()).await.unwrap();

        let sent = provider.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].timeseries.is_empty());
    }

    #[tokio::test]
    async fn mimir_duplicate_is_success() {
        let provider = MockProvider::responding(
            StatusCode::BAD_REQUEST,
            "the sample has been rejected because another sample with the same timestamp, but a different value, has already been ingested (err-mimir-sample-duplicate-timestamp)",
        );

        let result = writer(&provider)
            .write("cpu_usage", ts(), &host_frames(), &Labels::new())
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn unrelated_bad_request_is_an_error() {
        let provider = MockProvider::responding(StatusCode::BAD_REQUEST, "out of order sample");

        let err = writer(&provider)
            .write("cpu_usage", ts(), &host_frames(), &Labels::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::RemoteWrite {
                source: WriteError::Status { status, .. }
            } if status == StatusCode::BAD_REQUEST
        ));
        assert!(err.to_string().starts_with("failed to write time series: "));
    }

    #[tokio::test]
    async fn server_error_is_an_error_regardless_of_body() {
        let provider =
            MockProvider::responding(StatusCode::INTERNAL_SERVER_ERROR, "err-mimir-sample-duplicate-timestamp");

        let err = writer(&provider)
            .write("cpu_usage", ts(), &host_frames(), &Labels::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteWrite { .. }));
    }

    #[tokio::test]
    async fn custom_classifier() {
        let provider = MockProvider::responding(StatusCode::BAD_REQUEST, "sample already exists");
        let classifier = DuplicateSampleClassifier::default()
            .with_signature(DuplicateSignature::new("sample already exists", SignatureKind::BestEffort));

        writer(&provider)
            .with_classifier(classifier)
            .write("cpu_usage", ts(), &host_frames(), &Labels::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn malformed_frames_skip_the_write() {
        let provider = MockProvider::responding(StatusCode::OK, "");
        let frames = vec![Frame::new("A").with_field(Field::time("time", vec![Some(ts())]))];

        let err = writer(&provider)
            .write("cpu_usage", ts(), &frames, &Labels::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Extraction {
                source: ExtractionError::Collection { .. }
            }
        ));
        assert!(provider.sent().is_empty());
    }

    #[test]
    fn username_without_password_is_rejected_before_transport() {
        let provider = MockProvider::responding(StatusCode::OK, "");
        let config = WriterConfig::new(ENDPOINT).with_basic_auth("user", "");

        let result = RemoteWriter::new(&config, &provider);
        assert!(matches!(
            result,
            Err(Error::Config {
                source: ConfigError::MissingPassword
            })
        ));
        assert_eq!(provider.transports_built(), 0);
    }

    #[test]
    fn timeout_must_be_positive() {
        let provider = MockProvider::responding(StatusCode::OK, "");

        let result = RemoteWriter::new(&WriterConfig::new(ENDPOINT).with_timeout_secs(0), &provider);
        assert!(matches!(
            result,
            Err(Error::Config {
                source: ConfigError::NonPositiveTimeout
            })
        ));
        assert_eq!(provider.transports_built(), 0);

        assert!(RemoteWriter::new(&WriterConfig::new(ENDPOINT).with_timeout_secs(1), &provider).is_ok());
        assert_eq!(provider.transports_built(), 1);
    }

    #[test]
    fn invalid_url_is_rejected_before_transport() {
        let provider = MockProvider::responding(StatusCode::OK, "");

        let result = RemoteWriter::new(&WriterConfig::new("mimir.local:9009/push"), &provider);
        assert!(matches!(
            result,
            Err(Error::Config {
                source: ConfigError::InvalidUrl { .. }
            })
        ));
        assert_eq!(provider.transports_built(), 0);
    }

    #[test]
    fn transport_options_carry_auth_and_headers() {
        let provider = MockProvider::responding(StatusCode::OK, "");
        let config = WriterConfig::new(ENDPOINT)
            .with_basic_auth("user", "secret")
            .with_custom_header("X-Scope-OrgID", "tenant-1");

        RemoteWriter::new(&config, &provider).unwrap();

        let options = provider.options.lock().unwrap();
        assert_eq!(options[0].basic_auth, Some(BasicAuth::new("user", "secret")));
        assert_eq!(options[0].headers["x-scope-orgid"], "tenant-1");
    }

    #[test]
    fn no_credentials_without_username() {
        let provider = MockProvider::responding(StatusCode::OK, "");

        RemoteWriter::new(&WriterConfig::new(ENDPOINT), &provider).unwrap();

        assert!(provider.options.lock().unwrap()[0].basic_auth.is_none());
    }

    #[test]
    fn transport_failures_are_reported() {
        let provider = |_: TransportOptions| -> Result<HttpTransport, GenericError> {
            Err(generic_error!("no route to host"))
        };

        let result = RemoteWriter::new(&WriterConfig::new(ENDPOINT), &provider);
        assert!(matches!(result, Err(Error::Transport { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_times_out() {
        let provider = MockProvider::responding(StatusCode::OK, "").delayed(Duration::from_secs(60));
        let writer = RemoteWriter::new(&WriterConfig::new(ENDPOINT).with_timeout_secs(5), &provider).unwrap();

        let err = writer
            .write("cpu_usage", ts(), &host_frames(), &Labels::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::RemoteWrite {
                source: WriteError::Timeout
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_deadline() {
        let provider = MockProvider::responding(StatusCode::OK, "").delayed(Duration::from_secs(2));
        let writer = writer(&provider);

        let deadline = Instant::now() + Duration::from_secs(1);
        let err = writer
            .write_until(deadline, "cpu_usage", ts(), &host_frames(), &Labels::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::RemoteWrite {
                source: WriteError::Timeout
            }
        ));
    }

    #[test]
    fn writer_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RemoteWriter>();
    }

    #[tokio::test]
    async fn concurrent_writes_share_one_writer() {
        let provider = MockProvider::responding(StatusCode::OK, "");
        let writer = Arc::new(writer(&provider));

        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let writer = Arc::clone(&writer);
                tokio::spawn(async move {
                    let extra = Labels::from([("shard", i.to_string())]);
                    writer.write("cpu_usage", ts(), &host_frames(), &extra).await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(provider.sent().len(), 4);
        assert_eq!(provider.transports_built(), 1);
    }
}
