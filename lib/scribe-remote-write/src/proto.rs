//! Prometheus remote-write protocol messages.
//!
//! Mirrors the messages of `prompb/remote.proto` and `prompb/types.proto` needed for version 0.1.0 of the protocol.

/// A batch of time series.
#[derive(Clone, PartialEq, prost::Message)]
pub struct WriteRequest {
    /// Time series in this request.
    #[prost(message, repeated, tag = "1")]
    pub timeseries: Vec<TimeSeries>,
}

/// A labeled series and its samples.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TimeSeries {
    /// Series labels, including `__name__`.
    #[prost(message, repeated, tag = "1")]
    pub labels: Vec<Label>,

    /// Samples of the series.
    #[prost(message, repeated, tag = "2")]
    pub samples: Vec<Sample>,
}

/// A label name/value pair.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Label {
    /// Label name.
    #[prost(string, tag = "1")]
    pub name: String,

    /// Label value.
    #[prost(string, tag = "2")]
    pub value: String,
}

/// A single sample.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Sample {
    /// Sample value.
    #[prost(double, tag = "1")]
    pub value: f64,

    /// Sample timestamp, in milliseconds since the Unix epoch.
    #[prost(int64, tag = "2")]
    pub timestamp: i64,
}
