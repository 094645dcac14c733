//! Basic HTTP client.

mod client;
pub use self::client::{HttpClient, HttpClientBuilder};

mod conn;
pub use self::conn::{HttpsCapableConnector, HttpsCapableConnectorBuilder};
