pub mod client;

mod transport;
pub use self::transport::{BasicAuth, HttpTransportProvider, Transport, TransportOptions, TransportProvider};

pub mod util;
