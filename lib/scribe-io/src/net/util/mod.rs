mod http;
pub use self::http::FixedBody;

pub mod middleware;
