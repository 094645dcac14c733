//! Request middleware, applied with `ServiceBuilder::map_request`.

use headers::{authorization::Basic, Authorization, HeaderMapExt as _};
use http::{HeaderMap, Request};

use crate::net::BasicAuth;

/// Builds a middleware function that applies the given headers, and basic auth credentials if any, to every request.
///
/// Configured headers replace any header of the same name already present on the request. A header configured with
/// several values is sent with all of them.
pub fn with_default_headers<B>(
    headers: HeaderMap, basic_auth: Option<BasicAuth>,
) -> impl Fn(Request<B>) -> Request<B> + Clone + Send + Sync {
    let authorization: Option<Authorization<Basic>> =
        basic_auth.map(|auth| Authorization::basic(auth.username(), auth.password()));

    move |mut request| {
        let request_headers = request.headers_mut();
        for name in headers.keys() {
            request_headers.remove(name);
            for value in headers.get_all(name) {
                request_headers.append(name.clone(), value.clone());
            }
        }

        if let Some(authorization) = &authorization {
            request_headers.typed_insert(authorization.clone());
        }

        request
    }
}
