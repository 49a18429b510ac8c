//! Request inspection helpers.

use axum::extract::{ConnectInfo, MatchedPath, Request};
use axum::http::HeaderName;
use std::net::SocketAddr;

/// Response header carrying the generated request id.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Label value used for requests that matched no route.
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Route template used as the metrics `path` label.
///
/// Never the raw URI path, so user input cannot create new series.
pub fn route_label(request: &Request) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string())
}

/// Peer address, when the server was started with connect info.
pub fn client_addr(request: &Request) -> Option<String> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_unmatched_without_route() {
        let request = Request::builder().uri("/x/../y").body(Body::empty()).unwrap();
        assert_eq!(route_label(&request), UNMATCHED_ROUTE);
        assert_eq!(client_addr(&request), None);
    }

    #[test]
    fn test_client_addr_from_connect_info() {
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let addr: SocketAddr = "10.0.0.7:41000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(client_addr(&request).as_deref(), Some("10.0.0.7:41000"));
    }
}
