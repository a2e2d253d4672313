//! Client IP resolution.
//!
//! Order: first entry of `X-Forwarded-For`, then `X-Real-IP`, then the
//! peer address of the connection. Values are taken as-is; they are not
//! parsed or validated.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;

/// Resolves the client IP from request headers and the peer address.
pub fn resolve(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    // X-Forwarded-For takes priority (reverse proxy)
    if let Some(xff) = header_value(headers, "x-forwarded-for")
        && let Some(first) = xff.split(',').next().map(str::trim)
        && !first.is_empty()
    {
        return Some(first.to_string());
    }

    if let Some(real_ip) = header_value(headers, "x-real-ip") {
        return Some(real_ip.to_string());
    }

    // Fallback to ConnectInfo (direct connection)
    peer.map(|addr| addr.ip().to_string())
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Extractor yielding the resolved client IP, if any.
pub struct ClientIp(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0);
        Ok(ClientIp(resolve(&parts.headers, peer)))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn peer() -> Option<SocketAddr> {
        Some("192.0.2.7:55000".parse().unwrap())
    }

    #[test]
    fn forwarded_for_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" 203.0.113.9 , 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.1"));
        assert_eq!(resolve(&headers, peer()).as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn real_ip_before_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.1"));
        assert_eq!(resolve(&headers, peer()).as_deref(), Some("198.51.100.1"));
    }

    #[test]
    fn peer_address_fallback() {
        assert_eq!(resolve(&HeaderMap::new(), peer()).as_deref(), Some("192.0.2.7"));
        assert_eq!(resolve(&HeaderMap::new(), None), None);
    }

    #[test]
    fn empty_forwarded_for_is_skipped() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" , 10.0.0.1"));
        assert_eq!(resolve(&headers, peer()).as_deref(), Some("192.0.2.7"));
    }

    #[test]
    fn ipv6_peer() {
        let v6: SocketAddr = "[2001:db8::1]:443".parse().unwrap();
        assert_eq!(resolve(&HeaderMap::new(), Some(v6)).as_deref(), Some("2001:db8::1"));
    }
}
