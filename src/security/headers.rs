//! Header manipulation.
//!
//! # Responsibilities
//! - Derive the rate-limiting client key (X-Forwarded-For, else peer address)
//! - Strip hop-by-hop headers in both directions
//! - Append the peer to X-Forwarded-For on the way upstream
//!
//! # Design Decisions
//! - Only the first X-Forwarded-For segment identifies the client
//! - Host is dropped so the upstream sees its own authority

use std::net::SocketAddr;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

/// Identify the calling client.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(client), _) => client.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove(header::UPGRADE);
}

/// Headers for the upstream copy of an inbound request.
pub fn outbound_headers(inbound: &HeaderMap, peer: Option<SocketAddr>, credential_header: Option<&str>) -> HeaderMap {
    let mut headers = inbound.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
    if let Some(name) = credential_header {
        headers.remove(name);
    }

    if let Some(addr) = peer {
        let ip = addr.ip().to_string();
        let value = match inbound.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) => format!("{existing}, {ip}"),
            None => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> Option<SocketAddr> {
        Some("192.0.2.7:51000".parse().unwrap())
    }

    #[test]
    fn client_key_prefers_first_forwarded_segment() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static(" 203.0.113.9 , 10.0.0.1"));
        assert_eq!(client_key(&headers, peer()), "203.0.113.9");
    }

    #[test]
    fn client_key_falls_back_to_peer_ip() {
        assert_eq!(client_key(&HeaderMap::new(), peer()), "192.0.2.7");
        assert_eq!(client_key(&HeaderMap::new(), None), "unknown");

        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static(""));
        assert_eq!(client_key(&headers, peer()), "192.0.2.7");
    }

    #[test]
    fn outbound_headers_are_sanitized() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, HeaderValue::from_static("gateway.local"));
        inbound.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-private"));
        inbound.insert("x-private", HeaderValue::from_static("1"));
        inbound.insert("x-api-key", HeaderValue::from_static("secret"));
        inbound.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        inbound.insert(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.9"));

        let out = outbound_headers(&inbound, peer(), Some("X-API-Key"));

        assert!(out.get(header::HOST).is_none());
        assert!(out.get(header::CONNECTION).is_none());
        assert!(out.get("x-private").is_none());
        assert!(out.get("x-api-key").is_none());
        assert_eq!(out[header::ACCEPT], "application/json");
        assert_eq!(out[X_FORWARDED_FOR], "203.0.113.9, 192.0.2.7");
    }
}
