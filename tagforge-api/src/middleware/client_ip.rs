//! Client identification for per-client limits.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderMap;

/// Identifier used when neither the socket nor trusted headers name a peer.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Whether proxy headers may identify the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientIpPolicy {
    pub trust_proxy_headers: bool,
}

/// Resolve the client address.
///
/// With `trust_proxy` set, the first `X-Forwarded-For` entry wins, then
/// `X-Real-IP`. Otherwise only the socket peer counts, so a client cannot
/// dodge its quota by forging headers.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> Option<IpAddr> {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|first| first.trim().parse().ok());
        if forwarded.is_some() {
            return forwarded;
        }

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok());
        if real_ip.is_some() {
            return real_ip;
        }
    }

    peer.map(|addr| addr.ip())
}

/// Client address as a quota key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddress(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for ClientAddress
where
    S: Send + Sync,
    ClientIpPolicy: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let policy = ClientIpPolicy::from_ref(state);
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        let id = client_ip(&parts.headers, peer, policy.trust_proxy_headers)
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
        Ok(ClientAddress(id))
    }
}
