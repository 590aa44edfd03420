use std::{convert::Infallible, net::IpAddr, net::SocketAddr};

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use forwarded_header_value::ForwardedHeaderValue;

/// Placeholder used when the client address can't be determined. All such
/// requests share one rate limit bucket.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Whether forwarding headers set by a reverse proxy are believed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProxyHeaders {
    Ignore,
    Trust,
}

impl From<bool> for ProxyHeaders {
    fn from(trust: bool) -> Self {
        if trust {
            Self::Trust
        } else {
            Self::Ignore
        }
    }
}

/// The address of the client making a request, as used for rate limiting.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientIp(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    ProxyHeaders: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        Ok(Self(resolve(
            &parts.headers,
            peer,
            ProxyHeaders::from_ref(state),
        )))
    }
}

/// Determine the client address for a request.
///
/// With [`ProxyHeaders::Trust`], the address the nearest proxy reported in a
/// `Forwarded` or `X-Forwarded-For` header wins. Otherwise, or if neither
/// header yields an address, the peer address of the connection is used.
pub fn resolve(headers: &HeaderMap, peer: Option<IpAddr>, proxy_headers: ProxyHeaders) -> String {
    let forwarded = match proxy_headers {
        ProxyHeaders::Trust => forwarded_ip(headers),
        ProxyHeaders::Ignore => None,
    };

    forwarded
        .or(peer)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_owned())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let from_forwarded = headers
        .get("forwarded")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| ForwardedHeaderValue::from_forwarded(value).ok())
        .and_then(|value| value.proximate_forwarded_for_ip());

    from_forwarded.or_else(|| {
        headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| ForwardedHeaderValue::from_x_forwarded_for(value).ok())
            .and_then(|value| value.proximate_forwarded_for_ip())
    })
}
