//! Who is making a request, for the audit trail.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// Audit context of the current request.
///
/// Origin IP is taken from the first `X-Forwarded-For` hop, then
/// `X-Real-IP`, then the socket peer. Unparseable values are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    pub actor_id: Option<String>,
    pub origin_ip: Option<IpAddr>,
    pub user_agent: Option<String>,
}

impl CallerContext {
    pub fn from_headers(headers: &HeaderMap, peer: Option<IpAddr>) -> Self {
        let forwarded = header_str(headers, FORWARDED_FOR_HEADER)
            .and_then(|v| v.split(',').next())
            .and_then(|hop| hop.trim().parse().ok());
        let real_ip = || header_str(headers, REAL_IP_HEADER).and_then(|v| v.trim().parse().ok());

        Self {
            actor_id: header_str(headers, ACTOR_ID_HEADER).map(str::to_owned),
            origin_ip: forwarded.or_else(real_ip).or(peer),
            user_agent: header_str(headers, header::USER_AGENT.as_str()).map(str::to_owned),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(Self::from_headers(&parts.headers, peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn first_forwarded_hop_wins() {
        let ctx = CallerContext::from_headers(
            &headers(&[
                ("x-forwarded-for", "203.0.113.9, 10.0.0.1"),
                ("x-real-ip", "198.51.100.2"),
                ("x-actor-id", "user-7"),
                ("user-agent", "ledger-app/2.1"),
            ]),
            Some("127.0.0.1".parse().unwrap()),
        );
        assert_eq!(ctx.origin_ip, Some("203.0.113.9".parse().unwrap()));
        assert_eq!(ctx.actor_id.as_deref(), Some("user-7"));
        assert_eq!(ctx.user_agent.as_deref(), Some("ledger-app/2.1"));
    }

    #[test]
    fn falls_back_to_real_ip_then_peer() {
        let peer: IpAddr = "127.0.0.1".parse().unwrap();
        let ctx = CallerContext::from_headers(
            &headers(&[("x-forwarded-for", "garbage"), ("x-real-ip", "198.51.100.2")]),
            Some(peer),
        );
        assert_eq!(ctx.origin_ip, Some("198.51.100.2".parse().unwrap()));

        let ctx = CallerContext::from_headers(&HeaderMap::new(), Some(peer));
        assert_eq!(ctx.origin_ip, Some(peer));
        assert!(ctx.actor_id.is_none());
    }

    #[test]
    fn blank_actor_is_none() {
        let ctx = CallerContext::from_headers(&headers(&[("x-actor-id", "  ")]), None);
        assert_eq!(ctx, CallerContext::default());
    }
}
