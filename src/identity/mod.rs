use actix_web::dev::ServiceRequest;
use actix_web::http::header::HeaderName;
use actix_web::{HttpResponse, ResponseError};
use once_cell::sync::Lazy;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;

/// Proxy headers consulted for the client address, in trust order.
static FORWARDED_HEADERS: Lazy<[HeaderName; 2]> = Lazy::new(|| {
    [
        HeaderName::from_static("x-forwarded-for"),
        HeaderName::from_static("x-real-ip"),
    ]
});

const FALLBACK_IP: &str = "127.0.0.1";

/// The subject a quota counter is bucketed under.
///
/// This is a closed set: either an authenticated user id, or a client IP
/// string for unauthenticated traffic. Distinct identities never share a
/// counter, because each renders to a distinct key component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    User(u64),
    Ip(String),
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::User(id) => write!(f, "user_{id}"),
            Identity::Ip(addr) => write!(f, "ip_{addr}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    /// An authenticated-required input function could not resolve a user.
    #[error("No authenticated user available for rate limiting")]
    NoAuthenticatedUser,
}

impl ResponseError for IdentityError {
    fn error_response(&self) -> HttpResponse {
        match self {
            IdentityError::NoAuthenticatedUser => HttpResponse::Unauthorized().finish(),
        }
    }
}

/// Resolves a client IP string for the request. This never fails: when no
/// usable address can be found it falls back to `"127.0.0.1"`.
///
/// `X-Forwarded-For` (left-most entry) is consulted first, then `X-Real-IP`;
/// a header value is only trusted when it parses as a public IP address.
/// Otherwise the raw connection peer address is used.
///
/// # Security
///
/// Forwarding headers are client-supplied and spoofable unless your
/// application is deployed behind a proxy you control that strips or
/// overwrites them. When clients connect directly, only the peer address can
/// be relied on.
///
/// # IPv6
///
/// IPv6 addresses will be grouped into a single key per /64
pub fn client_ip(req: &ServiceRequest) -> String {
    for header in FORWARDED_HEADERS.iter() {
        if let Some(value) = req.headers().get(header) {
            if let Some(ip) = forwarded_ip(value.to_str().unwrap_or_default()) {
                return ip_key(ip);
            }
        }
    }
    req.peer_addr()
        .map(|addr| ip_key(addr.ip()))
        .unwrap_or_else(|| FALLBACK_IP.to_string())
}

// Takes the left-most (original client) entry of a forwarding header and
// accepts it only if it is a well-formed public address.
fn forwarded_ip(value: &str) -> Option<IpAddr> {
    let first = value.split(',').next()?.trim();
    let ip = first.parse::<IpAddr>().ok()?;
    is_public_ip(&ip).then_some(ip)
}

fn is_public_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = to_ipv4_mapped(v6) {
                return is_public_ip(&IpAddr::V4(v4));
            }
            // fc00::/7 is the unique-local range.
            !(v6.is_loopback() || v6.is_unspecified() || (v6.segments()[0] & 0xfe00) == 0xfc00)
        }
    }
}

fn to_ipv4_mapped(v6: &Ipv6Addr) -> Option<Ipv4Addr> {
    match v6.octets() {
        [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff, a, b, c, d] => Some(Ipv4Addr::new(a, b, c, d)),
        _ => None,
    }
}

// Groups IPv6 addresses together, see:
// https://adam-p.ca/blog/2022/02/ipv6-rate-limiting/
// https://support.cloudflare.com/hc/en-us/articles/115001635128-Configuring-Cloudflare-Rate-Limiting
fn ip_key(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => {
            if let Some(v4) = to_ipv4_mapped(&v6) {
                return v4.to_string();
            }
            let zeroes = [0u16; 4];
            let concat = [&v6.segments()[0..4], &zeroes].concat();
            let concat: [u16; 8] = concat.try_into().unwrap();
            let subnet = Ipv6Addr::from(concat);
            format!("{}/64", subnet)
        }
    }
}
