//! Visitor attributes from edge-supplied headers
//!
//! Missing or garbled attributes never reject a request. They fall back to
//! fixed buckets so the endpoint stays available.

use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};
use tracing::debug;

use crate::config::HeaderNames;
use crate::fingerprint::UNKNOWN;
use crate::models::{normalize_country, DeviceClass};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitorAttributes {
    pub address: String,
    pub user_agent: String,
    pub country: String,
    pub device: DeviceClass,
}

impl VisitorAttributes {
    pub fn from_headers(headers: &HeaderMap, names: &HeaderNames) -> Self {
        let raw_address = header_str(headers, &names.address);
        let address = raw_address
            .map(normalize_address)
            .unwrap_or_else(|| UNKNOWN.to_string());

        let user_agent = header_str(headers, &names.user_agent)
            .filter(|ua| !ua.trim().is_empty())
            .unwrap_or(UNKNOWN)
            .to_string();

        let raw_country = header_str(headers, &names.country);
        let country = normalize_country(raw_country);

        let device = DeviceClass::from_signals(
            is_true(headers, &names.mobile),
            is_true(headers, &names.tablet),
        );

        if raw_address.is_none() || raw_country.is_none() {
            debug!(
                has_address = raw_address.is_some(),
                has_country = raw_country.is_some(),
                "viewer headers incomplete, using fallback buckets"
            );
        }

        Self {
            address,
            user_agent,
            country,
            device,
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|h| h.to_str().ok())
}

fn is_true(headers: &HeaderMap, name: &str) -> bool {
    header_str(headers, name)
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Reduce a viewer address to the bare IP.
///
/// The edge reports `ip:port`, with IPv6 addresses unbracketed
/// (`2001:db8:0:0:0:0:0:1:443`). Keeping the ephemeral port would make every
/// connection a new visitor. A value that already parses as an IP is kept
/// whole, so `2001:db8::5:6` is never read as `2001:db8::5` plus a port.
fn normalize_address(raw: &str) -> String {
    let raw = raw.trim();

    if let Ok(socket) = raw.parse::<SocketAddr>() {
        return socket.ip().to_string();
    }

    if let Ok(ip) = raw.parse::<IpAddr>() {
        return ip.to_string();
    }

    if let Some((host, port)) = raw.rsplit_once(':') {
        if port.parse::<u16>().is_ok() {
            if let Ok(ip) = host.parse::<IpAddr>() {
                return ip.to_string();
            }
        }
    }

    if raw.is_empty() {
        UNKNOWN.to_string()
    } else {
        raw.to_string()
    }
}
