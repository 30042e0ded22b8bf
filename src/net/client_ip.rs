//! Client address resolution.
//!
//! # Responsibilities
//! - Classify addresses as private/special-purpose or public
//! - Pick the address just before our own proxy hop from forwarding headers
//! - Fall back to the peer address when no header yields a public address
//!
//! # Design Decisions
//! - Headers are walked right to left: the rightmost public entry was appended
//!   by the closest trusted proxy, entries further left are client-controlled
//! - Non-public results are reported as "unknown" rather than leaked

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use axum::http::HeaderMap;

/// Headers consulted when none are configured, in order.
pub const DEFAULT_HEADERS: &[&str] = &[
    "X-Forwarded-For",
    "X-Real-Ip",
    "Http-Forwarded-For",
    "Http-Forwarded",
    "Http-X-Cluster-Client-Ip",
    "Http-X-Forwarded-For",
    "Http-X-Forwarded",
    "Http-Client-Ip",
];

// IANA special-purpose IPv4 ranges, inclusive.
const PRIVATE_V4: &[(Ipv4Addr, Ipv4Addr)] = &[
    (Ipv4Addr::new(0, 0, 0, 0), Ipv4Addr::new(0, 255, 255, 255)),
    (Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(10, 255, 255, 255)),
    (Ipv4Addr::new(100, 64, 0, 0), Ipv4Addr::new(100, 127, 255, 255)),
    (Ipv4Addr::new(127, 0, 0, 0), Ipv4Addr::new(127, 255, 255, 255)),
    (Ipv4Addr::new(169, 254, 0, 0), Ipv4Addr::new(169, 254, 255, 255)),
    (Ipv4Addr::new(172, 16, 0, 0), Ipv4Addr::new(172, 31, 255, 255)),
    (Ipv4Addr::new(192, 0, 0, 0), Ipv4Addr::new(192, 0, 0, 255)),
    (Ipv4Addr::new(192, 0, 2, 0), Ipv4Addr::new(192, 0, 2, 255)),
    (Ipv4Addr::new(192, 88, 99, 0), Ipv4Addr::new(192, 88, 99, 255)),
    (Ipv4Addr::new(192, 168, 0, 0), Ipv4Addr::new(192, 168, 255, 255)),
    (Ipv4Addr::new(198, 18, 0, 0), Ipv4Addr::new(198, 19, 255, 255)),
    (Ipv4Addr::new(198, 51, 100, 0), Ipv4Addr::new(198, 51, 100, 255)),
    (Ipv4Addr::new(203, 0, 113, 0), Ipv4Addr::new(203, 0, 113, 255)),
    (Ipv4Addr::new(224, 0, 0, 0), Ipv4Addr::new(239, 255, 255, 255)),
    (Ipv4Addr::new(240, 0, 0, 0), Ipv4Addr::new(255, 255, 255, 255)),
];

// IANA special-purpose IPv6 ranges, inclusive.
const PRIVATE_V6: &[(Ipv6Addr, Ipv6Addr)] = &[
    (Ipv6Addr::UNSPECIFIED, Ipv6Addr::UNSPECIFIED),
    (Ipv6Addr::LOCALHOST, Ipv6Addr::LOCALHOST),
    // IPv4-mapped
    (
        Ipv6Addr::new(0, 0, 0, 0, 0, 0xffff, 0, 0),
        Ipv6Addr::new(0, 0, 0, 0, 0, 0xffff, 0xffff, 0xffff),
    ),
    // IPv4-translated
    (
        Ipv6Addr::new(0, 0, 0, 0, 0xffff, 0, 0, 0),
        Ipv6Addr::new(0, 0, 0, 0, 0xffff, 0, 0xffff, 0xffff),
    ),
    (
        Ipv6Addr::new(0x64, 0xff9b, 0, 0, 0, 0, 0, 0),
        Ipv6Addr::new(0x64, 0xff9b, 0, 0, 0, 0, 0xffff, 0xffff),
    ),
    (
        Ipv6Addr::new(0x64, 0xff9b, 1, 0, 0, 0, 0, 0),
        Ipv6Addr::new(0x64, 0xff9b, 1, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff),
    ),
    (
        Ipv6Addr::new(0x100, 0, 0, 0, 0, 0, 0, 0),
        Ipv6Addr::new(0x100, 0, 0, 0, 0xffff, 0xffff, 0xffff, 0xffff),
    ),
    (
        Ipv6Addr::new(0x2001, 0, 0, 0, 0, 0, 0, 0),
        Ipv6Addr::new(0x2001, 0, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff),
    ),
    (
        Ipv6Addr::new(0x2001, 0x20, 0, 0, 0, 0, 0, 0),
        Ipv6Addr::new(0x2001, 0x2f, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff),
    ),
    (
        Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0),
        Ipv6Addr::new(0x2001, 0xdb8, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff),
    ),
    (
        Ipv6Addr::new(0x2002, 0, 0, 0, 0, 0, 0, 0),
        Ipv6Addr::new(0x2002, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff),
    ),
    (
        Ipv6Addr::new(0x3fff, 0, 0, 0, 0, 0, 0, 0),
        Ipv6Addr::new(0x3fff, 0x0fff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff),
    ),
    (
        Ipv6Addr::new(0x5f00, 0, 0, 0, 0, 0, 0, 0),
        Ipv6Addr::new(0x5f00, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff),
    ),
    (
        Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 0),
        Ipv6Addr::new(0xfdff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff),
    ),
    (
        Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0),
        Ipv6Addr::new(0xfe80, 0, 0, 0, 0xffff, 0xffff, 0xffff, 0xffff),
    ),
    (
        Ipv6Addr::new(0xff00, 0, 0, 0, 0, 0, 0, 0),
        Ipv6Addr::new(0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff),
    ),
];

/// Whether `ip` falls in a private or otherwise special-purpose range.
pub fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let n = u32::from(v4);
            PRIVATE_V4
                .iter()
                .any(|(start, end)| n >= u32::from(*start) && n <= u32::from(*end))
        }
        IpAddr::V6(v6) => {
            let n = u128::from(v6);
            PRIVATE_V6
                .iter()
                .any(|(start, end)| n >= u128::from(*start) && n <= u128::from(*end))
        }
    }
}

/// Unicast and not unspecified, loopback, multicast, link-local or broadcast.
pub fn is_global_unicast(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_unspecified()
                || v4.is_loopback()
                || v4.is_multicast()
                || v4.is_link_local()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => {
            // fe80::/10
            let link_local = (v6.segments()[0] & 0xffc0) == 0xfe80;
            !(v6.is_unspecified() || v6.is_loopback() || v6.is_multicast() || link_local)
        }
    }
}

/// Public, routable address.
pub fn is_public(ip: IpAddr) -> bool {
    is_global_unicast(ip) && !is_private(ip)
}

/// Parse a comma separated header list (e.g. `http.real_ip_headers`).
pub fn parse_header_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve the client address.
///
/// Each header in `check_headers` (or [`DEFAULT_HEADERS`] when empty) is walked
/// right to left and the first public address wins. Otherwise the peer address
/// is used if it is public. `None` when nothing public was found.
pub fn client_ip<S: AsRef<str>>(
    headers: &HeaderMap,
    check_headers: &[S],
    remote: Option<SocketAddr>,
) -> Option<IpAddr> {
    let from_headers = if check_headers.is_empty() {
        first_public(headers, DEFAULT_HEADERS.iter().copied())
    } else {
        first_public(headers, check_headers.iter().map(AsRef::as_ref))
    };

    from_headers.or_else(|| remote.map(|addr| addr.ip()).filter(|ip| is_public(*ip)))
}

fn first_public<'a>(headers: &HeaderMap, names: impl Iterator<Item = &'a str>) -> Option<IpAddr> {
    for name in names {
        let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) else {
            continue;
        };
        let found = value
            .rsplit(',')
            .filter_map(|entry| entry.trim().parse::<IpAddr>().ok())
            .find(|ip| is_public(*ip));
        if found.is_some() {
            return found;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_private_ranges() {
        for addr in [
            "10.1.2.3",
            "127.0.0.1",
            "172.20.0.1",
            "192.168.1.1",
            "100.64.0.1",
            "198.51.100.7",
            "255.255.255.255",
            "::1",
            "fd00::1",
            "2001:db8::1",
            "::ffff:10.0.0.1",
        ] {
            assert!(is_private(ip(addr)), "{} should be private", addr);
        }
        for addr in ["8.8.8.8", "1.1.1.1", "172.32.0.1", "2606:4700::1111"] {
            assert!(!is_private(ip(addr)), "{} should be public", addr);
        }
    }

    #[test]
    fn test_global_unicast() {
        assert!(is_global_unicast(ip("8.8.8.8")));
        assert!(is_global_unicast(ip("10.0.0.1")));
        assert!(!is_global_unicast(ip("0.0.0.0")));
        assert!(!is_global_unicast(ip("224.0.0.1")));
        assert!(!is_global_unicast(ip("fe80::1")));
    }

    #[test]
    fn test_rightmost_public_wins() {
        let map = headers(&[("x-forwarded-for", "203.0.113.9, 8.8.8.8, 1.1.1.1, 10.0.0.2")]);
        let none: [&str; 0] = [];
        assert_eq!(client_ip(&map, &none, None), Some(ip("1.1.1.1")));
    }

    #[test]
    fn test_header_order_respected() {
        let map = headers(&[("x-real-ip", "9.9.9.9"), ("x-custom-ip", "8.8.4.4")]);
        assert_eq!(client_ip(&map, &["X-Custom-Ip", "X-Real-Ip"], None), Some(ip("8.8.4.4")));
    }

    #[test]
    fn test_garbage_entries_skipped() {
        let map = headers(&[("x-forwarded-for", "8.8.8.8, not-an-ip, ")]);
        let none: [&str; 0] = [];
        assert_eq!(client_ip(&map, &none, None), Some(ip("8.8.8.8")));
    }

    #[test]
    fn test_remote_fallback() {
        let map = headers(&[("x-forwarded-for", "10.0.0.1")]);
        let none: [&str; 0] = [];
        let public: SocketAddr = "8.8.8.8:4000".parse().unwrap();
        let private: SocketAddr = "127.0.0.1:4000".parse().unwrap();

        assert_eq!(client_ip(&map, &none, Some(public)), Some(ip("8.8.8.8")));
        assert_eq!(client_ip(&map, &none, Some(private)), None);
        assert_eq!(client_ip(&map, &none, None), None);
    }

    #[test]
    fn test_parse_header_list() {
        assert_eq!(
            parse_header_list(" X-Real-Ip , ,CF-Connecting-IP"),
            vec!["X-Real-Ip".to_string(), "CF-Connecting-IP".to_string()]
        );
        assert!(parse_header_list("").is_empty());
    }
}
