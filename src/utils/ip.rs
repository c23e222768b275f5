//! Client IP attribution.
//!
//! Decides when forwarded headers can be believed (explicit trusted-proxy
//! list with CIDR support, private-peer auto-detection, Unix socket
//! listeners) and normalizes addresses into rate-limit keys.

use std::net::{IpAddr, SocketAddr};

use actix_web::HttpRequest;
use actix_web::http::header::HeaderMap;
use tracing::debug;

/// Resolves the address a request should be attributed to.
///
/// The peer address wins unless the peer is a proxy we trust, in which case
/// the forwarded headers carry the real client:
/// 1. Unix socket listener: there is no peer address, forwarded headers are
///    the only source.
/// 2. Peer matches the configured `trusted_proxies` list: forwarded headers.
/// 3. No list configured and the peer is private or loopback: assume a local
///    reverse proxy and accept forwarded headers when present.
/// 4. Anything else is a direct public connection; forwarded headers from
///    strangers are spoofable and ignored.
pub fn extract_client_ip(
    req: &HttpRequest,
    trusted_proxies: &[String],
    via_unix_socket: bool,
) -> Option<String> {
    if via_unix_socket {
        return forwarded_client_ip(req.headers());
    }

    let conn = req.connection_info();
    let peer = conn.peer_addr()?;

    if !trusted_proxies.is_empty() {
        return if peer_is_trusted(peer, trusted_proxies) {
            let client = forwarded_client_ip(req.headers()).unwrap_or_else(|| peer.to_string());
            debug!("Peer {} is a trusted proxy, client is {}", peer, client);
            Some(client)
        } else {
            debug!("Peer {} not in trusted_proxies, attributing to peer", peer);
            Some(peer.to_string())
        };
    }

    if let Ok(peer_ip) = peer.parse::<IpAddr>()
        && is_private_or_local(&peer_ip)
        && let Some(client) = forwarded_client_ip(req.headers())
    {
        debug!(
            "Private peer {} with forwarded header, client is {}",
            peer, client
        );
        return Some(client);
    }

    Some(peer.to_string())
}

/// First hop of `X-Forwarded-For`, then `X-Real-IP`.
fn forwarded_client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        let first = forwarded.split(',').next().unwrap_or("").trim();
        if !first.is_empty() {
            return Some(first.to_string());
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
}

fn peer_is_trusted(peer: &str, trusted_proxies: &[String]) -> bool {
    // Peer strings may arrive with or without a port.
    let peer_ip = peer
        .parse::<SocketAddr>()
        .map(|sa| sa.ip())
        .or_else(|_| peer.parse::<IpAddr>());
    let Ok(peer_ip) = peer_ip else {
        return false;
    };

    trusted_proxies.iter().any(|entry| {
        if entry.contains('/') {
            cidr_contains(entry, &peer_ip)
        } else {
            entry.parse::<IpAddr>().is_ok_and(|proxy| proxy == peer_ip)
        }
    })
}

/// True for loopback, RFC1918 IPv4, IPv6 ULA (fc00::/7) and link-local.
pub fn is_private_or_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

fn cidr_contains(cidr: &str, ip: &IpAddr) -> bool {
    let Some((network, prefix)) = cidr.split_once('/') else {
        return false;
    };
    let (Ok(network), Ok(prefix)) = (network.parse::<IpAddr>(), prefix.parse::<u32>()) else {
        return false;
    };

    match (network, ip) {
        (IpAddr::V4(net), IpAddr::V4(ip)) if prefix <= 32 => {
            let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
            ip.to_bits() & mask == net.to_bits() & mask
        }
        (IpAddr::V6(net), IpAddr::V6(ip)) if prefix <= 128 => {
            let mask = u128::MAX.checked_shl(128 - prefix).unwrap_or(0);
            ip.to_bits() & mask == net.to_bits() & mask
        }
        _ => false,
    }
}

/// Normalizes an address into a rate-limit key.
///
/// IPv4 keys on the full address. IPv6 keys on the first four hextets only:
/// a single host usually controls an entire /64, so finer keying would let
/// one client mint fresh buckets per request.
pub fn rate_limit_key(ip: &str) -> String {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => ip.to_string(),
        Ok(IpAddr::V6(v6)) => {
            let seg = v6.segments();
            format!("{:x}:{:x}:{:x}:{:x}", seg[0], seg[1], seg[2], seg[3])
        }
        Err(_) => ip.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn request(peer: &str, headers: &[(&str, &str)]) -> HttpRequest {
        let mut req = TestRequest::default().peer_addr(peer.parse().unwrap());
        for (name, value) in headers {
            req = req.insert_header((name.to_string(), value.to_string()));
        }
        req.to_http_request()
    }

    #[test]
    fn test_public_peer_wins_over_spoofed_header() {
        let req = request("198.51.100.7:443", &[("x-forwarded-for", "1.2.3.4")]);
        assert_eq!(
            extract_client_ip(&req, &[], false).as_deref(),
            Some("198.51.100.7")
        );
    }

    #[test]
    fn test_private_peer_auto_trusts_forwarded_header() {
        let req = request(
            "10.0.0.2:443",
            &[("x-forwarded-for", "203.0.113.7, 10.0.0.2")],
        );
        assert_eq!(
            extract_client_ip(&req, &[], false).as_deref(),
            Some("203.0.113.7")
        );
    }

    #[test]
    fn test_private_peer_without_header_is_the_client() {
        let req = request("192.168.1.9:443", &[]);
        assert_eq!(
            extract_client_ip(&req, &[], false).as_deref(),
            Some("192.168.1.9")
        );
    }

    #[test]
    fn test_explicit_proxy_list_gates_forwarded_headers() {
        let proxies = vec!["203.0.113.0/24".to_string()];

        let via_proxy = request("203.0.113.50:443", &[("x-real-ip", "198.51.100.7")]);
        assert_eq!(
            extract_client_ip(&via_proxy, &proxies, false).as_deref(),
            Some("198.51.100.7")
        );

        // A public peer outside the list keeps its own address even with
        // headers attached.
        let direct = request("8.8.8.8:443", &[("x-real-ip", "198.51.100.7")]);
        assert_eq!(
            extract_client_ip(&direct, &proxies, false).as_deref(),
            Some("8.8.8.8")
        );
    }

    #[test]
    fn test_unix_socket_reads_headers_only() {
        let req = TestRequest::default()
            .insert_header(("x-real-ip", "203.0.113.7"))
            .to_http_request();
        assert_eq!(
            extract_client_ip(&req, &[], true).as_deref(),
            Some("203.0.113.7")
        );
        assert_eq!(
            extract_client_ip(&TestRequest::default().to_http_request(), &[], true),
            None
        );
    }

    #[test]
    fn test_private_ranges() {
        for private in ["10.0.0.1", "172.16.0.1", "192.168.1.1", "127.0.0.1", "fd00::1", "fe80::1"]
        {
            assert!(is_private_or_local(&private.parse().unwrap()), "{private}");
        }
        for public in ["8.8.8.8", "203.0.113.7", "2001:4860:4860::8888"] {
            assert!(!is_private_or_local(&public.parse().unwrap()), "{public}");
        }
    }

    #[test]
    fn test_cidr_matching() {
        let ip: IpAddr = "192.168.1.100".parse().unwrap();
        assert!(cidr_contains("192.168.1.0/24", &ip));
        assert!(cidr_contains("192.168.0.0/16", &ip));
        assert!(!cidr_contains("192.168.2.0/24", &ip));

        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        assert!(cidr_contains("2001:db8::/32", &v6));
        assert!(!cidr_contains("2001:db9::/32", &v6));

        // Families never match each other, malformed entries never match.
        assert!(!cidr_contains("2001:db8::/32", &ip));
        assert!(!cidr_contains("not-a-cidr", &ip));
        assert!(!cidr_contains("192.168.1.0/99", &ip));
    }

    #[test]
    fn test_proxy_entries_accept_ips_and_ranges() {
        let proxies = vec!["127.0.0.1".to_string(), "192.168.1.0/24".to_string()];
        assert!(peer_is_trusted("127.0.0.1", &proxies));
        assert!(peer_is_trusted("127.0.0.1:8080", &proxies));
        assert!(peer_is_trusted("192.168.1.50", &proxies));
        assert!(!peer_is_trusted("192.168.2.1", &proxies));
        assert!(!peer_is_trusted("garbage", &proxies));
    }

    #[test]
    fn test_rate_limit_key_ipv4_full() {
        assert_eq!(rate_limit_key("203.0.113.7"), "203.0.113.7");
    }

    #[test]
    fn test_rate_limit_key_ipv6_truncates_to_four_hextets() {
        assert_eq!(
            rate_limit_key("2001:db8:85a3:8d3:1319:8a2e:370:7348"),
            "2001:db8:85a3:8d3"
        );
        // compressed zeros expand before truncation
        assert_eq!(rate_limit_key("2001:db8::1"), "2001:db8:0:0");
        // whole /64 collapses onto one key
        assert_eq!(
            rate_limit_key("2001:db8:1:2:aaaa::1"),
            rate_limit_key("2001:db8:1:2:bbbb::2"),
        );
    }

    #[test]
    fn test_rate_limit_key_garbage_passthrough() {
        assert_eq!(rate_limit_key("not-an-ip"), "not-an-ip");
    }
}
