//! Field extraction from `lxc info` output.
//!
//! The info dump is human-oriented text, e.g.
//!
//! ```text
//! Name: web01
//! Status: Running
//! Ips:
//!   eth0:	IPV4	10.0.3.15
//!   lo:	IPV4	127.0.0.1
//! ```

use std::net::Ipv4Addr;
use std::sync::LazyLock;

use regex::Regex;

static STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*Status:\s*([A-Za-z]+)\s*$").expect("status pattern is valid")
});

/// The `Status:` field, as printed (e.g. `Running`, `Stopped`).
pub fn parse_status(info: &str) -> Option<&str> {
    STATUS
        .captures(info)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// The IPv4 address listed for `iface`, if one is assigned and well formed.
pub fn parse_ipv4(info: &str, iface: &str) -> Option<Ipv4Addr> {
    let pattern = format!(
        r"(?m)^\s*{}:\s+IPV4\s+([0-9]+\.[0-9]+\.[0-9]+\.[0-9]+)",
        regex::escape(iface)
    );
    let re = Regex::new(&pattern).ok()?;
    re.captures_iter(info)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const RUNNING: &str = "Name: web01\nArchitecture: x86_64\nStatus: Running\nInit: 4242\nIps:\n  eth0:\tIPV4\t10.0.3.15\n  eth0:\tIPV6\tfe80::216:3eff:fe6b:dd2f\n  lo:\tIPV4\t127.0.0.1\n";

    #[rstest]
    #[case("Status: Running\n", Some("Running"))]
    #[case("Name: a\nStatus: STOPPED\n", Some("STOPPED"))]
    #[case("Status:   Frozen", Some("Frozen"))]
    #[case("Name: a\n", None)]
    fn extracts_status(#[case] info: &str, #[case] expected: Option<&str>) {
        assert_eq!(parse_status(info), expected);
    }

    #[test]
    fn extracts_eth0_address() {
        assert_eq!(parse_ipv4(RUNNING, "eth0"), Some(Ipv4Addr::new(10, 0, 3, 15)));
        assert_eq!(parse_ipv4(RUNNING, "lo"), Some(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn no_address_before_dhcp_lease() {
        let info = "Name: web01\nStatus: Running\nIps:\n  lo:\tIPV4\t127.0.0.1\n";
        assert_eq!(parse_ipv4(info, "eth0"), None);
    }

    #[test]
    fn malformed_address_is_ignored() {
        let info = "Ips:\n  eth0:\tIPV4\t10.0.300.1\n";
        assert_eq!(parse_ipv4(info, "eth0"), None);
    }

    #[test]
    fn interface_name_is_matched_exactly() {
        let info = "Ips:\n  veth0:\tIPV4\t10.0.3.99\n";
        assert_eq!(parse_ipv4(info, "eth0"), None);
    }
}
