//! Host network address discovery.
//!
//! Responses are stamped with the address of the node that produced them.
//! We pick the first IPv4 address bound to a non-loopback interface, taking
//! interfaces in name order so the choice is stable across restarts.

use std::net::{IpAddr, Ipv4Addr};

use sysinfo::Networks;

/// First non-loopback IPv4 address bound to this host, if any.
pub fn first_non_loopback_ipv4() -> Option<Ipv4Addr> {
    let networks = Networks::new_with_refreshed_list();

    let mut interfaces: Vec<(&str, Vec<IpAddr>)> = networks
        .iter()
        .map(|(name, data)| {
            let addrs = data.ip_networks().iter().map(|net| net.addr).collect();
            (name.as_str(), addrs)
        })
        .collect();
    interfaces.sort_by(|a, b| a.0.cmp(b.0));

    let found = pick_ipv4(interfaces.iter().flat_map(|(_, addrs)| addrs.iter().copied()));
    if found.is_none() {
        tracing::warn!(
            interfaces = interfaces.len(),
            "No interface carries a non-loopback IPv4 address"
        );
    }
    found
}

/// Same as [`first_non_loopback_ipv4`] but rendered for a response body;
/// empty when no address qualifies.
pub fn host_address_string() -> String {
    first_non_loopback_ipv4()
        .map(|addr| addr.to_string())
        .unwrap_or_default()
}

fn pick_ipv4(addrs: impl IntoIterator<Item = IpAddr>) -> Option<Ipv4Addr> {
    addrs.into_iter().find_map(|addr| match addr {
        IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_unspecified() => Some(v4),
        _ => None,
    })
}
