use log::debug;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};

use crate::probe::ProbeError;

/// Resolve a hostname or literal address to an IPv4 address.
///
/// Literal IPv4 addresses are returned as-is. Hostnames go through the system
/// resolver and the first IPv4 result wins; names that only have IPv6
/// addresses are a resolution failure.
pub fn resolve_target(target: &str) -> Result<Ipv4Addr, ProbeError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(ProbeError::resolution(target, "empty hostname"));
    }

    // Try parsing as IP address first
    match target.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => return Ok(ip),
        Ok(IpAddr::V6(_)) => {
            return Err(ProbeError::resolution(target, "IPv6 targets are not supported"));
        }
        Err(_) => {}
    }

    // Resolve hostname
    let addrs: Vec<IpAddr> = format!("{}:0", target)
        .to_socket_addrs()
        .map_err(|e| ProbeError::resolution(target, e.to_string()))?
        .map(|s| s.ip())
        .collect();

    if addrs.is_empty() {
        return Err(ProbeError::resolution(target, "no addresses found for hostname"));
    }

    let ipv4 = addrs.iter().find_map(|ip| match ip {
        IpAddr::V4(v4) => Some(*v4),
        IpAddr::V6(_) => None,
    });

    match ipv4 {
        Some(ip) => {
            debug!("resolved {} to {}", target, ip);
            Ok(ip)
        }
        None => Err(ProbeError::resolution(target, "no IPv4 addresses found")),
    }
}
