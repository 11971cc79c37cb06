//! Source IP allow-lists: exact entries and IPv4 CIDR blocks.
//!
//! IPv6 sources only ever match by exact string.

use std::net::Ipv4Addr;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CidrError {
    #[error("missing prefix length")]
    MissingPrefix,
    #[error("invalid prefix length: {0}")]
    InvalidPrefix(String),
    #[error("invalid ipv4 address: {0}")]
    InvalidAddress(String),
}

/// An IPv4 network in `a.b.c.d/n` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    network: u32,
    prefix: u8,
}

impl Ipv4Cidr {
    fn mask(&self) -> u32 {
        // Shifting a u32 by 32 overflows, so /0 is special-cased.
        if self.prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.prefix))
        }
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let mask = self.mask();
        u32::from(ip) & mask == self.network & mask
    }
}

impl FromStr for Ipv4Cidr {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s.split_once('/').ok_or(CidrError::MissingPrefix)?;
        let prefix: u8 = prefix
            .parse()
            .ok()
            .filter(|p| *p <= 32)
            .ok_or_else(|| CidrError::InvalidPrefix(prefix.to_owned()))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| CidrError::InvalidAddress(addr.to_owned()))?;
        Ok(Self {
            network: u32::from(addr),
            prefix,
        })
    }
}

/// Whether `ip` matches `entry` exactly or falls inside it as a CIDR block.
/// Malformed CIDR entries match nothing.
pub fn entry_matches(ip: &str, entry: &str) -> bool {
    let entry = entry.trim();
    if entry == ip {
        return true;
    }
    if !entry.contains('/') {
        return false;
    }
    match (entry.parse::<Ipv4Cidr>(), ip.parse::<Ipv4Addr>()) {
        (Ok(cidr), Ok(addr)) => cidr.contains(addr),
        _ => false,
    }
}

/// Empty allow-lists are unrestricted.
pub fn is_allowed(ip: &str, allowed: &[String]) -> bool {
    allowed.is_empty() || allowed.iter().any(|entry| entry_matches(ip, entry))
}
