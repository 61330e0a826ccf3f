//! IPv4 range algebra: parsing, containment, and ascending iteration.
//!
//! Grounded on `examples/original_source/orchestrator/pkg/iprange/iprange.go`.
//! Accepts the same three syntaxes (`A.B.C.D`, `A-B`, `A.B.C.D/n`) and keeps
//! the same IPv4-only containment semantics (`Contains` on an IPv6 input
//! returns `false` in the original; this crate models that as a range that
//! simply never parses an IPv6 literal rather than a silent `false`, since
//! `IpRange` only ever stores `Ipv4Addr` — see the Non-goals in `DESIGN.md`).

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::IpRangeError;

/// An inclusive range of IPv4 addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpRange {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
}

impl IpRange {
    pub fn new(start: Ipv4Addr, end: Ipv4Addr) -> Self {
        Self { start, end }
    }

    /// A range containing exactly one address.
    pub fn single(ip: Ipv4Addr) -> Self {
        Self::new(ip, ip)
    }

    /// Byte-wise lexicographic containment test, matching the original's
    /// `bytes.Compare` based `Contains`.
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let ip_bytes = ip.octets();
        ip_bytes >= self.start.octets() && ip_bytes <= self.end.octets()
    }

    /// The address immediately following `ip`, wrapping is undefined
    /// (mirrors the original's `NextIP`, which is only ever called while
    /// still inside a valid range).
    pub fn next_ip(ip: Ipv4Addr) -> Ipv4Addr {
        let n = u32::from(ip).wrapping_add(1);
        Ipv4Addr::from(n)
    }

    /// Ascending iteration over every address in `start..=end`. Behavior is
    /// undefined (empty iterator, per this implementation) if `start > end`.
    pub fn iter(&self) -> IpRangeIter {
        IpRangeIter {
            current: Some(self.start),
            end: self.end,
        }
    }

    /// The number of addresses covered by this range, if `start <= end`.
    pub fn len(&self) -> u64 {
        let s = u32::from(self.start) as u64;
        let e = u32::from(self.end) as u64;
        e.saturating_sub(s) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start, self.end)
    }
}

/// Ascending iterator over the addresses in an [`IpRange`].
pub struct IpRangeIter {
    current: Option<Ipv4Addr>,
    end: Ipv4Addr,
}

impl Iterator for IpRangeIter {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Self::Item> {
        let cur = self.current?;
        self.current = if cur == self.end {
            None
        } else {
            Some(IpRange::next_ip(cur))
        };
        Some(cur)
    }
}

impl FromStr for IpRange {
    type Err = IpRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if let Some((net, prefix)) = s.split_once('/') {
            let base: Ipv4Addr = net
                .trim()
                .parse()
                .map_err(|_| IpRangeError::InvalidAddress(net.trim().to_string()))?;
            let prefix: u32 = prefix
                .trim()
                .parse()
                .map_err(|_| IpRangeError::InvalidPrefix(prefix.trim().to_string()))?;
            if prefix > 32 {
                return Err(IpRangeError::InvalidPrefix(prefix.to_string()));
            }

            let mask: u32 = if prefix == 0 {
                0
            } else {
                u32::MAX << (32 - prefix)
            };
            let base_bits = u32::from(base);
            let network = base_bits & mask;
            let broadcast = network | !mask;

            return Ok(IpRange::new(Ipv4Addr::from(network), Ipv4Addr::from(broadcast)));
        }

        if let Some((start, end)) = s.split_once('-') {
            let start: Ipv4Addr = start
                .trim()
                .parse()
                .map_err(|_| IpRangeError::InvalidAddress(start.trim().to_string()))?;
            let end: Ipv4Addr = end
                .trim()
                .parse()
                .map_err(|_| IpRangeError::InvalidAddress(end.trim().to_string()))?;
            return Ok(IpRange::new(start, end));
        }

        let single: Ipv4Addr = s
            .parse()
            .map_err(|_| IpRangeError::InvalidSyntax(s.to_string()))?;
        Ok(IpRange::single(single))
    }
}
