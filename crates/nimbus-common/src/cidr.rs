//! IPv4 CIDR arithmetic for address-space allocation
//!
//! IpRange controllers work with IPv4 blocks only; anything else is rejected
//! as invalid at the validation step.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::{Error, Result};

/// Private address pools automatic allocation draws from, in order
const ALLOCATION_POOLS: [(u32, u8); 3] = [
    (0x0A00_0000, 8),  // 10.0.0.0/8
    (0xAC10_0000, 12), // 172.16.0.0/12
    (0xC0A8_0000, 16), // 192.168.0.0/16
];

/// An IPv4 CIDR block
///
/// The base address is always the network address; parsing rejects inputs
/// with host bits set so that a spec like `10.0.0.1/24` surfaces as a
/// validation error instead of silently meaning `10.0.0.0/24`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Cidr {
    base: u32,
    prefix: u8,
}

impl Cidr {
    /// Create a block from a network address and prefix length
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self> {
        if prefix > 32 {
            return Err(Error::validation(format!(
                "invalid prefix length /{prefix}, must be at most /32"
            )));
        }
        let base = u32::from(addr);
        if base & !mask(prefix) != 0 {
            return Err(Error::validation(format!(
                "{addr}/{prefix} has host bits set, network address is {}",
                Ipv4Addr::from(base & mask(prefix))
            )));
        }
        Ok(Self { base, prefix })
    }

    /// The prefix length
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// The network address
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.base)
    }

    /// Number of addresses covered by this block
    pub fn size(&self) -> u64 {
        1u64 << (32 - self.prefix)
    }

    /// Whether the given address falls inside this block
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & mask(self.prefix) == self.base
    }

    /// Whether two blocks overlap
    ///
    /// True iff one block's base address falls inside the other, which for
    /// aligned CIDR blocks is equivalent to range intersection. Symmetric by
    /// construction.
    pub fn overlaps(&self, other: &Cidr) -> bool {
        self.contains(other.network()) || other.contains(self.network())
    }

    /// Split this block into the minimal power-of-two count of equal
    /// sub-blocks covering at least `zones` zones
    ///
    /// Returns all `2^k` sub-blocks with `k` minimal such that `2^k >= zones`;
    /// callers assign the first `zones` of them and leave the surplus unused.
    pub fn split(&self, zones: usize) -> Result<Vec<Cidr>> {
        if zones == 0 {
            return Err(Error::validation("cannot split a CIDR into zero zones"));
        }
        let k = (usize::BITS - (zones - 1).leading_zeros()) as u8;
        let new_prefix = self.prefix + k;
        if new_prefix > 32 {
            return Err(Error::validation(format!(
                "{self} cannot be split into {zones} zones, would need /{new_prefix}"
            )));
        }
        let step = 1u64 << (32 - new_prefix);
        let blocks = (0..1u64 << k)
            .map(|i| Cidr {
                base: self.base + (i * step) as u32,
                prefix: new_prefix,
            })
            .collect();
        Ok(blocks)
    }

    /// Allocate a free block of the given prefix length that does not overlap
    /// any of the already taken blocks
    ///
    /// Scans the private pools in address order and returns the first free
    /// candidate, making the result deterministic for a given taken set.
    pub fn allocate(prefix: u8, taken: &[Cidr]) -> Option<Cidr> {
        for (pool_base, pool_prefix) in ALLOCATION_POOLS {
            if prefix < pool_prefix || prefix > 32 {
                continue;
            }
            let step = 1u64 << (32 - prefix);
            let pool_size = 1u64 << (32 - pool_prefix);
            let mut offset = 0u64;
            while offset < pool_size {
                let candidate = Cidr {
                    base: pool_base + offset as u32,
                    prefix,
                };
                if !taken.iter().any(|t| t.overlaps(&candidate)) {
                    return Some(candidate);
                }
                offset += step;
            }
        }
        None
    }

    /// Parse a list of CIDR strings, attributing failures to the given origin
    pub fn parse_all(origin: &str, values: &[String]) -> Result<Vec<Cidr>> {
        values
            .iter()
            .map(|v| {
                v.parse()
                    .map_err(|_| Error::validation_for(origin, format!("invalid CIDR '{v}'")))
            })
            .collect()
    }
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix)
    }
}

impl FromStr for Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| Error::validation(format!("invalid CIDR '{s}', expected a.b.c.d/n")))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| Error::validation(format!("invalid IPv4 address in CIDR '{s}'")))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| Error::validation(format!("invalid prefix length in CIDR '{s}'")))?;
        Cidr::new(addr, prefix)
    }
}
