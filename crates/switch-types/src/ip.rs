//! IP address and prefix attribute values.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// An IP address that can be either IPv4 or IPv6.
///
/// All IPv4 addresses order before all IPv6 addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IpAddress {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
}

impl IpAddress {
    pub const fn is_ipv4(&self) -> bool {
        matches!(self, IpAddress::V4(_))
    }

    pub const fn is_ipv6(&self) -> bool {
        matches!(self, IpAddress::V6(_))
    }

    /// Address width in bits (32 or 128).
    pub const fn bit_len(&self) -> u8 {
        match self {
            IpAddress::V4(_) => 32,
            IpAddress::V6(_) => 128,
        }
    }

    /// Returns true for 0.0.0.0 and ::.
    pub fn is_unspecified(&self) -> bool {
        match self {
            IpAddress::V4(a) => a.is_unspecified(),
            IpAddress::V6(a) => a.is_unspecified(),
        }
    }

    fn to_bits(self) -> u128 {
        match self {
            IpAddress::V4(a) => u128::from(u32::from(a)),
            IpAddress::V6(a) => u128::from(a),
        }
    }

    fn from_bits_like(self, bits: u128) -> Self {
        match self {
            IpAddress::V4(_) => IpAddress::V4(Ipv4Addr::from(bits as u32)),
            IpAddress::V6(_) => IpAddress::V6(Ipv6Addr::from(bits)),
        }
    }

    /// Zeroes every bit past `prefix_len`.
    fn masked(self, prefix_len: u8) -> Self {
        let width = u32::from(self.bit_len());
        let host_bits = width - u32::from(prefix_len);
        let mask = if host_bits >= 128 {
            0
        } else {
            !0u128 << host_bits
        };
        self.from_bits_like(self.to_bits() & mask)
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpAddress::V4(addr) => addr.fmt(f),
            IpAddress::V6(addr) => addr.fmt(f),
        }
    }
}

impl FromStr for IpAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = if s.contains(':') {
            s.parse::<Ipv6Addr>().map(IpAddress::V6)
        } else {
            s.parse::<Ipv4Addr>().map(IpAddress::V4)
        };
        parsed.map_err(|_| ParseError::InvalidIpAddress(s.to_string()))
    }
}

impl TryFrom<String> for IpAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IpAddress> for String {
    fn from(addr: IpAddress) -> String {
        addr.to_string()
    }
}

impl From<Ipv4Addr> for IpAddress {
    fn from(addr: Ipv4Addr) -> Self {
        IpAddress::V4(addr)
    }
}

impl From<Ipv6Addr> for IpAddress {
    fn from(addr: Ipv6Addr) -> Self {
        IpAddress::V6(addr)
    }
}

/// An IP prefix in CIDR notation (e.g., 10.0.0.0/24 or 2001:db8::/32).
///
/// Host bits are cleared on construction, so `10.0.0.7/24` and `10.0.0.0/24`
/// are the same prefix. Route keys depend on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IpPrefix {
    address: IpAddress,
    prefix_len: u8,
}

impl IpPrefix {
    /// Creates a new prefix, masking host bits.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix length exceeds the address width.
    pub fn new(address: IpAddress, prefix_len: u8) -> Result<Self, ParseError> {
        if prefix_len > address.bit_len() {
            return Err(ParseError::InvalidIpPrefix(format!(
                "{}/{}: prefix length exceeds {}",
                address,
                prefix_len,
                address.bit_len()
            )));
        }

        Ok(IpPrefix {
            address: address.masked(prefix_len),
            prefix_len,
        })
    }

    /// Host route for a single address (/32 or /128).
    pub fn host(address: IpAddress) -> Self {
        IpPrefix {
            address,
            prefix_len: address.bit_len(),
        }
    }

    pub const fn address(&self) -> &IpAddress {
        &self.address
    }

    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub const fn is_ipv4(&self) -> bool {
        self.address.is_ipv4()
    }

    pub fn is_host_route(&self) -> bool {
        self.prefix_len == self.address.bit_len()
    }

    pub fn is_default(&self) -> bool {
        self.prefix_len == 0
    }

    /// Returns true if `addr` falls inside this prefix.
    pub fn contains(&self, addr: &IpAddress) -> bool {
        addr.is_ipv4() == self.address.is_ipv4() && addr.masked(self.prefix_len) == self.address
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for IpPrefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_str, len_str) = s
            .rsplit_once('/')
            .ok_or_else(|| ParseError::InvalidIpPrefix(s.to_string()))?;

        let address: IpAddress = addr_str.parse()?;
        let prefix_len: u8 = len_str
            .parse()
            .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;

        IpPrefix::new(address, prefix_len)
    }
}

impl TryFrom<String> for IpPrefix {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IpPrefix> for String {
    fn from(prefix: IpPrefix) -> String {
        prefix.to_string()
    }
}
