//! Network value primitives for the switch object store.
//!
//! Object attributes carry a handful of network-specific value kinds that
//! need total ordering (for key comparison and deterministic dumps) and a
//! stable textual form (for the warm-boot dump):
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`IpAddress`]: IPv4 and IPv6 addresses
//! - [`IpPrefix`]: IP network prefixes (CIDR notation)

mod ip;
mod mac;

pub use ip::{IpAddress, IpPrefix};
pub use mac::MacAddress;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),
}
