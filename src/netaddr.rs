//! Network address value types: addresses, endpoints, subnets, network
//! classes and connection directions.

use crate::error::{NetError, Result};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

const ONION_SUFFIX: &str = ".onion";
const I2P_SUFFIX: &str = ".b32.i2p";

/// Length of the base32 part of a v3 onion name (32 byte key, 2 byte checksum, version)
const ONION_V3_LEN: usize = 56;

/// Length of the base32 part of an i2p b32 name (32 byte hash)
const I2P_B32_LEN: usize = 52;

/// Network represents the network class an address belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Unroutable,
    Ipv4,
    Ipv6,
    Onion,
    I2p,
    Internal,
}

/// Network implementation block
impl Network {
    /// Networks a proxy can be configured for
    pub const PROXYABLE: [Network; 4] =
        [Network::Ipv4, Network::Ipv6, Network::Onion, Network::I2p];

    /// name returns the canonical name of the network
    pub fn name(self) -> &'static str {
        match self {
            Network::Unroutable => "not_publicly_routable",
            Network::Ipv4 => "ipv4",
            Network::Ipv6 => "ipv6",
            Network::Onion => "onion",
            Network::I2p => "i2p",
            Network::Internal => "internal",
        }
    }

    /// names lists the publicly routable network names, optionally followed by
    /// the unroutable pseudo-network
    pub fn names(append_unroutable: bool) -> Vec<&'static str> {
        let mut names: Vec<_> = Self::PROXYABLE.iter().map(|n| n.name()).collect();
        if append_unroutable {
            names.push(Network::Unroutable.name());
        }
        names
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Network {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ipv4" => Ok(Network::Ipv4),
            "ipv6" => Ok(Network::Ipv6),
            // "tor" is the legacy name for onion
            "onion" | "tor" => Ok(Network::Onion),
            "i2p" => Ok(Network::I2p),
            _ => Err(NetError::InvalidInput(format!("unknown network: {s}"))),
        }
    }
}

/// NetworkAddress is a host address on one of the supported networks
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NetworkAddress {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    /// Lowercase v3 onion name including the `.onion` suffix
    Onion(String),
    /// Lowercase b32 i2p name including the `.b32.i2p` suffix
    I2p(String),
    /// Locally synthesized placeholder for a name that has no network address
    Internal(String),
    Unroutable,
}

/// NetworkAddress implementation block
impl NetworkAddress {
    /// internal synthesizes a placeholder address for `name`. Never produced by
    /// resolution.
    pub fn internal(name: &str) -> Self {
        NetworkAddress::Internal(name.to_ascii_lowercase())
    }

    /// parse_numeric parses a literal address: IPv4, IPv6, onion or i2p name.
    /// No name resolution is ever attempted.
    pub fn parse_numeric(s: &str) -> Option<Self> {
        if let Ok(ip) = s.parse::<IpAddr>() {
            return Some(Self::from(ip));
        }
        Self::parse_special(s)
    }

    /// parse_special parses onion and i2p names
    pub fn parse_special(s: &str) -> Option<Self> {
        let lower = s.to_ascii_lowercase();

        if let Some(base) = lower.strip_suffix(ONION_SUFFIX) {
            // v3 names encode the version byte 0x03 in the last base32 character
            if base.len() == ONION_V3_LEN && is_base32(base) && base.ends_with('d') {
                return Some(NetworkAddress::Onion(lower));
            }
            return None;
        }

        if let Some(base) = lower.strip_suffix(I2P_SUFFIX) {
            if base.len() == I2P_B32_LEN && is_base32(base) {
                return Some(NetworkAddress::I2p(lower));
            }
            return None;
        }

        None
    }

    /// network returns the network class of the address
    pub fn network(&self) -> Network {
        match self {
            NetworkAddress::Ipv4(_) => Network::Ipv4,
            NetworkAddress::Ipv6(_) => Network::Ipv6,
            NetworkAddress::Onion(_) => Network::Onion,
            NetworkAddress::I2p(_) => Network::I2p,
            NetworkAddress::Internal(_) => Network::Internal,
            NetworkAddress::Unroutable => Network::Unroutable,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, NetworkAddress::Internal(_))
    }

    /// is_valid is false for the unroutable placeholder and unspecified IPs
    pub fn is_valid(&self) -> bool {
        match self {
            NetworkAddress::Ipv4(ip) => !ip.is_unspecified(),
            NetworkAddress::Ipv6(ip) => !ip.is_unspecified(),
            NetworkAddress::Unroutable => false,
            _ => true,
        }
    }

    /// ip returns the IP address for IPv4/IPv6 addresses
    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            NetworkAddress::Ipv4(ip) => Some(IpAddr::V4(*ip)),
            NetworkAddress::Ipv6(ip) => Some(IpAddr::V6(*ip)),
            _ => None,
        }
    }

    /// bit_width is the number of addressable bits for subnetting
    fn bit_width(&self) -> u8 {
        match self {
            NetworkAddress::Ipv4(_) => 32,
            NetworkAddress::Ipv6(_) => 128,
            _ => 0,
        }
    }
}

impl From<IpAddr> for NetworkAddress {
    fn from(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => NetworkAddress::Ipv4(v4),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => NetworkAddress::Ipv4(v4),
                None => NetworkAddress::Ipv6(v6),
            },
        }
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkAddress::Ipv4(ip) => write!(f, "{ip}"),
            NetworkAddress::Ipv6(ip) => write!(f, "{ip}"),
            NetworkAddress::Onion(name) | NetworkAddress::I2p(name) => f.write_str(name),
            NetworkAddress::Internal(name) => write!(f, "{name}.internal"),
            NetworkAddress::Unroutable => f.write_str("0.0.0.0"),
        }
    }
}

/// is_base32 checks for the lowercase RFC 4648 base32 alphabet
fn is_base32(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_lowercase() || (b'2'..=b'7').contains(&b))
}

/// ServiceEndpoint is a network address paired with a port
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceEndpoint {
    pub addr: NetworkAddress,
    pub port: u16,
}

/// ServiceEndpoint implementation block
impl ServiceEndpoint {
    pub fn new(addr: NetworkAddress, port: u16) -> Self {
        Self { addr, port }
    }

    /// socket_addr returns a connectable socket address for IPv4/IPv6 endpoints
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.addr.ip().map(|ip| SocketAddr::new(ip, self.port))
    }

    pub fn network(&self) -> Network {
        self.addr.network()
    }

    pub fn is_valid(&self) -> bool {
        self.addr.is_valid()
    }
}

impl From<SocketAddr> for ServiceEndpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(NetworkAddress::from(addr.ip()), addr.port())
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.addr {
            NetworkAddress::Ipv6(ip) => write!(f, "[{ip}]:{}", self.port),
            addr => write!(f, "{addr}:{}", self.port),
        }
    }
}

/// Subnet is a network address with a prefix length. Onion and i2p subnets
/// always cover exactly one host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subnet {
    network: NetworkAddress,
    prefix_len: u8,
}

/// Subnet implementation block
impl Subnet {
    /// new builds a subnet from a base address and prefix length. Host bits of
    /// the base address are cleared.
    pub fn new(addr: NetworkAddress, prefix_len: u8) -> Result<Self> {
        match addr.ip() {
            Some(IpAddr::V4(ip)) => {
                if prefix_len > 32 {
                    return Err(NetError::InvalidInput(format!(
                        "prefix length {prefix_len} too large for IPv4"
                    )));
                }
                let masked = u32::from(ip) & mask_u32(prefix_len);
                Ok(Self {
                    network: NetworkAddress::Ipv4(Ipv4Addr::from(masked)),
                    prefix_len,
                })
            }
            Some(IpAddr::V6(ip)) => {
                if prefix_len > 128 {
                    return Err(NetError::InvalidInput(format!(
                        "prefix length {prefix_len} too large for IPv6"
                    )));
                }
                let masked = u128::from(ip) & mask_u128(prefix_len);
                Ok(Self {
                    network: NetworkAddress::Ipv6(Ipv6Addr::from(masked)),
                    prefix_len,
                })
            }
            None => match addr {
                NetworkAddress::Onion(_) | NetworkAddress::I2p(_) => Ok(Self::single(addr)),
                other => Err(NetError::InvalidInput(format!(
                    "cannot build a subnet from {other}"
                ))),
            },
        }
    }

    /// from_mask builds a subnet from a base address and a netmask of the same
    /// family. The mask must be contiguous.
    pub fn from_mask(addr: NetworkAddress, mask: &NetworkAddress) -> Result<Self> {
        let prefix_len = match (addr.ip(), mask.ip()) {
            (Some(IpAddr::V4(_)), Some(IpAddr::V4(m))) => {
                contiguous_prefix(u32::from(m).into(), 32)
            }
            (Some(IpAddr::V6(_)), Some(IpAddr::V6(m))) => contiguous_prefix(u128::from(m), 128),
            _ => None,
        }
        .ok_or_else(|| NetError::InvalidInput(format!("invalid netmask {mask} for {addr}")))?;

        Self::new(addr, prefix_len)
    }

    /// single builds a subnet containing only `addr`
    pub fn single(addr: NetworkAddress) -> Self {
        let prefix_len = addr.bit_width();
        Self {
            network: addr,
            prefix_len,
        }
    }

    pub fn network(&self) -> &NetworkAddress {
        &self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn is_valid(&self) -> bool {
        match self.network {
            NetworkAddress::Ipv4(_) | NetworkAddress::Ipv6(_) => {
                self.prefix_len <= self.network.bit_width()
            }
            NetworkAddress::Onion(_) | NetworkAddress::I2p(_) => true,
            _ => false,
        }
    }

    /// contains tests whether `addr` lies within the subnet
    pub fn contains(&self, addr: &NetworkAddress) -> bool {
        match (&self.network, addr) {
            (NetworkAddress::Ipv4(net), NetworkAddress::Ipv4(ip)) => {
                let mask = mask_u32(self.prefix_len);
                u32::from(*ip) & mask == u32::from(*net)
            }
            (NetworkAddress::Ipv6(net), NetworkAddress::Ipv6(ip)) => {
                let mask = mask_u128(self.prefix_len);
                u128::from(*ip) & mask == u128::from(*net)
            }
            (NetworkAddress::Onion(_), _) | (NetworkAddress::I2p(_), _) => &self.network == addr,
            _ => false,
        }
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.network {
            NetworkAddress::Ipv4(_) | NetworkAddress::Ipv6(_) => {
                write!(f, "{}/{}", self.network, self.prefix_len)
            }
            _ => write!(f, "{}", self.network),
        }
    }
}

fn mask_u32(prefix_len: u8) -> u32 {
    match prefix_len {
        0 => 0,
        n => u32::MAX << (32 - u32::from(n.min(32))),
    }
}

fn mask_u128(prefix_len: u8) -> u128 {
    match prefix_len {
        0 => 0,
        n => u128::MAX << (128 - u32::from(n.min(128))),
    }
}

/// contiguous_prefix returns the prefix length of a netmask whose top `width`
/// bits are ones followed by zeros
fn contiguous_prefix(mask: u128, width: u32) -> Option<u8> {
    let shifted = mask << (128 - width);
    let ones = shifted.leading_ones();
    if shifted.checked_shl(ones).unwrap_or(0) != 0 {
        return None;
    }
    u8::try_from(ones).ok()
}

/// ConnectionDirection is a set over {Inbound, Outbound}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConnectionDirection(u8);

/// ConnectionDirection implementation block
impl ConnectionDirection {
    pub const NONE: Self = Self(0);
    pub const INBOUND: Self = Self(1 << 0);
    pub const OUTBOUND: Self = Self(1 << 1);
    pub const BOTH: Self = Self(Self::INBOUND.0 | Self::OUTBOUND.0);

    /// contains reports whether every direction in `other` is in the set
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// intersects reports whether the sets share any direction
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ConnectionDirection {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ConnectionDirection {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
