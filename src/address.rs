use crate::error::NetError;
use crate::interrupt::Deadline;
use crate::protocol::{AddressType, MAX_FIELD_LEN};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use tokio::io::AsyncRead;

/// DestAddress represents the DST.ADDR field of a SOCKS5 CONNECT request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestAddress {
    IPv4(Ipv4Addr),
    IPv6(Ipv6Addr),
    /// Sent verbatim so the proxy performs the resolution
    DomainName(String),
}

/// DestAddress implementation block
impl DestAddress {
    /// from_host picks the address type for a destination host string. IP
    /// literals go out in binary form, everything else including onion and i2p
    /// names as a domain name. Surrounding brackets are dropped first.
    pub fn from_host(host: &str) -> Result<Self, NetError> {
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            return Ok(DestAddress::IPv4(ip));
        }
        if let Ok(ip) = host.parse::<Ipv6Addr>() {
            return Ok(DestAddress::IPv6(ip));
        }

        // Length is checked here so an oversized name never reaches the wire
        if host.is_empty() {
            return Err(NetError::InvalidInput("empty destination host".into()));
        }
        if host.len() > MAX_FIELD_LEN {
            return Err(NetError::InvalidInput(format!(
                "destination host too long: {} bytes (max {MAX_FIELD_LEN})",
                host.len()
            )));
        }

        Ok(DestAddress::DomainName(host.to_string()))
    }

    /// address_type returns the ATYP byte for the address
    pub fn address_type(&self) -> AddressType {
        match self {
            DestAddress::IPv4(_) => AddressType::IPv4,
            DestAddress::IPv6(_) => AddressType::IPv6,
            DestAddress::DomainName(_) => AddressType::DomainName,
        }
    }

    /// encode appends ATYP, DST.ADDR and DST.PORT to `buf`
    pub fn encode(&self, port: u16, buf: &mut Vec<u8>) {
        buf.push(self.address_type() as u8);
        match self {
            DestAddress::IPv4(ip) => buf.extend_from_slice(&ip.octets()),
            DestAddress::IPv6(ip) => buf.extend_from_slice(&ip.octets()),
            DestAddress::DomainName(name) => {
                // First octet in DomainName contains the number of
                // octets to follow
                buf.push(name.len() as u8);
                buf.extend_from_slice(name.as_bytes());
            }
        }
        buf.extend_from_slice(&port.to_be_bytes());
    }
}

impl fmt::Display for DestAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestAddress::IPv4(ip) => write!(f, "{ip}"),
            DestAddress::IPv6(ip) => write!(f, "[{ip}]"),
            DestAddress::DomainName(name) => f.write_str(name),
        }
    }
}

/// read_bound_address consumes BND.ADDR and BND.PORT from a proxy reply so the
/// stream stays aligned on the tunnelled payload, and returns them as a string
pub(crate) async fn read_bound_address<S>(
    stream: &mut S,
    atyp: u8,
    deadline: &Deadline<'_>,
) -> Result<String, NetError>
where
    S: AsyncRead + Unpin,
{
    // Match type and extract address or domain name
    let bound = match AddressType::from_byte(atyp) {
        Some(AddressType::IPv4) => {
            let mut addr = [0u8; 4];
            deadline.recv_exact(stream, &mut addr).await?;
            Ipv4Addr::from(addr).to_string()
        }
        Some(AddressType::DomainName) => {
            let mut len = [0u8; 1];
            deadline.recv_exact(stream, &mut len).await?;

            let mut domain = vec![0u8; len[0] as usize];
            deadline.recv_exact(stream, &mut domain).await?;
            String::from_utf8_lossy(&domain).into_owned()
        }
        Some(AddressType::IPv6) => {
            let mut addr = [0u8; 16];
            deadline.recv_exact(stream, &mut addr).await?;
            format!("[{}]", Ipv6Addr::from(addr))
        }
        None => {
            return Err(NetError::ProxyProtocol(format!(
                "malformed proxy response: unknown bound address type 0x{atyp:02x}"
            )));
        }
    };

    // Read port
    let mut port_buf = [0u8; 2];
    deadline.recv_exact(stream, &mut port_buf).await?;
    let port = u16::from_be_bytes(port_buf);

    Ok(format!("{bound}:{port}"))
}
