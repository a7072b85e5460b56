use crate::netaddr::NetworkAddress;
use std::io;
use std::net::{IpAddr, ToSocketAddrs};

/// Resolver turns a host name into network addresses. Implementations may
/// block. An `Err` or an empty list both mean the name did not resolve.
///
/// When `allow_lookup` is false the resolver must not touch the network and
/// should only accept numeric hosts.
pub trait Resolver: Send + Sync {
    fn resolve(&self, name: &str, allow_lookup: bool) -> io::Result<Vec<NetworkAddress>>;
}

/// Closures make deterministic resolvers for tests
impl<F> Resolver for F
where
    F: Fn(&str, bool) -> io::Result<Vec<NetworkAddress>> + Send + Sync,
{
    fn resolve(&self, name: &str, allow_lookup: bool) -> io::Result<Vec<NetworkAddress>> {
        self(name, allow_lookup)
    }
}

/// SystemResolver resolves through the operating system (getaddrinfo)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, name: &str, allow_lookup: bool) -> io::Result<Vec<NetworkAddress>> {
        if !allow_lookup {
            return Ok(name
                .parse::<IpAddr>()
                .map(|ip| vec![NetworkAddress::from(ip)])
                .unwrap_or_default());
        }

        // Port is irrelevant, getaddrinfo just needs one
        let addrs = (name, 0u16).to_socket_addrs()?;
        Ok(addrs.map(|sa| NetworkAddress::from(sa.ip())).collect())
    }
}
