//! Destination lookup: decides whether a name is a literal address, needs the
//! resolver, or must fail because lookups are disabled. Also parses endpoint
//! (`host:port`) and subnet (`addr/prefix`, `addr/mask`) strings.

use crate::error::{NetError, Result};
use crate::netaddr::{NetworkAddress, ServiceEndpoint, Subnet};
use crate::resolver::{Resolver, SystemResolver};
use std::sync::Arc;
use tracing::{debug, warn};

/// NameLookup resolves destination strings through an injected resolver
#[derive(Clone)]
pub struct NameLookup {
    resolver: Arc<dyn Resolver>,
}

impl Default for NameLookup {
    fn default() -> Self {
        Self::new(Arc::new(SystemResolver))
    }
}

impl std::fmt::Debug for NameLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameLookup").finish_non_exhaustive()
    }
}

/// NameLookup implementation block
impl NameLookup {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self { resolver }
    }

    /// lookup_host resolves `name` to at most `max_results` addresses
    /// (`0` means no limit), in resolver order. Literal addresses are returned
    /// as-is without consulting the resolver.
    pub fn lookup_host(
        &self,
        name: &str,
        max_results: usize,
        allow_lookup: bool,
    ) -> Result<Vec<NetworkAddress>> {
        validate_name(name)?;

        let host = strip_brackets(name);
        if let Some(addr) = NetworkAddress::parse_numeric(host) {
            return Ok(vec![addr]);
        }

        if !allow_lookup {
            return Err(NetError::ResolutionFailed(format!(
                "{host} is not a numeric address and name lookup is disabled"
            )));
        }

        let resolved = self
            .resolver
            .resolve(host, allow_lookup)
            .map_err(|e| NetError::ResolutionFailed(format!("{host}: {e}")))?;

        let mut addrs = Vec::with_capacity(resolved.len());
        for addr in resolved {
            if max_results > 0 && addrs.len() >= max_results {
                break;
            }
            // Placeholders only ever come from local synthesis
            if addr.is_internal() {
                warn!(%host, %addr, "resolver returned an internal address, ignoring");
                continue;
            }
            addrs.push(addr);
        }

        if addrs.is_empty() {
            return Err(NetError::ResolutionFailed(format!("{host}: no addresses")));
        }

        debug!(%host, count = addrs.len(), "resolved host");
        Ok(addrs)
    }

    /// lookup_host_single resolves `name` to its first address
    pub fn lookup_host_single(&self, name: &str, allow_lookup: bool) -> Result<NetworkAddress> {
        let mut addrs = self.lookup_host(name, 1, allow_lookup)?;
        addrs
            .pop()
            .ok_or_else(|| NetError::ResolutionFailed(format!("{name}: no addresses")))
    }

    /// lookup resolves a `host[:port]` string into endpoints. `port_default`
    /// applies when the string carries no port.
    pub fn lookup(
        &self,
        name: &str,
        port_default: u16,
        allow_lookup: bool,
        max_results: usize,
    ) -> Result<Vec<ServiceEndpoint>> {
        validate_name(name)?;

        let (host, port) = split_host_port(name)?;
        let port = port.unwrap_or(port_default);

        let addrs = self.lookup_host(host, max_results, allow_lookup)?;
        Ok(addrs
            .into_iter()
            .map(|addr| ServiceEndpoint::new(addr, port))
            .collect())
    }

    /// lookup_single resolves a `host[:port]` string to its first endpoint
    pub fn lookup_single(
        &self,
        name: &str,
        port_default: u16,
        allow_lookup: bool,
    ) -> Result<ServiceEndpoint> {
        let mut endpoints = self.lookup(name, port_default, allow_lookup, 1)?;
        endpoints
            .pop()
            .ok_or_else(|| NetError::ResolutionFailed(format!("{name}: no addresses")))
    }

    /// lookup_numeric parses a literal `host[:port]`. The resolver is never
    /// called, so this is safe where resolution must be synchronous and free of
    /// side effects.
    pub fn lookup_numeric(&self, name: &str, port_default: u16) -> Result<ServiceEndpoint> {
        validate_name(name)?;

        let (host, port) = split_host_port(name)?;
        let addr = NetworkAddress::parse_numeric(host)
            .ok_or_else(|| NetError::ResolutionFailed(format!("{host} is not a numeric address")))?;

        Ok(ServiceEndpoint::new(addr, port.unwrap_or(port_default)))
    }

    /// lookup_subnet parses `addr`, `addr/prefixlen` or `addr/netmask`. Only
    /// literal addresses are accepted; a bare address is a single-host subnet.
    pub fn lookup_subnet(&self, text: &str) -> Result<Subnet> {
        validate_name(text)?;

        let (addr_part, suffix) = match text.split_once('/') {
            Some((addr, suffix)) => (addr, Some(suffix)),
            None => (text, None),
        };

        let addr = numeric_host(addr_part)?;
        let Some(suffix) = suffix else {
            return Ok(Subnet::single(addr));
        };

        // A plain decimal is a prefix length, anything else must be a netmask
        if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
            let prefix_len = suffix
                .parse::<u8>()
                .map_err(|_| NetError::InvalidInput(format!("invalid prefix length {suffix}")))?;
            return Subnet::new(addr, prefix_len);
        }

        let mask = numeric_host(suffix)?;
        Subnet::from_mask(addr, &mask)
    }
}

/// numeric_host parses a possibly bracketed literal address
fn numeric_host(s: &str) -> Result<NetworkAddress> {
    NetworkAddress::parse_numeric(strip_brackets(s))
        .ok_or_else(|| NetError::InvalidInput(format!("{s} is not a numeric address")))
}

/// validate_name rejects empty, blank and NUL-containing names
fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(NetError::InvalidInput("empty name".into()));
    }
    if name.contains('\0') {
        return Err(NetError::InvalidInput("name contains NUL".into()));
    }
    Ok(())
}

fn strip_brackets(name: &str) -> &str {
    name.strip_prefix('[')
        .and_then(|n| n.strip_suffix(']'))
        .unwrap_or(name)
}

/// split_host_port splits an optional trailing `:port`. A bare IPv6 literal has
/// several colons and no port; a bracketed one may carry a port after `]`.
pub fn split_host_port(input: &str) -> Result<(&str, Option<u16>)> {
    let Some(colon) = input.rfind(':') else {
        return Ok((strip_brackets(input), None));
    };

    let bracketed = input.starts_with('[') && colon > 0 && input.as_bytes()[colon - 1] == b']';
    let multi_colon = input[..colon].contains(':');

    if colon != 0 && !bracketed && multi_colon {
        return Ok((strip_brackets(input), None));
    }

    let port_str = &input[colon + 1..];
    let port = port_str
        .parse::<u16>()
        .ok()
        .filter(|_| port_str.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| NetError::InvalidInput(format!("invalid port in {input}")))?;

    Ok((strip_brackets(&input[..colon]), Some(port)))
}
