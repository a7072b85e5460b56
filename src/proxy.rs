use crate::error::{NetError, Result};
use crate::netaddr::{Network, NetworkAddress, ServiceEndpoint};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// ProxyConfig is a SOCKS5 proxy endpoint and whether each connection through it
/// should present fresh random credentials (stream isolation)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub endpoint: ServiceEndpoint,
    pub randomize_credentials: bool,
}

/// ProxyConfig implementation block
impl ProxyConfig {
    pub fn new(endpoint: ServiceEndpoint) -> Self {
        Self {
            endpoint,
            randomize_credentials: false,
        }
    }

    /// with_randomized_credentials toggles per-connection credentials
    pub fn with_randomized_credentials(mut self, randomize: bool) -> Self {
        self.randomize_credentials = randomize;
        self
    }

    /// is_valid requires a connectable IPv4/IPv6 endpoint
    pub fn is_valid(&self) -> bool {
        self.endpoint.is_valid() && self.endpoint.socket_addr().is_some()
    }
}

#[derive(Debug, Default)]
struct Proxies {
    per_network: HashMap<Network, ProxyConfig>,
    name_proxy: Option<ProxyConfig>,
}

/// ProxyRegistry holds the proxy to use for each network type plus the name
/// proxy used for destinations that are resolved by the proxy. Shared by
/// reference between connection attempts; all access goes through its lock.
#[derive(Debug, Default)]
pub struct ProxyRegistry {
    inner: RwLock<Proxies>,
}

/// ProxyRegistry implementation block
impl ProxyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// set_proxy configures the proxy for `network`
    pub fn set_proxy(&self, network: Network, config: ProxyConfig) -> Result<()> {
        if !Network::PROXYABLE.contains(&network) {
            return Err(NetError::InvalidInput(format!(
                "cannot set a proxy for network {network}"
            )));
        }
        if !config.is_valid() {
            return Err(NetError::InvalidInput(format!(
                "invalid proxy endpoint {}",
                config.endpoint
            )));
        }

        debug!(%network, proxy = %config.endpoint, "proxy configured");
        self.inner.write().per_network.insert(network, config);
        Ok(())
    }

    /// proxy returns the proxy configured for `network`, if any
    pub fn proxy(&self, network: Network) -> Option<ProxyConfig> {
        self.inner.read().per_network.get(&network).cloned()
    }

    /// set_name_proxy configures the proxy that resolves names on our behalf
    pub fn set_name_proxy(&self, config: ProxyConfig) -> Result<()> {
        if !config.is_valid() {
            return Err(NetError::InvalidInput(format!(
                "invalid name proxy endpoint {}",
                config.endpoint
            )));
        }

        debug!(proxy = %config.endpoint, "name proxy configured");
        self.inner.write().name_proxy = Some(config);
        Ok(())
    }

    pub fn name_proxy(&self) -> Option<ProxyConfig> {
        self.inner.read().name_proxy.clone()
    }

    pub fn have_name_proxy(&self) -> bool {
        self.inner.read().name_proxy.is_some()
    }

    /// is_proxy reports whether `addr` is the address of a per-network proxy
    pub fn is_proxy(&self, addr: &NetworkAddress) -> bool {
        self.inner
            .read()
            .per_network
            .values()
            .any(|config| &config.endpoint.addr == addr)
    }
}
