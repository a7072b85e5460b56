use crate::auth::ProxyCredentials;
use crate::config::NetConfig;
use crate::error::{NetError, Result};
use crate::interrupt::{Deadline, Interrupt};
use crate::lookup::{NameLookup, split_host_port};
use crate::netaddr::ServiceEndpoint;
use crate::proxy::{ProxyConfig, ProxyRegistry};
use crate::resolver::Resolver;
use crate::sock::{SocketFactory, TcpSocketFactory};
use crate::socks5::socks5_connect;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task;
use tracing::{debug, info};

/// Connector opens connections to peers, either directly or through the SOCKS5
/// proxies configured in its registry
#[derive(Clone)]
pub struct Connector {
    pub config: NetConfig,
    lookup: NameLookup,
    sockets: Arc<dyn SocketFactory>,
    proxies: Arc<ProxyRegistry>,
    interrupt: Interrupt,
}

/// Connector implementation block
impl Connector {
    /// new builds a connector using the system resolver, plain TCP sockets, an
    /// empty proxy registry and its own interrupt flag
    pub fn new(config: NetConfig) -> Self {
        Self {
            config,
            lookup: NameLookup::default(),
            sockets: Arc::new(TcpSocketFactory),
            proxies: Arc::new(ProxyRegistry::new()),
            interrupt: Interrupt::new(),
        }
    }

    /// with_resolver replaces the resolver used for destination names
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.lookup = NameLookup::new(resolver);
        self
    }

    /// with_socket_factory replaces the factory creating outgoing sockets
    pub fn with_socket_factory(mut self, sockets: Arc<dyn SocketFactory>) -> Self {
        self.sockets = sockets;
        self
    }

    /// with_proxies shares a proxy registry with this connector
    pub fn with_proxies(mut self, proxies: Arc<ProxyRegistry>) -> Self {
        self.proxies = proxies;
        self
    }

    /// with_interrupt shares a process-wide interrupt flag with this connector
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn lookup(&self) -> &NameLookup {
        &self.lookup
    }

    pub fn proxies(&self) -> &ProxyRegistry {
        &self.proxies
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// connect_directly opens a TCP connection to `dest`. `manual` marks a
    /// user-requested connection, whose failures are logged more prominently.
    pub async fn connect_directly(
        &self,
        dest: &ServiceEndpoint,
        timeout: Duration,
        manual: bool,
    ) -> Result<TcpStream> {
        let addr = dest.socket_addr().ok_or_else(|| {
            NetError::InvalidInput(format!("cannot connect to {dest}: unsupported network"))
        })?;

        let socket = self
            .sockets
            .create(dest)
            .map_err(|source| NetError::ConnectRefusedOrUnreachable {
                addr: dest.to_string(),
                source,
            })?;

        let deadline = Deadline::after(timeout, &self.interrupt);
        let result = match deadline.run(socket.connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(NetError::ConnectRefusedOrUnreachable {
                addr: dest.to_string(),
                source,
            }),
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) => debug!(%dest, "connected"),
            Err(e) if manual => info!(%dest, error = %e, "connection failed"),
            Err(e) => debug!(%dest, error = %e, "connection failed"),
        }
        result
    }

    /// connect_through_proxy connects to `proxy` and has it open a tunnel to
    /// `dest_host:dest_port`. `dest_host` is passed to the proxy verbatim, so
    /// names are resolved proxy-side.
    ///
    /// Failing to reach the proxy yields `ProxyUnreachable`; anything that goes
    /// wrong after the TCP connect (auth, rejection, protocol) means the proxy
    /// was reachable and `proxy_connection_failed()` stays false.
    pub async fn connect_through_proxy(
        &self,
        proxy: &ProxyConfig,
        dest_host: &str,
        dest_port: u16,
        timeout: Duration,
    ) -> Result<TcpStream> {
        let mut stream = match self.connect_directly(&proxy.endpoint, timeout, true).await {
            Ok(stream) => stream,
            Err(NetError::Interrupted) => return Err(NetError::Interrupted),
            Err(e) => {
                return Err(NetError::ProxyUnreachable {
                    proxy: proxy.endpoint.to_string(),
                    source: Box::new(e),
                });
            }
        };

        // Fresh credentials per connection isolate streams on the proxy
        let credentials = proxy.randomize_credentials.then(ProxyCredentials::random);

        socks5_connect(
            &mut stream,
            dest_host,
            dest_port,
            credentials.as_ref(),
            timeout,
            &self.interrupt,
        )
        .await?;

        Ok(stream)
    }

    /// connect opens a connection to a `host[:port]` destination, picking the
    /// route from the proxy registry:
    ///
    /// - resolvable destinations use their network's proxy, or connect directly
    /// - names that cannot be resolved locally go to the name proxy, if any
    ///
    /// The resolver may block, so it runs on the blocking pool while the
    /// interrupt flag and connect timeout are watched.
    pub async fn connect(&self, dest: &str, port_default: u16, manual: bool) -> Result<TcpStream> {
        let timeout = self.config.connect_timeout;
        let allow_lookup = self.config.name_lookup && !self.proxies.have_name_proxy();

        match self.resolve(dest, port_default, allow_lookup, timeout).await {
            Ok(endpoint) => match self.proxies.proxy(endpoint.network()) {
                Some(proxy) => {
                    debug!(%dest, proxy = %proxy.endpoint, "connecting through network proxy");
                    self.connect_through_proxy(
                        &proxy,
                        &endpoint.addr.to_string(),
                        endpoint.port,
                        timeout,
                    )
                    .await
                }
                None => self.connect_directly(&endpoint, timeout, manual).await,
            },
            Err(NetError::ResolutionFailed(reason)) => {
                let Some(proxy) = self.proxies.name_proxy() else {
                    return Err(NetError::ResolutionFailed(reason));
                };

                let (host, port) = split_host_port(dest)?;
                debug!(%host, proxy = %proxy.endpoint, "deferring resolution to name proxy");
                self.connect_through_proxy(&proxy, host, port.unwrap_or(port_default), timeout)
                    .await
            }
            Err(e) => Err(e),
        }
    }

    /// resolve runs lookup_single off the async worker threads
    async fn resolve(
        &self,
        dest: &str,
        port_default: u16,
        allow_lookup: bool,
        timeout: Duration,
    ) -> Result<ServiceEndpoint> {
        let lookup = self.lookup.clone();
        let name = dest.to_string();
        let resolving = task::spawn_blocking(move || {
            lookup.lookup_single(&name, port_default, allow_lookup)
        });

        let deadline = Deadline::after(timeout, &self.interrupt);
        deadline
            .run(async { resolving.await.map_err(io::Error::other) })
            .await?
            .map_err(|e| NetError::ResolutionFailed(format!("{dest}: lookup task failed: {e}")))?
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("config", &self.config)
            .field("proxies", &self.proxies)
            .finish_non_exhaustive()
    }
}
