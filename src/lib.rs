//! Connection establishment for peer-to-peer nodes
//!
//! Turns a destination (hostname, literal address, onion or i2p name) into a
//! connected `TcpStream`, either directly or tunnelled through a SOCKS5 proxy.
//!
//! - Features:
//!     - Literal/DNS lookup orchestration with a pluggable resolver
//!     - Endpoint (`host:port`, `[v6]:port`) and subnet (`addr/prefix`, `addr/mask`) parsing
//!     - SOCKS5 CONNECT client with No Authentication and Username/Password
//!     - Per-connection random proxy credentials (stream isolation)
//!     - Per-network proxies and a name proxy for proxy-side resolution
//!     - Deadline-bounded, cooperatively interruptible I/O
//! - [SOCKS5 (RFC 1928)](https://datatracker.ietf.org/doc/html/rfc1928)
//! - [Username/Password Authentication (RFC 1929)](https://datatracker.ietf.org/doc/html/rfc1929)
//!
//! # Example
//! ```no_run
//! use netdial::{Connector, NetConfig, Network, ProxyConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connector = Connector::new(NetConfig::default());
//!     let tor = connector.lookup().lookup_numeric("127.0.0.1:9050", 0)?;
//!     connector
//!         .proxies()
//!         .set_proxy(Network::Onion, ProxyConfig::new(tor).with_randomized_credentials(true))?;
//!
//!     let stream = connector.connect("seed.example.org:8333", 8333, true).await?;
//!     println!("connected to {}", stream.peer_addr()?);
//!     Ok(())
//! }
//! ```

pub mod address;
pub mod auth;
pub mod config;
pub mod connect;
pub mod error;
pub mod interrupt;
pub mod lookup;
pub mod netaddr;
pub mod protocol;
pub mod proxy;
pub mod resolver;
pub mod sock;
pub mod socks5;

// Re-export main types at crate root for convenience
pub use auth::ProxyCredentials;
pub use config::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_NAME_LOOKUP, NetConfig};
pub use connect::Connector;
pub use error::NetError;
pub use interrupt::Interrupt;
pub use lookup::NameLookup;
pub use netaddr::{ConnectionDirection, Network, NetworkAddress, ServiceEndpoint, Subnet};
pub use protocol::ReplyCode;
pub use proxy::{ProxyConfig, ProxyRegistry};
pub use resolver::{Resolver, SystemResolver};
pub use sock::{SocketFactory, TcpSocketFactory};
pub use socks5::{Socks5Handshake, Socks5State, socks5_connect};
