use anyhow::{Context, Result};
use clap::Parser;
use netdial::{Connector, NetConfig, Network, ProxyConfig};
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Connect to a node directly or through a SOCKS5 proxy",
    long_about = None
)]
struct Args {
    /// Destination: host, host:port, [ipv6]:port, onion or i2p name
    destination: String,

    /// Port used when the destination carries none
    #[arg(long, default_value_t = 8333)]
    port: u16,

    /// SOCKS5 proxy for IPv4, IPv6 and onion destinations
    #[arg(long)]
    proxy: Option<String>,

    /// SOCKS5 proxy for onion destinations (overrides --proxy)
    #[arg(long)]
    onion: Option<String>,

    /// SOCKS5 proxy for i2p destinations
    #[arg(long)]
    i2p: Option<String>,

    /// SOCKS5 proxy that resolves names on our behalf (defaults to --proxy)
    #[arg(long)]
    name_proxy: Option<String>,

    /// Present random credentials to the proxy on every connection
    #[arg(long)]
    proxy_randomize: bool,

    /// Disallow DNS lookups
    #[arg(long)]
    no_dns: bool,

    /// Connect and negotiation timeout in milliseconds
    #[arg(short, long, default_value_t = 5000)]
    timeout: u64,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse args
    let args = Args::parse();

    // Initialize tracing subscriber
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(level).init();

    let config = NetConfig {
        connect_timeout: Duration::from_millis(args.timeout),
        name_lookup: !args.no_dns,
    };
    let connector = Connector::new(config);

    // Register proxies: --proxy covers the clearnet and onion, the specific
    // flags take precedence
    let proxy_for = |addr: &str| -> Result<ProxyConfig> {
        let endpoint = connector
            .lookup()
            .lookup_numeric(addr, 9050)
            .with_context(|| format!("[ERR] invalid proxy address {addr}"))?;
        Ok(ProxyConfig::new(endpoint).with_randomized_credentials(args.proxy_randomize))
    };

    if let Some(addr) = &args.proxy {
        let proxy = proxy_for(addr)?;
        for network in [Network::Ipv4, Network::Ipv6, Network::Onion] {
            connector.proxies().set_proxy(network, proxy.clone())?;
        }
        if args.name_proxy.is_none() {
            connector.proxies().set_name_proxy(proxy)?;
        }
    }
    if let Some(addr) = &args.onion {
        connector.proxies().set_proxy(Network::Onion, proxy_for(addr)?)?;
    }
    if let Some(addr) = &args.i2p {
        connector.proxies().set_proxy(Network::I2p, proxy_for(addr)?)?;
    }
    if let Some(addr) = &args.name_proxy {
        connector.proxies().set_name_proxy(proxy_for(addr)?)?;
    }

    let stream = connector
        .connect(&args.destination, args.port, true)
        .await
        .with_context(|| format!("[ERR] failed to connect to {}", args.destination))?;

    info!(
        "connected to {}: local {}, peer {}",
        args.destination,
        stream.local_addr()?,
        stream.peer_addr()?
    );

    Ok(())
}
