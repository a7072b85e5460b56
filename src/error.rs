use crate::protocol::ReplyCode;
use std::io;
use thiserror::Error;

/// NetError is the single error type reported by every lookup and connect
/// operation in this crate
#[derive(Debug, Error)]
pub enum NetError {
    /// Malformed or empty name, oversized domain, bad port or subnet syntax
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The resolver returned nothing usable or failed
    #[error("resolution failed: {0}")]
    ResolutionFailed(String),

    #[error("connection timed out")]
    ConnectTimeout,

    /// A direct TCP connect was refused or the destination was unreachable
    #[error("connection to {addr} failed: {source}")]
    ConnectRefusedOrUnreachable {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The proxy itself could not be reached. No SOCKS bytes were sent.
    #[error("proxy {proxy} unreachable: {source}")]
    ProxyUnreachable {
        proxy: String,
        #[source]
        source: Box<NetError>,
    },

    #[error("proxy authentication failed: {0}")]
    ProxyAuthFailed(String),

    #[error("proxy protocol error: {0}")]
    ProxyProtocol(String),

    /// The proxy answered the CONNECT request with a nonzero reply code
    #[error("proxy refused connection: {desc} (0x{0:02x})", desc = refused_description(.0))]
    ProxyRefused(u8),

    #[error("interrupted")]
    Interrupted,

    /// Transport error on an established stream that is not an orderly close
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// NetError implementation block
impl NetError {
    /// proxy_connection_failed reports whether the failure happened while reaching
    /// the proxy itself, as opposed to the proxy rejecting the destination
    pub fn proxy_connection_failed(&self) -> bool {
        matches!(self, NetError::ProxyUnreachable { .. })
    }

    /// reply_code returns the SOCKS5 reply code for a ProxyRefused error
    pub fn reply_code(&self) -> Option<ReplyCode> {
        match self {
            NetError::ProxyRefused(code) => ReplyCode::from_byte(*code),
            _ => None,
        }
    }
}

fn refused_description(code: &u8) -> &'static str {
    ReplyCode::describe(*code)
}

pub type Result<T> = std::result::Result<T, NetError>;
