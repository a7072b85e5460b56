use std::time::Duration;

/// Default timeout for a connect or a SOCKS5 negotiation (`-timeout`)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Whether names may be resolved through DNS by default (`-dns`)
pub const DEFAULT_NAME_LOOKUP: bool = true;

/// NetConfig holds the connection policy shared by every connect attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetConfig {
    /// Bound on each connect and each SOCKS5 negotiation
    pub connect_timeout: Duration,

    /// Allow DNS lookups of destination names
    pub name_lookup: bool,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            name_lookup: DEFAULT_NAME_LOOKUP,
        }
    }
}
