use crate::error::NetError;
use crate::interrupt::Deadline;
use crate::protocol::{AuthMethod, MAX_FIELD_LEN, USERPASS_VERSION, Version};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// ProxyCredentials holds username/password credentials presented to a SOCKS5
/// proxy (RFC 1929)
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
}

/// ProxyCredentials implementation block
impl ProxyCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// random draws fresh credentials for one connection. A proxy that isolates
    /// streams by credentials (Tor's IsolateSOCKSAuth) will then put every
    /// connection on its own circuit.
    pub fn random() -> Self {
        Self {
            username: format!("{:016x}", rand::random::<u64>()),
            password: format!("{:016x}", rand::random::<u64>()),
        }
    }

    /// validate checks both fields fit their single length byte
    pub fn validate(&self) -> Result<(), NetError> {
        if self.username.len() > MAX_FIELD_LEN || self.password.len() > MAX_FIELD_LEN {
            return Err(NetError::InvalidInput(
                "proxy username or password too long".into(),
            ));
        }
        Ok(())
    }
}

// Passwords stay out of logs
impl std::fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// greeting builds the client hello offering no-auth, plus username/password
/// when credentials are available
pub(crate) fn greeting(auth: Option<&ProxyCredentials>) -> Vec<u8> {
    // ClientHello format
    // +----+----------+----------+
    // |VER | NMETHODS | METHODS  |
    // +----+----------+----------+
    // | 1  |    1     | 1 to 255 |
    // +----+----------+----------+
    match auth {
        Some(_) => vec![
            Version::SOCKS5 as u8,
            2,
            AuthMethod::NoAuth as u8,
            AuthMethod::UserPass as u8,
        ],
        None => vec![Version::SOCKS5 as u8, 1, AuthMethod::NoAuth as u8],
    }
}

/// check_method_choice validates the proxy's method selection reply and returns
/// the selected method
pub(crate) fn check_method_choice(
    reply: [u8; 2],
    auth: Option<&ProxyCredentials>,
) -> Result<AuthMethod, NetError> {
    // ServerChoice method selection reply format
    // +----+--------+
    // |VER | METHOD |
    // +----+--------+
    // | 1  |   1    |
    // +----+--------+
    if reply[0] != Version::SOCKS5 as u8 {
        return Err(NetError::ProxyProtocol(format!(
            "proxy failed to initialize: version 0x{:02x}",
            reply[0]
        )));
    }

    match AuthMethod::from_byte(reply[1]) {
        Some(AuthMethod::NoAuth) => Ok(AuthMethod::NoAuth),
        Some(AuthMethod::UserPass) if auth.is_some() => Ok(AuthMethod::UserPass),
        Some(AuthMethod::NoAcceptable) => Err(NetError::ProxyAuthFailed(
            "proxy accepted none of the offered methods".into(),
        )),
        _ => Err(NetError::ProxyProtocol(format!(
            "proxy requested wrong authentication method 0x{:02x}",
            reply[1]
        ))),
    }
}

/// authenticate_userpass runs the RFC 1929 username/password sub-negotiation
pub(crate) async fn authenticate_userpass<S>(
    stream: &mut S,
    creds: &ProxyCredentials,
    deadline: &Deadline<'_>,
) -> Result<(), NetError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Client Username/Password Request
    // +----+------+----------+------+----------+
    // |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
    // +----+------+----------+------+----------+
    // | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
    // +----+------+----------+------+----------+
    let mut request = Vec::with_capacity(3 + creds.username.len() + creds.password.len());
    request.push(USERPASS_VERSION);
    request.push(creds.username.len() as u8);
    request.extend_from_slice(creds.username.as_bytes());
    request.push(creds.password.len() as u8);
    request.extend_from_slice(creds.password.as_bytes());
    deadline.send_all(stream, &request).await?;

    debug!(username = %creds.username, "SOCKS5 sending proxy authentication");

    // Username/Password Server response
    // +----+--------+
    // |VER | STATUS |
    // +----+--------+
    // | 1  |   1    |
    // +----+--------+
    let mut reply = [0u8; 2];
    deadline.recv_exact(stream, &mut reply).await?;

    if reply[0] != USERPASS_VERSION {
        return Err(NetError::ProxyProtocol(format!(
            "unexpected authentication version 0x{:02x}",
            reply[0]
        )));
    }
    if reply[1] != 0x00 {
        return Err(NetError::ProxyAuthFailed(format!(
            "proxy authentication unsuccessful (status 0x{:02x})",
            reply[1]
        )));
    }

    Ok(())
}
