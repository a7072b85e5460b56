//! SOCKS5 client negotiation (RFC 1928 CONNECT, RFC 1929 username/password)
//! over a stream that is already connected to the proxy.
//!
//! ```text
//! Start -> Greeting -> MethodSelected -> [AuthSubnegotiation]
//!       -> ConnectRequestSent -> ReplyReceived -> Established | Failed
//! ```

use crate::address::{DestAddress, read_bound_address};
use crate::auth::{ProxyCredentials, authenticate_userpass, check_method_choice, greeting};
use crate::error::NetError;
use crate::interrupt::{Deadline, Interrupt};
use crate::protocol::{AuthMethod, Command, RSV, ReplyCode, Version};
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// Socks5State tracks how far a negotiation got
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Socks5State {
    Start,
    Greeting,
    MethodSelected,
    AuthSubnegotiation,
    ConnectRequestSent,
    ReplyReceived,
    Established,
    Failed,
}

impl fmt::Display for Socks5State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Socks5State::Start => "start",
            Socks5State::Greeting => "greeting",
            Socks5State::MethodSelected => "method_selected",
            Socks5State::AuthSubnegotiation => "auth_subnegotiation",
            Socks5State::ConnectRequestSent => "connect_request_sent",
            Socks5State::ReplyReceived => "reply_received",
            Socks5State::Established => "established",
            Socks5State::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Socks5Handshake drives one negotiation. The stream becomes a transparent
/// tunnel to the destination once the handshake reaches Established.
pub struct Socks5Handshake<'a, S> {
    stream: &'a mut S,
    deadline: Deadline<'a>,
    state: Socks5State,
}

/// Socks5Handshake implementation block
impl<'a, S> Socks5Handshake<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// new prepares a negotiation bounded by `timeout` as a whole
    pub fn new(stream: &'a mut S, timeout: Duration, interrupt: &'a Interrupt) -> Self {
        Self {
            stream,
            deadline: Deadline::after(timeout, interrupt),
            state: Socks5State::Start,
        }
    }

    pub fn state(&self) -> Socks5State {
        self.state
    }

    /// connect negotiates a CONNECT to `dest:port`, authenticating with `auth`
    /// when the proxy asks for it
    pub async fn connect(
        &mut self,
        dest: &str,
        port: u16,
        auth: Option<&ProxyCredentials>,
    ) -> Result<(), NetError> {
        let result = self.negotiate(dest, port, auth).await;
        match &result {
            Ok(()) => {
                self.state = Socks5State::Established;
                debug!(%dest, port, "SOCKS5 connected");
            }
            Err(e) => {
                debug!(%dest, port, state = %self.state, error = %e, "SOCKS5 negotiation failed");
                self.state = Socks5State::Failed;
            }
        }
        result
    }

    async fn negotiate(
        &mut self,
        dest: &str,
        port: u16,
        auth: Option<&ProxyCredentials>,
    ) -> Result<(), NetError> {
        // Everything is validated before the first byte goes out
        let target = DestAddress::from_host(dest)?;
        if let Some(creds) = auth {
            creds.validate()?;
        }
        self.deadline.check()?;

        debug!(%dest, port, "SOCKS5 connecting");

        // Greeting
        self.state = Socks5State::Greeting;
        self.deadline
            .send_all(self.stream, &greeting(auth))
            .await?;

        // Method selection
        let mut choice = [0u8; 2];
        self.deadline.recv_exact(self.stream, &mut choice).await?;
        self.state = Socks5State::MethodSelected;

        if check_method_choice(choice, auth)? == AuthMethod::UserPass {
            self.state = Socks5State::AuthSubnegotiation;
            // check_method_choice only selects UserPass when credentials exist
            if let Some(creds) = auth {
                authenticate_userpass(self.stream, creds, &self.deadline).await?;
            }
        }

        self.send_connect_request(&target, port).await?;
        self.read_reply().await
    }

    async fn send_connect_request(
        &mut self,
        target: &DestAddress,
        port: u16,
    ) -> Result<(), NetError> {
        // SOCKS5 request format
        // +----+-----+-------+------+----------+----------+
        // |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
        // +----+-----+-------+------+----------+----------+
        // | 1  |  1  | X'00' |  1   | Variable |    2     |
        // +----+-----+-------+------+----------+----------+
        let mut request = vec![Version::SOCKS5 as u8, Command::Connect as u8, RSV];
        target.encode(port, &mut request);

        self.deadline.send_all(self.stream, &request).await?;
        self.state = Socks5State::ConnectRequestSent;
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<(), NetError> {
        // SOCKS5 reply format
        // +----+-----+-------+------+----------+----------+
        // |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
        // +----+-----+-------+------+----------+----------+
        // | 1  |  1  | X'00' |  1   | Variable |    2     |
        // +----+-----+-------+------+----------+----------+
        let mut head = [0u8; 3];
        self.deadline.recv_exact(self.stream, &mut head).await?;
        self.state = Socks5State::ReplyReceived;

        if head[0] != Version::SOCKS5 as u8 {
            return Err(NetError::ProxyProtocol(format!(
                "proxy failed to accept request: version 0x{:02x}",
                head[0]
            )));
        }
        if head[1] != ReplyCode::Succeeded as u8 {
            return Err(NetError::ProxyRefused(head[1]));
        }
        if head[2] != RSV {
            return Err(NetError::ProxyProtocol(
                "malformed proxy response: nonzero reserved byte".into(),
            ));
        }

        // Bound address is unused but must be drained
        let mut atyp = [0u8; 1];
        self.deadline.recv_exact(self.stream, &mut atyp).await?;
        let bound = read_bound_address(self.stream, atyp[0], &self.deadline).await?;

        debug!(%bound, "SOCKS5 proxy bound address");
        Ok(())
    }
}

/// socks5_connect negotiates a tunnel to `dest:port` over `stream`, which must
/// already be connected to the proxy
pub async fn socks5_connect<S>(
    stream: &mut S,
    dest: &str,
    port: u16,
    auth: Option<&ProxyCredentials>,
    timeout: Duration,
    interrupt: &Interrupt,
) -> Result<(), NetError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    Socks5Handshake::new(stream, timeout, interrupt)
        .connect(dest, port, auth)
        .await
}
