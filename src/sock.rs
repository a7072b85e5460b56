use crate::netaddr::{NetworkAddress, ServiceEndpoint};
use std::io;
use tokio::net::TcpSocket;

/// SocketFactory creates an unconnected TCP socket in the address family of
/// `endpoint`. Swappable so tests can inject failures.
pub trait SocketFactory: Send + Sync {
    fn create(&self, endpoint: &ServiceEndpoint) -> io::Result<TcpSocket>;
}

impl<F> SocketFactory for F
where
    F: Fn(&ServiceEndpoint) -> io::Result<TcpSocket> + Send + Sync,
{
    fn create(&self, endpoint: &ServiceEndpoint) -> io::Result<TcpSocket> {
        self(endpoint)
    }
}

/// TcpSocketFactory creates non-blocking tokio sockets with TCP_NODELAY set
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpSocketFactory;

impl SocketFactory for TcpSocketFactory {
    fn create(&self, endpoint: &ServiceEndpoint) -> io::Result<TcpSocket> {
        let socket = match endpoint.addr {
            NetworkAddress::Ipv4(_) => TcpSocket::new_v4()?,
            NetworkAddress::Ipv6(_) => TcpSocket::new_v6()?,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("no socket family for {endpoint}"),
                ));
            }
        };

        // Small protocol messages should not wait on Nagle
        socket.set_nodelay(true)?;
        Ok(socket)
    }
}
