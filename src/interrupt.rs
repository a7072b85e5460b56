use crate::error::NetError;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, timeout};

/// Longest a single blocking step waits before re-checking the interrupt flag
pub const MAX_WAIT_FOR_IO: Duration = Duration::from_millis(100);

/// Interrupt is a process-wide cooperative cancellation flag. It is set once at
/// shutdown and never cleared; every blocking connect and SOCKS5 step polls it.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

/// Interrupt implementation block
impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// set requests that all in-flight and future negotiations abort
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Deadline bounds one logical operation (a connect or a SOCKS5 negotiation)
/// across all of its blocking steps
pub(crate) struct Deadline<'a> {
    /// None when the timeout is too large to represent
    at: Option<Instant>,
    interrupt: &'a Interrupt,
}

/// Deadline implementation block
impl<'a> Deadline<'a> {
    /// after starts a deadline `timeout` from now. `Duration::MAX` means no
    /// deadline, only the interrupt ends the wait.
    pub(crate) fn after(timeout: Duration, interrupt: &'a Interrupt) -> Self {
        Self {
            at: Instant::now().checked_add(timeout),
            interrupt,
        }
    }

    /// check fails if the interrupt is set or the deadline has passed
    pub(crate) fn check(&self) -> Result<(), NetError> {
        if self.interrupt.is_set() {
            return Err(NetError::Interrupted);
        }
        if self.at.is_some_and(|at| Instant::now() >= at) {
            return Err(NetError::ConnectTimeout);
        }
        Ok(())
    }

    /// run drives `fut` to completion in slices of at most MAX_WAIT_FOR_IO,
    /// checking the interrupt flag and deadline between slices. The outer result
    /// carries interrupt/timeout, the inner one the operation's own io result.
    pub(crate) async fn run<F, T>(&self, fut: F) -> Result<io::Result<T>, NetError>
    where
        F: Future<Output = io::Result<T>>,
    {
        tokio::pin!(fut);
        loop {
            self.check()?;
            let wait = match self.at {
                Some(at) => at.saturating_duration_since(Instant::now()).min(MAX_WAIT_FOR_IO),
                None => MAX_WAIT_FOR_IO,
            };
            if let Ok(res) = timeout(wait, &mut fut).await {
                return Ok(res);
            }
        }
    }

    /// recv_exact reads exactly `buf.len()` bytes from a proxy stream
    pub(crate) async fn recv_exact<S>(
        &self,
        stream: &mut S,
        buf: &mut [u8],
    ) -> Result<(), NetError>
    where
        S: AsyncRead + Unpin,
    {
        self.run(stream.read_exact(buf)).await?.map_err(stream_error)?;
        Ok(())
    }

    /// send_all writes the whole of `buf` to a proxy stream
    pub(crate) async fn send_all<S>(&self, stream: &mut S, buf: &[u8]) -> Result<(), NetError>
    where
        S: AsyncWrite + Unpin,
    {
        self.run(stream.write_all(buf)).await?.map_err(stream_error)?;
        self.run(stream.flush()).await?.map_err(stream_error)
    }
}

/// stream_error maps an orderly close mid-negotiation to a protocol error
fn stream_error(e: io::Error) -> NetError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            NetError::ProxyProtocol("proxy closed the connection".into())
        }
        _ => NetError::Io(e),
    }
}
