//! Byte-stream seams between the protocol engine and the network.
//!
//! The engine only needs a few things from a transport: a bidirectional
//! stream, the peer's address, an optional peer certificate chain and a way to
//! bound I/O by a deadline. TLS setup lives in [`crate::tls`].

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Instant, Sleep};
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName};

use crate::BoxFuture;

/// A connected stream the server can read a request from and write a
/// response to.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    fn remote_addr(&self) -> String;

    /// Certificate chain presented by the peer, if the transport is secured.
    fn peer_identity(&self) -> Vec<CertificateDer<'static>> {
        Vec::new()
    }
}

/// Any stream a [`Dialer`] can hand back to the client.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub type BoxStream = Box<dyn Stream>;

/// Pending connection setup (e.g. a TLS handshake) for an accepted socket.
/// It runs on the connection's own task, never on the accept loop.
pub type Handshake<S> = Pin<Box<dyn Future<Output = io::Result<S>> + Send>>;

/// A connection taken off a listener. Its setup has not run yet, so the
/// peer address is captured from the raw socket.
pub struct Incoming<S> {
    pub remote_addr: String,
    pub handshake: Handshake<S>,
}

impl<S: Transport> Incoming<S> {
    /// A connection that needs no setup.
    pub fn ready(stream: S) -> Self {
        Self {
            remote_addr: stream.remote_addr(),
            handshake: Box::pin(std::future::ready(Ok(stream))),
        }
    }
}

impl<S> fmt::Debug for Incoming<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Incoming")
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}

/// Source of incoming connections.
pub trait Listener: Send + 'static {
    type Stream: Transport;

    /// Waits for the next connection. An error is terminal for the serve loop.
    fn accept(&mut self) -> impl Future<Output = io::Result<Incoming<Self::Stream>>> + Send;
}

/// Opens client connections.
pub trait Dialer: Send + Sync {
    /// Connects to `addr` (`host:port`). `domain` is the name the peer must
    /// prove it serves.
    fn dial<'a>(
        &'a self,
        ctx: &'a crate::Context,
        addr: &'a str,
        domain: &'a str,
    ) -> BoxFuture<'a, io::Result<BoxStream>>;
}

/// TCP plus TLS, the default client transport.
#[derive(Clone)]
pub struct TlsDialer {
    connector: TlsConnector,
}

impl TlsDialer {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self {
            connector: TlsConnector::from(config),
        }
    }
}

impl Dialer for TlsDialer {
    fn dial<'a>(
        &'a self,
        _ctx: &'a crate::Context,
        addr: &'a str,
        domain: &'a str,
    ) -> BoxFuture<'a, io::Result<BoxStream>> {
        Box::pin(async move {
            let name = ServerName::try_from(domain.to_string())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            let tcp = TcpStream::connect(addr).await?;
            let tls = self.connector.connect(name, tcp).await?;
            tracing::debug!(addr = %addr, "connected");
            Ok(Box::new(tls) as BoxStream)
        })
    }
}

impl Transport for TcpStream {
    fn remote_addr(&self) -> String {
        self.peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default()
    }
}

impl Transport for DuplexStream {
    fn remote_addr(&self) -> String {
        "pipe".to_string()
    }
}

impl<S> Transport for tokio_rustls::server::TlsStream<S>
where
    S: Transport,
{
    fn remote_addr(&self) -> String {
        self.get_ref().0.remote_addr()
    }

    fn peer_identity(&self) -> Vec<CertificateDer<'static>> {
        self.get_ref()
            .1
            .peer_certificates()
            .map(|certs| certs.to_vec())
            .unwrap_or_default()
    }
}

impl Listener for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<Incoming<TcpStream>> {
        let (stream, _) = TcpListener::accept(self).await?;
        Ok(Incoming::ready(stream))
    }
}

/// Stream wrapper that fails every read and write with
/// [`io::ErrorKind::TimedOut`] once its deadline has passed.
#[derive(Debug)]
pub struct DeadlineStream<S> {
    inner: S,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl<S> DeadlineStream<S> {
    /// Must be called from within a tokio runtime when `deadline` is set.
    pub fn new(inner: S, deadline: Option<Instant>) -> Self {
        Self {
            inner,
            sleep: deadline.map(|deadline| Box::pin(tokio::time::sleep_until(deadline))),
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn poll_deadline(&mut self, cx: &mut Context<'_>) -> io::Result<()> {
        if let Some(sleep) = self.sleep.as_mut() {
            if sleep.as_mut().poll(cx).is_ready() {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "i/o deadline exceeded",
                ));
            }
        }
        Ok(())
    }
}

impl<S> AsyncRead for DeadlineStream<S>
where
    S: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Err(e) = this.poll_deadline(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S> AsyncWrite for DeadlineStream<S>
where
    S: AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if let Err(e) = this.poll_deadline(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Err(e) = this.poll_deadline(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Err(e) = this.poll_deadline(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

impl<S> Transport for DeadlineStream<S>
where
    S: Transport,
{
    fn remote_addr(&self) -> String {
        self.inner.remote_addr()
    }

    fn peer_identity(&self) -> Vec<CertificateDer<'static>> {
        self.inner.peer_identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn read_fails_after_deadline() {
        let (client, _server) = tokio::io::duplex(64);
        let deadline = Instant::now() + Duration::from_millis(20);
        let mut stream = DeadlineStream::new(client, Some(deadline));

        let mut buf = [0u8; 8];
        let err = stream.read(&mut buf).await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn no_deadline_passes_through() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut stream = DeadlineStream::new(client, None);

        tokio::io::AsyncWriteExt::write_all(&mut server, b"hi").await.unwrap();
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).await.unwrap();

        assert_eq!(&buf, b"hi");
    }
}
