use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::pki_types::CertificateDer;
use tokio_rustls::server::TlsStream;

use crate::transport::{Incoming, Listener, Transport};

/// Runs the server side of the TLS handshake on every accepted connection.
///
/// The handshake is deferred into the returned [`Incoming`] so the accept
/// loop never blocks on a slow client.
pub struct TlsListener<L> {
    inner: L,
    acceptor: TlsAcceptor,
}

impl<L> TlsListener<L> {
    pub fn new(inner: L, acceptor: TlsAcceptor) -> Self {
        Self { inner, acceptor }
    }
}

impl<L> Listener for TlsListener<L>
where
    L: Listener,
{
    type Stream = TlsStream<L::Stream>;

    async fn accept(&mut self) -> io::Result<Incoming<Self::Stream>> {
        let Incoming {
            remote_addr,
            handshake,
        } = self.inner.accept().await?;
        let acceptor = self.acceptor.clone();

        Ok(Incoming {
            remote_addr,
            handshake: Box::pin(async move {
                let stream = handshake.await?;
                acceptor.accept(stream).await
            }),
        })
    }
}

/// Caps the number of simultaneously open connections.
///
/// `accept` waits for a free slot before taking the next connection off the
/// inner listener. The slot is released when the connection is dropped.
pub struct LimitListener<L> {
    inner: L,
    slots: Arc<Semaphore>,
}

impl<L> LimitListener<L> {
    pub fn new(inner: L, max_connections: usize) -> Self {
        Self {
            inner,
            slots: Arc::new(Semaphore::new(max_connections)),
        }
    }

    /// Free connection slots.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }
}

impl<L> Listener for LimitListener<L>
where
    L: Listener,
{
    type Stream = Limited<L::Stream>;

    async fn accept(&mut self) -> io::Result<Incoming<Self::Stream>> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| io::Error::other("connection limiter closed"))?;
        let Incoming {
            remote_addr,
            handshake,
        } = self.inner.accept().await?;

        Ok(Incoming {
            remote_addr,
            handshake: Box::pin(async move {
                let stream = handshake.await?;
                Ok(Limited {
                    inner: stream,
                    _permit: permit,
                })
            }),
        })
    }
}

/// Connection holding one slot of a [`LimitListener`].
#[derive(Debug)]
pub struct Limited<S> {
    inner: S,
    _permit: OwnedSemaphorePermit,
}

impl<S> AsyncRead for Limited<S>
where
    S: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl<S> AsyncWrite for Limited<S>
where
    S: AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

impl<S> Transport for Limited<S>
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
    use tokio::net::{TcpListener, TcpStream};

    #[tokio::test]
    async fn limit_blocks_until_a_slot_frees() {
        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = tcp.local_addr().unwrap();
        let mut listener = LimitListener::new(tcp, 1);

        let _c1 = TcpStream::connect(addr).await.unwrap();
        let _c2 = TcpStream::connect(addr).await.unwrap();

        let first = listener.accept().await.unwrap().handshake.await.unwrap();
        assert_eq!(listener.available(), 0);

        let blocked = tokio::time::timeout(Duration::from_millis(50), listener.accept()).await;
        assert!(blocked.is_err());

        drop(first);
        let second = tokio::time::timeout(Duration::from_secs(1), listener.accept()).await;
        assert!(second.is_ok());
    }
}
