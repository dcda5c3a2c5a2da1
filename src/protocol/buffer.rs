use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Default size of a response write buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024;

/// Idle buffers kept around for reuse.
const MAX_IDLE_BUFFERS: usize = 64;

/// Pool of write buffers shared by every response of a server.
///
/// A buffer handed out by [`BufferPool::acquire`] is empty and owned by a
/// single response until it is released.
#[derive(Debug, Clone)]
pub struct BufferPool {
    idle: Arc<Mutex<Vec<BytesMut>>>,
    buffer_size: usize,
}

impl BufferPool {
    /// `buffer_size == 0` falls back to [`DEFAULT_BUFFER_SIZE`].
    pub fn new(buffer_size: usize) -> Self {
        let buffer_size = if buffer_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            buffer_size
        };
        Self {
            idle: Arc::new(Mutex::new(Vec::new())),
            buffer_size,
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn acquire(&self) -> BytesMut {
        let reused = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        match reused {
            Some(buf) => buf,
            None => BytesMut::with_capacity(self.buffer_size),
        }
    }

    pub fn release(&self, mut buf: BytesMut) {
        buf.clear();
        if buf.capacity() < self.buffer_size {
            return;
        }
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < MAX_IDLE_BUFFERS {
            idle.push(buf);
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

/// Buffered writer over a boxed sink with flush-on-close semantics.
///
/// Closing flushes, shuts the sink down, drops it and returns the buffer to
/// its pool.
pub struct BufferedSink {
    buf: Option<BytesMut>,
    sink: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    pool: BufferPool,
}

impl BufferedSink {
    pub fn new<W>(sink: W, pool: BufferPool) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            buf: Some(pool.acquire()),
            sink: Some(Box::new(sink)),
            pool,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_none()
    }

    /// Number of bytes waiting in the buffer.
    pub fn buffered(&self) -> usize {
        self.buf.as_ref().map_or(0, BytesMut::len)
    }

    pub async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let limit = self.pool.buffer_size();
        if self.buffered() + data.len() > limit {
            self.flush_buffer().await?;
        }

        if data.len() >= limit {
            return self.sink()?.write_all(data).await;
        }

        match &mut self.buf {
            Some(buf) => {
                buf.extend_from_slice(data);
                Ok(())
            }
            None => Err(closed()),
        }
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer().await?;
        self.sink()?.flush().await
    }

    pub async fn close(&mut self) -> io::Result<()> {
        if self.is_closed() {
            return Err(closed());
        }

        let flushed = self.flush().await;
        let shutdown = match self.sink.take() {
            Some(mut sink) => sink.shutdown().await,
            None => Ok(()),
        };
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }

        flushed.and(shutdown)
    }

    async fn flush_buffer(&mut self) -> io::Result<()> {
        let Some(buf) = self.buf.as_mut() else {
            return Err(closed());
        };
        if buf.is_empty() {
            return Ok(());
        }
        let Some(sink) = self.sink.as_mut() else {
            return Err(closed());
        };
        sink.write_all(&buf[..]).await?;
        buf.clear();
        Ok(())
    }

    fn sink(&mut self) -> io::Result<&mut (dyn AsyncWrite + Send + Unpin)> {
        match &mut self.sink {
            Some(sink) => Ok(sink.as_mut()),
            None => Err(closed()),
        }
    }
}

impl Drop for BufferedSink {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}

impl fmt::Debug for BufferedSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedSink")
            .field("buffered", &self.buffered())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "sink is closed")
}
