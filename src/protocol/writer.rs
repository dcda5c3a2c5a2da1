use tokio::io::AsyncWrite;

use crate::error::{Error, Result};
use crate::protocol::buffer::{BufferPool, BufferedSink};
use crate::protocol::header::{MIME_GEMTEXT, format_header};
use crate::protocol::status::StatusCode;

/// Lifecycle of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Nothing written yet
    Fresh,
    /// Status line buffered, body may follow
    StatusWritten,
    /// Flushed and closed, every further write fails
    Closed,
}

/// Server side writer for exactly one response.
///
/// The first call to [`write`](Self::write) or [`close`](Self::close) emits a
/// `20 text/gemini` status line if the handler has not written one. A
/// non-success status closes the response right away since those classes
/// carry no body.
#[derive(Debug)]
pub struct ResponseWriter {
    state: WriterState,
    status: StatusCode,
    sink: BufferedSink,
}

impl ResponseWriter {
    pub fn new<W>(sink: W, pool: BufferPool) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            state: WriterState::Fresh,
            status: StatusCode::Undefined,
            sink: BufferedSink::new(sink, pool),
        }
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Status that was written, `Undefined` while still fresh.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_closed(&self) -> bool {
        self.state == WriterState::Closed
    }

    /// Writes the status line. Does nothing once a status has been written.
    ///
    /// An empty meta on `Success` becomes `text/gemini`. CR and LF in `meta`
    /// are replaced by a tab.
    pub async fn write_status(&mut self, code: StatusCode, meta: &str) -> Result<()> {
        if self.state != WriterState::Fresh {
            return Ok(());
        }

        let meta = if code == StatusCode::Success && meta.is_empty() {
            MIME_GEMTEXT.to_string()
        } else {
            sanitize_meta(meta)
        };

        self.state = WriterState::StatusWritten;
        self.status = code;
        let written = self
            .sink
            .write_all(format_header(code, &meta).as_bytes())
            .await;

        if code != StatusCode::Success {
            let closed = self.close_sink().await;
            written?;
            return closed;
        }

        Ok(written?)
    }

    /// Writes body bytes, emitting the default success status first if needed.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.state == WriterState::Closed {
            return Err(Error::NoProgress);
        }
        self.write_status(StatusCode::Success, MIME_GEMTEXT).await?;
        if self.state == WriterState::Closed {
            return Err(Error::NoProgress);
        }
        self.sink.write_all(data).await?;
        Ok(data.len())
    }

    pub async fn write_str(&mut self, text: &str) -> Result<usize> {
        self.write(text.as_bytes()).await
    }

    /// Flushes buffered bytes and closes the underlying stream.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == WriterState::Closed {
            return Err(Error::AlreadyClosed);
        }
        self.write_status(StatusCode::Success, MIME_GEMTEXT).await?;
        if self.state == WriterState::Closed {
            return Ok(());
        }
        self.close_sink().await
    }

    async fn close_sink(&mut self) -> Result<()> {
        self.state = WriterState::Closed;
        Ok(self.sink.close().await?)
    }
}

/// Protocol lines are single-line: every `\r\n`, `\r` or `\n` becomes a tab.
pub fn sanitize_meta(meta: &str) -> String {
    let mut out = String::with_capacity(meta.len());
    let mut chars = meta.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                chars.next_if_eq(&'\n');
                out.push('\t');
            }
            '\n' => out.push('\t'),
            _ => out.push(c),
        }
    }
    out
}
