use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader, ReadBuf};

use crate::error::{Error, Result};
use crate::protocol::status::StatusCode;
use crate::transport::{BoxStream, DeadlineStream};

pub(crate) type BodyReader = BufReader<DeadlineStream<BoxStream>>;

/// Response to a fetch: status, meta and the body as a readable stream.
///
/// The body is whatever follows the header until the server closes the
/// connection. Call [`close`](Self::close) when done; dropping an open
/// response closes the connection without a TLS close notification.
pub struct Response {
    status: StatusCode,
    meta: String,
    body: Option<BodyReader>,
}

impl Response {
    pub(crate) fn new(status: StatusCode, meta: String, body: BodyReader) -> Self {
        Self {
            status,
            meta,
            body: Some(body),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// MIME type for `20`, prompt for `1x`, target for `3x`, error text
    /// otherwise.
    pub fn meta(&self) -> &str {
        &self.meta
    }

    pub fn is_closed(&self) -> bool {
        self.body.is_none()
    }

    /// Reads the rest of the body.
    pub async fn bytes(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Reads the rest of the body as UTF-8 text.
    pub async fn text(&mut self) -> Result<String> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes)
            .map_err(|e| Error::invalid_response(format!("body is not UTF-8: {e}")))
    }

    /// Shuts the connection down. A second call fails with
    /// [`Error::AlreadyClosed`].
    pub async fn close(&mut self) -> Result<()> {
        match self.body.take() {
            Some(mut body) => Ok(body.get_mut().shutdown().await?),
            None => Err(Error::AlreadyClosed),
        }
    }
}

impl AsyncRead for Response {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().body {
            Some(body) => Pin::new(body).poll_read(cx, buf),
            None => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "response is closed",
            ))),
        }
    }
}

impl Drop for Response {
    fn drop(&mut self) {
        if self.body.is_some() {
            tracing::debug!(status = %self.status, "Response dropped without close");
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("meta", &self.meta)
            .field("closed", &self.is_closed())
            .finish()
    }
}
