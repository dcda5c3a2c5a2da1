//! Error types shared by the client and the server.

use std::io;

use thiserror::Error;

use crate::protocol::header::MAX_META_SIZE;
use crate::protocol::request::MAX_REQUEST_SIZE;

/// Errors produced by this crate.
///
/// Semantic kinds (malformed input, size limits, redirects) are separate
/// variants so callers can match on them. When a transport failure caused the
/// semantic error, it is reachable through [`std::error::Error::source`].
#[derive(Debug, Error)]
pub enum Error {
    /// The response header does not match `<code><SP><meta><CRLF>`.
    #[error("malformed server response header: {reason}")]
    InvalidResponse {
        reason: String,
        #[source]
        source: Option<io::Error>,
    },

    /// The response meta did not terminate within the size budget.
    #[error("header is too large: max meta size is {MAX_META_SIZE} bytes")]
    HeaderTooLarge,

    /// The request line could not be accepted.
    #[error("bad request: {0}")]
    BadRequest(#[from] RequestError),

    /// The redirect policy stopped following redirects.
    #[error("too many redirects")]
    TooManyRedirects,

    /// A custom redirect policy refused to follow a redirect.
    #[error("redirect refused: {0}")]
    Redirect(String),

    #[error("parsing URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("URL has no host")]
    MissingHost,

    #[error("connecting to the server {host:?}: {source}")]
    Dial {
        host: String,
        #[source]
        source: io::Error,
    },

    /// The peer's certificate chain does not cover the requested domain.
    #[error("server domain {domain:?} and server TLS domain name don't match")]
    InvalidServerName { domain: String },

    #[error("sending request: {0}")]
    Send(#[source] io::Error),

    /// Write attempted on a closed response writer.
    #[error("multiple Write calls returned no data or error")]
    NoProgress,

    #[error("already closed")]
    AlreadyClosed,

    /// The listener was closed by `Server::stop` or context cancellation.
    #[error("server closed")]
    ServerClosed,

    #[error("creating listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("accepting connection: {0}")]
    Accept(#[source] io::Error),

    #[error("tls: {0}")]
    Tls(#[from] tokio_rustls::rustls::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Reasons a request line is rejected.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("reading request line: {0}")]
    Io(#[from] io::Error),

    /// The size cap was reached before the terminator. Carries an
    /// `UnexpectedEof` error.
    #[error("request line exceeds {MAX_REQUEST_SIZE} bytes")]
    TooLarge(#[source] io::Error),

    #[error("request line is not valid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("parsing request URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("dots in path are not permitted")]
    DotsInPath,
}

impl Error {
    pub(crate) fn invalid_response(reason: impl Into<String>) -> Self {
        Error::InvalidResponse {
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn invalid_response_io(reason: impl Into<String>, source: io::Error) -> Self {
        Error::InvalidResponse {
            reason: reason.into(),
            source: Some(source),
        }
    }

    /// True for errors a peer causes by exceeding a size budget.
    pub fn is_size_limit(&self) -> bool {
        matches!(
            self,
            Error::HeaderTooLarge | Error::BadRequest(RequestError::TooLarge(_))
        )
    }
}

impl RequestError {
    /// True when the request line ended (or was cut off) before its terminator.
    pub fn is_unexpected_eof(&self) -> bool {
        match self {
            RequestError::Io(e) | RequestError::TooLarge(e) => {
                e.kind() == io::ErrorKind::UnexpectedEof
            }
            _ => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
