use std::collections::HashMap;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_rustls::rustls::pki_types::CertificateDer;
use url::Url;

use crate::error::{RequestError, Result};
use crate::handlers::query_keys;
use crate::transport::Transport;

/// Maximum size of an incoming request line, terminator included.
pub const MAX_REQUEST_SIZE: usize = 1024 + "\r\n".len();

/// A parsed request line with the connection details the server knows about
/// its peer.
#[derive(Debug, Clone)]
pub struct Request {
    /// Absolute target URL. Its path is never empty.
    pub url: Url,
    /// Remote address of the peer as reported by the transport
    pub remote_addr: String,
    /// Peer certificate chain, empty when the client presented none
    pub certificates: Vec<CertificateDer<'static>>,
    /// Path segments captured by the router
    pub params: HashMap<String, String>,
}

impl Request {
    pub fn new(url: Url, remote_addr: impl Into<String>) -> Self {
        Self {
            url,
            remote_addr: remote_addr.into(),
            certificates: Vec::new(),
            params: HashMap::new(),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }

    pub fn query(&self) -> Option<&str> {
        self.url.query()
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    pub fn certificates(&self) -> &[CertificateDer<'static>] {
        &self.certificates
    }

    /// Value of a path segment captured under `name` by the router.
    ///
    /// ```
    /// # use gemwire::Request;
    /// let mut req = Request::new("gemini://localhost/hello/world".parse().unwrap(), "");
    /// req.params.insert("name".into(), "world".into());
    /// assert_eq!(req.param("name"), Some("world"));
    /// assert_eq!(req.param("boop"), None);
    /// ```
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Canonical query values: keys without a value, sorted.
    pub fn query_keys(&self) -> Vec<String> {
        query_keys(&self.url)
    }
}

/// Reads and validates one request line (`<absolute-URI>\r\n`).
///
/// At most [`MAX_REQUEST_SIZE`] bytes are read from `reader`, one at a time,
/// so nothing past the terminating `\n` is consumed. A line that ends, or
/// reaches the cap, before its terminator is rejected with an
/// `UnexpectedEof` cause. Paths with `.` or `..` segments are rejected as
/// sent, before any normalization, and an empty path becomes `/`.
pub async fn parse_request<R>(reader: &mut R, remote_addr: impl Into<String>) -> Result<Request>
where
    R: AsyncRead + Unpin,
{
    let line = read_request_line(reader).await?;

    let text = std::str::from_utf8(&line).map_err(RequestError::Encoding)?;
    let mut url = Url::parse(text).map_err(RequestError::Url)?;

    if !is_valid_path(raw_path(text)) {
        return Err(RequestError::DotsInPath.into());
    }

    if url.path().is_empty() {
        url.set_path("/");
    }

    Ok(Request::new(url, remote_addr))
}

/// Request line without its `\n` or `\r\n` terminator.
async fn read_request_line<R>(reader: &mut R) -> Result<Vec<u8>, RequestError>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::with_capacity(128);
    loop {
        if line.len() >= MAX_REQUEST_SIZE {
            return Err(RequestError::TooLarge(terminator_not_found()));
        }
        match reader.read_u8().await {
            Ok(b'\n') => break,
            Ok(byte) => line.push(byte),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(RequestError::Io(terminator_not_found()));
            }
            Err(e) => return Err(RequestError::Io(e)),
        }
    }

    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(line)
}

fn terminator_not_found() -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "request line terminator not found",
    )
}

/// Path of an absolute URI exactly as written: after the scheme and the
/// authority, up to the query or fragment.
fn raw_path(uri: &str) -> &str {
    let rest = uri.split_once(':').map_or(uri, |(_, rest)| rest);
    let rest = match rest.strip_prefix("//") {
        Some(authority) => authority
            .find(|c| matches!(c, '/' | '?' | '#'))
            .map_or("", |i| &authority[i..]),
        None => rest,
    };
    let end = rest.find(|c| matches!(c, '?' | '#')).unwrap_or(rest.len());
    &rest[..end]
}

/// Like [`parse_request`], taking the remote address and the peer identity
/// from the transport. The certificate chain is snapshotted before reading.
pub async fn parse_transport_request<T>(conn: &mut T) -> Result<Request>
where
    T: Transport,
{
    let certificates = conn.peer_identity();
    let remote_addr = conn.remote_addr();

    let mut request = parse_request(conn, remote_addr).await?;
    request.certificates = certificates;
    Ok(request)
}

/// Rejects paths that are `.` or `..` once one leading and one trailing slash
/// are stripped, or that contain a dot segment anywhere.
pub(crate) fn is_valid_path(path: &str) -> bool {
    if path == "." {
        return false;
    }

    let path = path.strip_prefix('/').unwrap_or(path);
    let path = path.strip_suffix('/').unwrap_or(path);
    if path.is_empty() {
        return true;
    }

    !path.split('/').any(is_dot_segment)
}

fn is_dot_segment(segment: &str) -> bool {
    let decoded = segment.replace("%2e", ".").replace("%2E", ".");
    decoded == "." || decoded == ".."
}
