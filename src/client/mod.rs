//! Client: fetches a URL and follows redirects.
//!
//! # Fetch Flow
//!
//! ```text
//!   parse URL
//!       │
//!       ▼
//!   redirect policy ──(refused)──▶ error
//!       │
//!       ▼
//!   dial host:port (default 1965)
//!       │
//!       ▼
//!   send "<url>\r\n", read header
//!       │
//!       ├── 30 / 31 ──▶ close, record, resolve meta ──▶ back to policy
//!       │
//!       ▼
//!   Response
//! ```

mod redirect;
mod response;

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader};
use tracing::debug;
use url::{Host, Url};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::protocol::header::parse_header;
use crate::tls::{self, ClientIdentity, DomainVerifier, PeerVerifier};
use crate::transport::{DeadlineStream, Dialer, TlsDialer};

pub use redirect::{DEFAULT_MAX_REDIRECTS, MaxRedirects, RedirectPolicy, RedirectedRequest};
pub use response::Response;

/// Port used when the URL does not name one.
pub const DEFAULT_PORT: u16 = 1965;

/// Capacity of the buffered reader the header is parsed from.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 16 * 1024;

/// Gemini client. Cheap to clone.
#[derive(Clone)]
pub struct Client {
    dialer: Arc<dyn Dialer>,
    redirect_policy: Arc<dyn RedirectPolicy>,
    read_buffer_size: usize,
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    dialer: Option<Arc<dyn Dialer>>,
    verifier: Arc<dyn PeerVerifier>,
    identity: Option<ClientIdentity>,
    redirect_policy: Arc<dyn RedirectPolicy>,
    read_buffer_size: usize,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            dialer: None,
            verifier: Arc::new(DomainVerifier),
            identity: None,
            redirect_policy: Arc::new(MaxRedirects::default()),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl ClientBuilder {
    /// Replaces the TLS dialer. `verifier` and `identity` are then unused.
    pub fn dialer(mut self, dialer: impl Dialer + 'static) -> Self {
        self.dialer = Some(Arc::new(dialer));
        self
    }

    /// Peer verification used by the default TLS dialer.
    pub fn verifier(mut self, verifier: impl PeerVerifier + 'static) -> Self {
        self.verifier = Arc::new(verifier);
        self
    }

    /// Client certificate presented by the default TLS dialer.
    pub fn identity(mut self, identity: ClientIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn redirect_policy(mut self, policy: impl RedirectPolicy + 'static) -> Self {
        self.redirect_policy = Arc::new(policy);
        self
    }

    /// Shorthand for a [`MaxRedirects`] policy.
    pub fn max_redirects(self, max: usize) -> Self {
        self.redirect_policy(MaxRedirects(max))
    }

    /// `0` falls back to [`DEFAULT_READ_BUFFER_SIZE`].
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = if size == 0 {
            DEFAULT_READ_BUFFER_SIZE
        } else {
            size
        };
        self
    }

    pub fn build(self) -> Result<Client> {
        let dialer = match self.dialer {
            Some(dialer) => dialer,
            None => {
                let config = tls::client_config(self.verifier, self.identity)?;
                Arc::new(TlsDialer::new(config))
            }
        };

        Ok(Client {
            dialer,
            redirect_policy: self.redirect_policy,
            read_buffer_size: self.read_buffer_size,
        })
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Client with TLS dialing, domain-only peer verification and the
    /// default [`MaxRedirects`] policy.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Requests `url`, following redirects allowed by the redirect policy.
    ///
    /// Every redirect response is closed before the next request. The
    /// returned response is open and must be closed by the caller. The
    /// context deadline bounds dialing and all I/O on the connection.
    pub async fn fetch(&self, ctx: &Context, url: &str) -> Result<Response> {
        let mut target = Url::parse(url)?;
        let mut via: Vec<RedirectedRequest> = Vec::new();

        loop {
            self.redirect_policy.check(ctx, &target, &via)?;

            let mut response = self.fetch_once(ctx, &target).await?;
            if !response.status().is_redirect() {
                return Ok(response);
            }

            if let Err(e) = response.close().await {
                debug!(url = %target, error = %e, "Closing redirect response failed");
            }
            let next = target
                .join(response.meta())
                .map_err(|e| Error::Redirect(format!("{:?}: {e}", response.meta())))?;
            debug!(from = %target, to = %next, status = %response.status(), "Following redirect");

            via.push(RedirectedRequest {
                url: std::mem::replace(&mut target, next),
                response,
            });
        }
    }

    async fn fetch_once(&self, ctx: &Context, url: &Url) -> Result<Response> {
        let (addr, domain) = dial_target(url)?;

        let dial = self.dialer.dial(ctx, &addr, &domain);
        let stream = match ctx.deadline() {
            Some(deadline) => match tokio::time::timeout_at(deadline, dial).await {
                Ok(dialed) => dialed,
                Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "dial deadline exceeded")),
            },
            None => dial.await,
        }
        .map_err(|source| Error::Dial {
            host: addr.clone(),
            source,
        })?;

        let mut stream = DeadlineStream::new(stream, ctx.deadline());
        stream
            .write_all(format!("{url}\r\n").as_bytes())
            .await
            .map_err(Error::Send)?;
        stream.flush().await.map_err(Error::Send)?;

        let mut reader = BufReader::with_capacity(self.read_buffer_size, stream);
        let (status, meta) = parse_header(&mut reader).await?;
        debug!(url = %url, status = %status, "Received header");

        Ok(Response::new(status, meta, reader))
    }
}

/// `host:port` to connect to and the name the peer must prove.
fn dial_target(url: &Url) -> Result<(String, String)> {
    let domain = match url.host() {
        Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        _ => return Err(Error::MissingHost),
    };
    let host = url.host_str().ok_or(Error::MissingHost)?;
    let port = url.port().unwrap_or(DEFAULT_PORT);

    Ok((format!("{host}:{port}"), domain))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dial_target_defaults_port() {
        let url = Url::parse("gemini://example.com/page").unwrap();
        assert_eq!(
            dial_target(&url).unwrap(),
            ("example.com:1965".to_string(), "example.com".to_string())
        );

        let url = Url::parse("gemini://127.0.0.1:1966/").unwrap();
        assert_eq!(
            dial_target(&url).unwrap(),
            ("127.0.0.1:1966".to_string(), "127.0.0.1".to_string())
        );

        let url = Url::parse("gemini://[::1]/").unwrap();
        assert_eq!(
            dial_target(&url).unwrap(),
            ("[::1]:1965".to_string(), "::1".to_string())
        );
    }

    #[test]
    fn dial_target_requires_host() {
        let url = Url::parse("gemini:/no-host").unwrap();
        assert!(matches!(dial_target(&url), Err(Error::MissingHost)));
    }
}
