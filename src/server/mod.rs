//! Server: accept loop, connection tracking and graceful stop.
//!
//! # Connection Flow
//!
//! ```text
//! accept ──▶ track ──▶ spawn task
//!                          │
//!                          ▼
//!                 conn_context, deadline
//!                          │
//!                          ▼
//!                    TLS handshake
//!                          │
//!                          ▼
//!                  parse request line ──(error)──▶ 59 BAD REQUEST
//!                          │
//!                          ▼
//!                   check host ──(unknown)──▶ 50 host not found
//!                          │
//!                          ▼
//!                       handler
//!                          │
//!                          ▼
//!                 close writer, untrack
//! ```
//!
//! [`Server::stop`] closes every tracked listener and connection; serve calls
//! then return [`Error::ServerClosed`] once their connection tasks are done.

mod connection;
pub mod listener;
mod tracker;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tracing::{debug, error, info};

use crate::BoxFuture;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::protocol::buffer::{BufferPool, DEFAULT_BUFFER_SIZE};
use crate::protocol::request::Request;
use crate::protocol::writer::ResponseWriter;
use crate::transport::{Incoming, Listener, Transport};

use listener::{LimitListener, TlsListener};
use tracker::Tracker;

/// Connection ceiling used when `max_connections` is left at `0`.
pub const DEFAULT_MAX_CONNECTIONS: usize = 256;

/// Default listen address.
pub const DEFAULT_ADDR: &str = "127.0.0.1:1965";

/// Serves one request.
///
/// The writer is closed by the server after `handle` returns if the handler
/// did not close it. Returned errors are logged.
pub trait Handler: Send + Sync + 'static {
    fn handle<'a>(
        &'a self,
        ctx: Context,
        rw: &'a mut ResponseWriter,
        req: Request,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Handler backed by a closure, see [`handler_fn`].
pub struct HandlerFn<F>(F);

/// Turns a closure into a [`Handler`].
///
/// # Example
///
/// ```
/// use gemwire::{StatusCode, handler_fn};
///
/// let hello = handler_fn(|_ctx, rw, _req| {
///     Box::pin(async move {
///         rw.write_status(StatusCode::Success, "text/plain").await?;
///         rw.write_str("hello").await?;
///         Ok(())
///     })
/// });
/// # let _ = hello;
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(Context, &'a mut ResponseWriter, Request) -> BoxFuture<'a, Result<()>>
        + Send
        + Sync
        + 'static,
{
    HandlerFn(f)
}

impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(Context, &'a mut ResponseWriter, Request) -> BoxFuture<'a, Result<()>>
        + Send
        + Sync
        + 'static,
{
    fn handle<'a>(
        &'a self,
        ctx: Context,
        rw: &'a mut ResponseWriter,
        req: Request,
    ) -> BoxFuture<'a, Result<()>> {
        (self.0)(ctx, rw, req)
    }
}

impl<H> Handler for Arc<H>
where
    H: Handler + ?Sized,
{
    fn handle<'a>(
        &'a self,
        ctx: Context,
        rw: &'a mut ResponseWriter,
        req: Request,
    ) -> BoxFuture<'a, Result<()>> {
        (**self).handle(ctx, rw, req)
    }
}

/// What the per-connection context hook gets to see.
#[derive(Debug, Clone)]
pub struct ConnInfo {
    pub remote_addr: String,
}

type ConnContextFn = dyn Fn(Context, &ConnInfo) -> Context + Send + Sync;

/// Gemini server. Clones share the same tracked state.
#[derive(Clone)]
pub struct Server {
    shared: Arc<Shared>,
}

struct Shared {
    addr: String,
    hosts: HashSet<String>,
    max_connections: isize,
    handler: Arc<dyn Handler>,
    conn_context: Option<Box<ConnContextFn>>,
    pool: BufferPool,
    tracker: Tracker,
}

/// Builder for [`Server`].
pub struct ServerBuilder {
    addr: String,
    hosts: HashSet<String>,
    max_connections: isize,
    handler: Arc<dyn Handler>,
    conn_context: Option<Box<ConnContextFn>>,
    buffer_size: usize,
}

impl ServerBuilder {
    pub fn addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Hosts the server answers for, as `host` or `host:port`. Empty means any.
    pub fn hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Ceiling on open connections for [`Server::listen_and_serve`].
    /// `0` selects [`DEFAULT_MAX_CONNECTIONS`], a negative value disables
    /// the limit.
    pub fn max_connections(mut self, max: isize) -> Self {
        self.max_connections = max;
        self
    }

    /// Derives the context each connection runs under.
    pub fn conn_context<F>(mut self, f: F) -> Self
    where
        F: Fn(Context, &ConnInfo) -> Context + Send + Sync + 'static,
    {
        self.conn_context = Some(Box::new(f));
        self
    }

    /// Size of the pooled response write buffers.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn build(self) -> Server {
        Server {
            shared: Arc::new(Shared {
                addr: self.addr,
                hosts: self.hosts,
                max_connections: self.max_connections,
                handler: self.handler,
                conn_context: self.conn_context,
                pool: BufferPool::new(self.buffer_size),
                tracker: Tracker::default(),
            }),
        }
    }
}

impl Server {
    pub fn builder(handler: impl Handler) -> ServerBuilder {
        ServerBuilder {
            addr: DEFAULT_ADDR.to_string(),
            hosts: HashSet::new(),
            max_connections: 0,
            handler: Arc::new(handler),
            conn_context: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn new(handler: impl Handler) -> Self {
        Self::builder(handler).build()
    }

    pub fn addr(&self) -> &str {
        &self.shared.addr
    }

    /// Effective connection ceiling, `None` when unlimited.
    pub fn connection_limit(&self) -> Option<usize> {
        match self.shared.max_connections {
            0 => Some(DEFAULT_MAX_CONNECTIONS),
            n if n < 0 => None,
            n => Some(n.unsigned_abs()),
        }
    }

    pub fn active_connections(&self) -> usize {
        self.shared.tracker.connections()
    }

    pub fn active_listeners(&self) -> usize {
        self.shared.tracker.listeners()
    }

    /// Binds the configured address and serves TLS on it until `ctx` is
    /// cancelled or [`stop`](Self::stop) is called.
    pub async fn listen_and_serve(&self, ctx: Context, tls: Arc<ServerConfig>) -> Result<()> {
        let tcp = TcpListener::bind(&self.shared.addr)
            .await
            .map_err(|source| Error::Bind {
                addr: self.shared.addr.clone(),
                source,
            })?;

        self.serve_tls(ctx, tcp, tls).await
    }

    /// Serves TLS on an already bound socket, applying the connection limit.
    /// Cancelling `ctx` closes the listener.
    pub async fn serve_tls(
        &self,
        ctx: Context,
        tcp: TcpListener,
        tls: Arc<ServerConfig>,
    ) -> Result<()> {
        if let Ok(addr) = tcp.local_addr() {
            info!(addr = %addr, limit = ?self.connection_limit(), "Listening");
        }

        let acceptor = TlsAcceptor::from(tls);
        match self.connection_limit() {
            Some(max) => {
                let listener = TlsListener::new(LimitListener::new(tcp, max), acceptor);
                self.run(ctx, listener, true).await
            }
            None => self.run(ctx, TlsListener::new(tcp, acceptor), true).await,
        }
    }

    /// Serves connections from `listener` until it fails or the server is
    /// stopped. Cancelling `ctx` reaches handlers but leaves the listener
    /// open.
    pub async fn serve<L: Listener>(&self, ctx: Context, listener: L) -> Result<()> {
        self.run(ctx, listener, false).await
    }

    /// Closes every tracked listener and connection.
    pub fn stop(&self) {
        info!(
            connections = self.active_connections(),
            listeners = self.active_listeners(),
            "Stopping server"
        );
        self.shared.tracker.close_all();
    }

    /// Whether a request for `url` belongs to this server.
    pub fn valid_host(&self, url: &url::Url) -> bool {
        Self::host_allowed(&self.shared.hosts, url)
    }

    fn host_allowed(hosts: &HashSet<String>, url: &url::Url) -> bool {
        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host,
            _ => return false,
        };
        if hosts.is_empty() || hosts.contains(host) {
            return true;
        }
        url.port()
            .is_some_and(|port| hosts.contains(&format!("{host}:{port}")))
    }

    async fn run<L: Listener>(&self, ctx: Context, mut listener: L, close_on_cancel: bool) -> Result<()> {
        let mut tracked = self.shared.tracker.add_listener();
        let mut tasks = JoinSet::new();

        let cancel_ctx = ctx.clone();
        let cancelled = async move {
            if close_on_cancel {
                cancel_ctx.cancelled().await
            } else {
                std::future::pending().await
            }
        };
        tokio::pin!(cancelled);

        let result = loop {
            tokio::select! {
                _ = tracked.closed() => break Err(Error::ServerClosed),
                _ = &mut cancelled => break Err(Error::ServerClosed),
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => reap(joined),
                accepted = listener.accept() => match accepted {
                    Ok(incoming) => {
                        let conn = self.shared.tracker.add_conn();
                        let server = self.clone();
                        let ctx = ctx.clone();
                        tasks.spawn(async move {
                            server.serve_conn(ctx, incoming, conn).await;
                        });
                    }
                    Err(e) => break Err(Error::Accept(e)),
                },
            }
        };

        drop(listener);
        drop(tracked);
        while let Some(joined) = tasks.join_next().await {
            reap(joined);
        }
        debug!(error = ?result.as_ref().err(), "Serve loop finished");

        result
    }

    async fn serve_conn<S: Transport>(
        &self,
        ctx: Context,
        incoming: Incoming<S>,
        mut tracked: tracker::Tracked,
    ) {
        tokio::select! {
            _ = tracked.closed() => debug!("Connection closed by server stop"),
            _ = connection::serve(&self.shared, ctx, incoming) => {}
        }
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("addr", &self.shared.addr)
            .field("hosts", &self.shared.hosts)
            .field("max_connections", &self.shared.max_connections)
            .field("connections", &self.active_connections())
            .finish()
    }
}

fn reap(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!(error = %e, "Connection handler panicked");
        }
    }
}
