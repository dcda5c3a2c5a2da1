//! Gemwire - Gemini protocol engine
//!
//! Client and server for the Gemini protocol over TLS: the status model,
//! the request and response header codecs, a buffered response writer, a
//! redirect-following client, a connection-tracking server with graceful
//! stop and a path router.
//!
//! ```no_run
//! use gemwire::{Context, Router, Server, handlers, tls};
//!
//! # async fn run() -> gemwire::Result<()> {
//! let router = Router::new()
//!     .handle("/", handlers::serve_content("text/gemini", "# Hello\r\n"));
//! let tls = tls::server_config_from_pem("cert.pem".as_ref(), "key.pem".as_ref())?;
//!
//! Server::builder(router)
//!     .addr("127.0.0.1:1965")
//!     .build()
//!     .listen_and_serve(Context::background(), tls)
//!     .await
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod protocol;
pub mod router;
pub mod server;
pub mod tls;
pub mod transport;

pub use client::{Client, Response};
pub use context::Context;
pub use error::{Error, RequestError, Result};
pub use protocol::request::Request;
pub use protocol::status::{StatusClass, StatusCode};
pub use protocol::writer::ResponseWriter;
pub use router::Router;
pub use server::{Handler, Server, handler_fn};

/// Boxed future returned by handlers and dialers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
