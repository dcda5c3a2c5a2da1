use url::Url;

use crate::client::Response;
use crate::context::Context;
use crate::error::{Error, Result};

/// Requests one fetch may make by default, the first one included.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// A request that was answered with a redirect. Its response is closed.
#[derive(Debug)]
pub struct RedirectedRequest {
    pub url: Url,
    pub response: Response,
}

/// Decides whether the client may request `next`, given the redirects that
/// led to it (oldest first). Consulted before every dial, including the
/// first one with an empty trail.
pub trait RedirectPolicy: Send + Sync {
    fn check(&self, ctx: &Context, next: &Url, via: &[RedirectedRequest]) -> Result<()>;
}

impl<F> RedirectPolicy for F
where
    F: Fn(&Context, &Url, &[RedirectedRequest]) -> Result<()> + Send + Sync,
{
    fn check(&self, ctx: &Context, next: &Url, via: &[RedirectedRequest]) -> Result<()> {
        self(ctx, next, via)
    }
}

/// Allows a fetch to make at most `n` requests, the first one included, so
/// a redirect loop ends after `n` dials with [`Error::TooManyRedirects`].
#[derive(Debug, Clone, Copy)]
pub struct MaxRedirects(pub usize);

impl Default for MaxRedirects {
    fn default() -> Self {
        Self(DEFAULT_MAX_REDIRECTS)
    }
}

impl RedirectPolicy for MaxRedirects {
    fn check(&self, _ctx: &Context, _next: &Url, via: &[RedirectedRequest]) -> Result<()> {
        if via.len() < self.0 {
            Ok(())
        } else {
            Err(Error::TooManyRedirects)
        }
    }
}
