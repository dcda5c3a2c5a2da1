//! Path router.
//!
//! Patterns are split on `/` into segments. A segment starting with `:`
//! captures any single path segment under that name; every other segment
//! matches literally. At each level an exact literal match wins over the
//! capture and a chosen branch is never revisited, so `/users/new` and
//! `/users/:id` coexist.
//!
//! # Example
//!
//! ```
//! use gemwire::{Router, StatusCode};
//!
//! let router = Router::new()
//!     .route("/users/:id", |_ctx, rw, req| {
//!         Box::pin(async move {
//!             let id = req.param("id").unwrap_or_default().to_string();
//!             rw.write_status(StatusCode::Success, "text/plain").await?;
//!             rw.write_str(&id).await?;
//!             Ok(())
//!         })
//!     });
//!
//! let found = router.lookup("/users/42").unwrap();
//! assert_eq!(found.pattern, "/users/:id");
//! assert_eq!(found.params["id"], "42");
//! assert!(router.lookup("/users/42/posts").is_none());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::BoxFuture;
use crate::context::Context;
use crate::error::Result;
use crate::handlers;
use crate::protocol::request::Request;
use crate::protocol::writer::ResponseWriter;
use crate::server::{Handler, handler_fn};

/// Prefix marking a capture segment.
pub const PARAM_PREFIX: char = ':';

/// Dispatches requests to handlers by path. Itself a [`Handler`].
#[derive(Default)]
pub struct Router {
    root: Node,
    routes: Vec<Route>,
    fallback: Option<Arc<dyn Handler>>,
}

struct Route {
    pattern: String,
    handler: Arc<dyn Handler>,
}

#[derive(Default)]
struct Node {
    literals: HashMap<String, Node>,
    param: Option<(String, Box<Node>)>,
    route: Option<usize>,
}

/// Outcome of [`Router::lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'r> {
    pub pattern: &'r str,
    pub params: HashMap<String, String>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `pattern`. Registering the same pattern again
    /// replaces the handler.
    pub fn handle(mut self, pattern: &str, handler: impl Handler) -> Self {
        self.insert(pattern, Arc::new(handler));
        self
    }

    /// Registers a closure for `pattern`.
    pub fn route<F>(self, pattern: &str, f: F) -> Self
    where
        F: for<'a> Fn(Context, &'a mut ResponseWriter, Request) -> BoxFuture<'a, Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.handle(pattern, handler_fn(f))
    }

    /// Handler for paths no pattern matches. Defaults to `51 NOT FOUND`.
    pub fn fallback(mut self, handler: impl Handler) -> Self {
        self.fallback = Some(Arc::new(handler));
        self
    }

    /// Finds the pattern serving `path` together with its captures.
    pub fn lookup(&self, path: &str) -> Option<RouteMatch<'_>> {
        let (index, params) = self.find(path)?;
        Some(RouteMatch {
            pattern: &self.routes[index].pattern,
            params,
        })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn find(&self, path: &str) -> Option<(usize, HashMap<String, String>)> {
        let mut node = &self.root;
        let mut params = HashMap::new();

        for segment in segments(path) {
            node = if let Some(child) = node.literals.get(segment) {
                child
            } else if let Some((name, child)) = &node.param {
                params.insert(name.clone(), segment.to_string());
                &**child
            } else {
                return None;
            };
        }

        node.route.map(|index| (index, params))
    }

    fn insert(&mut self, pattern: &str, handler: Arc<dyn Handler>) {
        let mut node = &mut self.root;
        for segment in segments(pattern) {
            node = match segment.strip_prefix(PARAM_PREFIX) {
                Some(name) => {
                    let (param, child) = node
                        .param
                        .get_or_insert_with(|| (name.to_string(), Box::default()));
                    if param.as_str() != name {
                        tracing::debug!(old = %param, new = %name, "Renaming route parameter");
                        *param = name.to_string();
                    }
                    child.as_mut()
                }
                None => node.literals.entry(segment.to_string()).or_default(),
            };
        }

        match node.route {
            Some(index) => self.routes[index].handler = handler,
            None => {
                node.route = Some(self.routes.len());
                self.routes.push(Route {
                    pattern: pattern.to_string(),
                    handler,
                });
            }
        }
    }
}

impl Handler for Router {
    fn handle<'a>(
        &'a self,
        ctx: Context,
        rw: &'a mut ResponseWriter,
        mut req: Request,
    ) -> BoxFuture<'a, Result<()>> {
        match self.find(req.path()) {
            Some((index, params)) => {
                req.params = params;
                self.routes[index].handler.handle(ctx, rw, req)
            }
            None => match &self.fallback {
                Some(fallback) => fallback.handle(ctx, rw, req),
                None => Box::pin(async move { handlers::not_found(rw, &req).await }),
            },
        }
    }
}

/// Splits a path on `/`, dropping a single trailing empty segment.
///
/// `/a/b` yields `["", "a", "b"]` and `/a/` yields `["", "a"]`.
fn segments(path: &str) -> impl Iterator<Item = &str> {
    let path = path.strip_suffix('/').unwrap_or(path);
    path.split('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::serve_content;

    fn router() -> Router {
        Router::new()
            .handle("/", serve_content("text/plain", "root"))
            .handle("/users/new", serve_content("text/plain", "new"))
            .handle("/users/:id", serve_content("text/plain", "user"))
            .handle("/users/:id/posts/:post", serve_content("text/plain", "post"))
    }

    #[test]
    fn segments_drop_one_trailing_slash() {
        assert_eq!(segments("/a/b").collect::<Vec<_>>(), ["", "a", "b"]);
        assert_eq!(segments("/a/").collect::<Vec<_>>(), ["", "a"]);
        assert_eq!(segments("/").collect::<Vec<_>>(), [""]);
        assert_eq!(segments("").collect::<Vec<_>>(), [""]);
    }

    #[test]
    fn literal_wins_over_capture() {
        let router = router();

        assert_eq!(router.lookup("/users/new").unwrap().pattern, "/users/new");

        let found = router.lookup("/users/7").unwrap();
        assert_eq!(found.pattern, "/users/:id");
        assert_eq!(found.params.get("id").map(String::as_str), Some("7"));
    }

    #[test]
    fn captures_nest() {
        let router = router();
        let found = router.lookup("/users/7/posts/hello").unwrap();
        assert_eq!(found.pattern, "/users/:id/posts/:post");
        assert_eq!(found.params["id"], "7");
        assert_eq!(found.params["post"], "hello");
    }

    #[test]
    fn no_backtracking_after_literal_match() {
        let router = Router::new()
            .handle("/a/b", serve_content("text/plain", "ab"))
            .handle("/a/:x/c", serve_content("text/plain", "axc"));

        // "b" matches the literal child, which has no "c" below it.
        assert!(router.lookup("/a/b/c").is_none());
        assert_eq!(router.lookup("/a/z/c").unwrap().pattern, "/a/:x/c");
    }

    #[test]
    fn unmatched_paths() {
        let router = router();
        assert!(router.lookup("/users").is_none());
        assert!(router.lookup("/missing").is_none());
        assert_eq!(router.lookup("/").unwrap().pattern, "/");
    }

    #[test]
    fn reregistering_replaces_handler() {
        let router = Router::new()
            .handle("/a", serve_content("text/plain", "one"))
            .handle("/a", serve_content("text/plain", "two"));
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn later_capture_name_wins() {
        let router = Router::new()
            .handle("/p/:first", serve_content("text/plain", "first"))
            .handle("/p/:second/x", serve_content("text/plain", "second"));

        let found = router.lookup("/p/1").unwrap();
        assert_eq!(found.params.get("second").map(String::as_str), Some("1"));
    }
}
