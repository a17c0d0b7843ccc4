//! Request routing — map URL patterns and HTTP methods to handler functions.
//!
//! [`Router`] dispatches a [`Context`] to the handler registered for its
//! method and path. Three pattern styles are supported:
//!
//! | Pattern              | Example match              | Captured params                 |
//! |----------------------|----------------------------|---------------------------------|
//! | `/api/session`       | `/api/session`             | *(none)*                        |
//! | `/api/:name`         | `/api/prompt`              | `name → "prompt"`               |
//! | `/*`                 | `/anything/at/all`         | `wildcard → "/anything/at/all"` |
//!
//! Trailing slashes are normalized on both patterns and incoming paths.
//! Routes are matched in registration order; the first route whose method and
//! pattern both match wins. A path that matches only under another method
//! yields `405 Method Not Allowed`; anything else yields `404 Not Found`.

use std::pin::Pin;
use std::sync::Arc;

use crate::context::{Context, PathParams};
use crate::{Method, Request, Response, StatusCode};

/// Type-erased, heap-allocated async handler that processes a [`Context`] and returns a
/// [`Response`].
///
/// Handlers live behind `Arc<dyn Fn(…)>` so a route table can be shared by
/// every connection task without copying closures. Register them through
/// [`Router::get`], [`Router::post`] or [`Router::put`]; this type is never
/// built by hand.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait automatically. Router
/// methods take `impl IntoHandler` so the two-parameter bound does not have
/// to be spelled out at each call site.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

// A single path segment, either a literal string or a named capture (`:name`).
#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter(String),
}

// Compiled representation of a route pattern string.
#[derive(Debug, Clone)]
enum Pattern {
    Exact(String),
    Parameterized { segments: Vec<Segment> },
    // Prefix match; `/*` compiles to an empty prefix and matches every path.
    Wildcard(String),
}

fn trim_trailing_slash(path: &str) -> &str {
    if path != "/" && path.ends_with('/') {
        &path[..path.len() - 1]
    } else {
        path
    }
}

impl Pattern {
    /// Compile a route pattern string.
    ///
    /// Classification, checked in order:
    ///
    /// 1. Ends with `/*`: [`Pattern::Wildcard`], a prefix match. `/*` alone
    ///    has an empty prefix and matches every path.
    /// 2. Contains `:`: [`Pattern::Parameterized`] with named captures.
    /// 3. Otherwise: [`Pattern::Exact`].
    ///
    /// A trailing slash (other than on `/`) is stripped first, so
    /// `/api/session/` and `/api/session` compile identically.
    ///
    /// # Arguments
    ///
    /// - `pattern`: the raw pattern, e.g. `"/api/:name"` or `"/*"`.
    ///
    /// # Returns
    ///
    /// The compiled [`Pattern`].
    fn parse(pattern: &str) -> Self {
        let pattern = trim_trailing_slash(pattern);

        if let Some(prefix) = pattern.strip_suffix("/*") {
            return Pattern::Wildcard(prefix.to_string());
        }

        if pattern.contains(':') {
            let segments = pattern
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| match s.strip_prefix(':') {
                    Some(p) => Segment::Parameter(p.to_string()),
                    None => Segment::Static(s.to_string()),
                })
                .collect();

            return Pattern::Parameterized { segments };
        }

        Pattern::Exact(pattern.to_string())
    }

    // Try to match `path` against this pattern, returning extracted [`PathParams`] on success.
    fn matches(&self, path: &str) -> Option<PathParams> {
        let path = trim_trailing_slash(path);

        match self {
            Pattern::Exact(p) => (p == path).then(PathParams::new),
            Pattern::Parameterized { segments } => {
                let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                if segments.len() != path_segments.len() {
                    return None;
                }

                let mut params = PathParams::new();
                for (seg, path_seg) in segments.iter().zip(path_segments) {
                    match seg {
                        Segment::Static(s) if s != path_seg => return None,
                        Segment::Static(_) => {}
                        Segment::Parameter(name) => {
                            params.insert(name.clone(), path_seg.to_string());
                        }
                    }
                }
                Some(params)
            }
            Pattern::Wildcard(prefix) => {
                let suffix = path.strip_prefix(prefix.as_str())?;
                let mut params = PathParams::new();
                params.insert("wildcard".to_string(), suffix.to_string());
                Some(params)
            }
        }
    }
}

// A single registered route binding a method + pattern to a handler.
struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
}

/// HTTP request router that dispatches requests to registered handler functions.
///
/// Routes are evaluated in registration order; the first route whose method
/// and pattern both match handles the request. Unmatched paths get `404`,
/// paths registered only under other methods get `405`.
///
/// # Examples
///
/// ```rust,no_run
/// use wellbeing_chat::{Router, Response, StatusCode};
/// use wellbeing_chat::context::Context;
///
/// let mut router = Router::new();
/// router.get("/healthz", |_ctx: Context| async { Response::new(StatusCode::Ok).body("ok") });
///
/// router.put("/api/:name", |ctx: Context| async move {
///     let name = ctx.params().get("name").unwrap_or("unknown").to_owned();
///     Response::new(StatusCode::Ok).body(name)
/// });
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Create a new, empty `Router` with no registered routes.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use wellbeing_chat::Router;
    ///
    /// let router = Router::new();
    /// assert!(router.is_empty());
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `GET` (and `HEAD`) requests matching `path`.
    ///
    /// `HEAD` requests are answered by the same handler.
    ///
    /// # Arguments
    ///
    /// - `path`: URL pattern (e.g. `"/healthz"`, `"/api/:name"` or `"/*"`).
    /// - `handler`: async function that receives a [`Context`] and returns a [`Response`].
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use wellbeing_chat::{Router, Response, StatusCode};
    /// use wellbeing_chat::context::Context;
    ///
    /// let mut router = Router::new();
    /// router.get("/healthz", |_ctx: Context| async { Response::new(StatusCode::Ok) });
    /// ```
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    /// Register a handler for `POST` requests matching `path`.
    ///
    /// # Arguments
    ///
    /// - `path`: URL pattern (e.g. `"/api/chat"`, `"/api/:name"` or `"/*"`).
    /// - `handler`: async function that receives a [`Context`] and returns a [`Response`].
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use wellbeing_chat::{Router, Response, StatusCode};
    /// use wellbeing_chat::context::Context;
    ///
    /// let mut router = Router::new();
    /// router.post("/api/chat", |_ctx: Context| async { Response::new(StatusCode::Ok) });
    /// ```
    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, handler);
    }

    /// Register a handler for `PUT` requests matching `path`.
    ///
    /// # Arguments
    ///
    /// - `path`: URL pattern (e.g. `"/api/prompt"`, `"/api/:name"` or `"/*"`).
    /// - `handler`: async function that receives a [`Context`] and returns a [`Response`].
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use wellbeing_chat::{Router, Response, StatusCode};
    /// use wellbeing_chat::context::Context;
    ///
    /// let mut router = Router::new();
    /// router.put("/api/prompt", |_ctx: Context| async { Response::new(StatusCode::Ok) });
    /// ```
    pub fn put(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Put, path, handler);
    }

    // Erase the concrete handler type and store it as a `Handler` trait object.
    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        self.routes.push(Route {
            method,
            pattern: Pattern::parse(path),
            handler,
        });
    }

    /// Return the number of routes registered in this router.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use wellbeing_chat::{Router, Response, StatusCode};
    /// use wellbeing_chat::context::Context;
    ///
    /// let mut router = Router::new();
    /// assert_eq!(router.len(), 0);
    /// router.get("/a", |_ctx: Context| async { Response::new(StatusCode::Ok) });
    /// assert_eq!(router.len(), 1);
    /// ```
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Return `true` if no routes have been registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatch a bare request to the first matching route.
    ///
    /// Equivalent to [`dispatch`](Self::dispatch) with a fresh [`Context`];
    /// nothing runs in between, so no middleware sees the request.
    pub async fn route(&self, request: Request) -> Response {
        self.dispatch(Context::new(request)).await
    }

    /// Dispatch an already-built context (e.g. one decorated by middleware).
    ///
    /// `HEAD` is served by the matching `GET` handler. The captured path
    /// parameters are stored on the context before the handler runs.
    ///
    /// # Returns
    ///
    /// The handler's response, `405 Method Not Allowed` when the path is only
    /// registered under other methods, or `404 Not Found` otherwise.
    pub async fn dispatch(&self, mut ctx: Context) -> Response {
        let method = match ctx.request().method() {
            Method::Head => Method::Get,
            other => other.clone(),
        };

        let mut path_matched = false;
        let mut hit = None;
        for route in &self.routes {
            if let Some(params) = route.pattern.matches(ctx.request().path()) {
                if route.method == method {
                    hit = Some((Arc::clone(&route.handler), params));
                    break;
                }
                path_matched = true;
            }
        }

        match hit {
            Some((handler, params)) => {
                ctx.set_params(params);
                handler(ctx).await
            }
            None if path_matched => Response::new(StatusCode::MethodNotAllowed),
            None => Response::new(StatusCode::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    // ── Pattern ───────────────────────────────────────────────────────────────

    #[test]
    fn pattern_parse_root() {
        assert!(matches!(Pattern::parse("/"), Pattern::Exact(s) if s == "/"));
    }

    #[test]
    fn pattern_parse_trailing_slash_stripped() {
        assert!(matches!(Pattern::parse("/api/session/"), Pattern::Exact(s) if s == "/api/session"));
    }

    #[test]
    fn pattern_parse_parameterized() {
        match Pattern::parse("/api/:name") {
            Pattern::Parameterized { segments } => {
                assert_eq!(segments.len(), 2);
                assert!(matches!(&segments[0], Segment::Static(s) if s == "api"));
                assert!(matches!(&segments[1], Segment::Parameter(s) if s == "name"));
            }
            other => panic!("expected Parameterized, got {other:?}"),
        }
    }

    #[test]
    fn pattern_root_wildcard_matches_everything() {
        let pat = Pattern::parse("/*");
        assert!(matches!(&pat, Pattern::Wildcard(s) if s.is_empty()));
        let params = pat.matches("/api/chat").unwrap();
        assert_eq!(params.get("wildcard"), Some("/api/chat"));
        assert!(pat.matches("/").is_some());
    }

    #[test]
    fn pattern_exact_match_root_only() {
        let pat = Pattern::parse("/");
        assert!(pat.matches("/").is_some());
        assert!(pat.matches("/other").is_none());
    }

    #[test]
    fn pattern_param_extracts_value() {
        let pat = Pattern::parse("/api/:name");
        assert_eq!(pat.matches("/api/prompt").unwrap().get("name"), Some("prompt"));
        assert!(pat.matches("/api").is_none());
        assert!(pat.matches("/web/prompt").is_none());
    }

    // ── Router ────────────────────────────────────────────────────────────────

    #[test]
    fn router_len_increments_on_add() {
        let mut router = Router::new();
        assert!(router.is_empty());
        router.get("/a", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        router.post("/b", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        assert_eq!(router.len(), 2);
    }

    #[tokio::test]
    async fn router_empty_returns_404() {
        let router = Router::new();
        let res = router.route(make_request("GET", "/")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn router_wrong_method_returns_405() {
        let mut router = Router::new();
        router.get("/hello", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        let res = router.route(make_request("POST", "/hello")).await;
        assert_eq!(res.status(), StatusCode::MethodNotAllowed);
    }

    #[tokio::test]
    async fn router_head_uses_get_handler() {
        let mut router = Router::new();
        router.get("/", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        let res = router.route(make_request("HEAD", "/")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn router_first_matching_route_wins() {
        let mut router = Router::new();
        router.get("/path", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        router.get("/path", |_ctx: Context| async { Response::new(StatusCode::NoContent) });
        let res = router.route(make_request("GET", "/path")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn router_parameterized_route_receives_params() {
        let mut router = Router::new();
        router.put("/api/:name", |ctx: Context| async move {
            let name = ctx.params().get("name").unwrap_or("").to_owned();
            Response::new(StatusCode::Ok).body(name)
        });
        let res = router.route(make_request("PUT", "/api/prompt")).await;
        assert_eq!(res.body_text(), "prompt");
    }
}
