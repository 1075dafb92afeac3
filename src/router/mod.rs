//! Request routing: map `GET` URL patterns to handler functions.
//!
//! | Pattern                        | Example match                        | Captured params        |
//! |--------------------------------|--------------------------------------|------------------------|
//! | `/countries`                   | `/countries`                         | *(none)*               |
//! | `/countries/:country/summary`  | `/countries/New%20Zealand/summary`   | `country → "New Zealand"` |
//!
//! Trailing slashes are normalized on both patterns and incoming paths, so
//! `/countries/` and `/countries` are equivalent. Captured segments are
//! percent-decoded.
//!
//! Routes are matched in registration order; the first match wins. `HEAD` is
//! routed like `GET`; any other method gets `405`.

use std::pin::Pin;
use std::sync::Arc;

use crate::context::{Context, PathParams};
use crate::http::request::decode_component;
use crate::{Method, Request, Response, StatusCode};

/// Type-erased async handler.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

// A single path segment, either a literal string or a named capture (`:name`).
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Parameter(String),
}

// Compiled route pattern: a fixed sequence of segments.
#[derive(Debug, Clone)]
struct Pattern {
    segments: Vec<Segment>,
}

impl Pattern {
    fn parse(pattern: &str) -> Self {
        let segments = split_path(pattern)
            .map(|s| match s.strip_prefix(':') {
                Some(name) => Segment::Parameter(name.to_owned()),
                None => Segment::Static(s.to_owned()),
            })
            .collect();
        Self { segments }
    }

    // Try to match `path`, returning decoded captures on success.
    fn matches(&self, path: &str) -> Option<PathParams> {
        let path_segments: Vec<&str> = split_path(path).collect();
        if path_segments.len() != self.segments.len() {
            return None;
        }

        let mut params = PathParams::new();
        for (seg, raw) in self.segments.iter().zip(path_segments) {
            match seg {
                Segment::Static(s) if s == raw => {}
                Segment::Static(_) => return None,
                Segment::Parameter(name) => {
                    params.insert(name.clone(), decode_component(raw));
                }
            }
        }
        Some(params)
    }
}

// Non-empty `/`-separated segments; this also normalizes trailing slashes.
fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

struct Route {
    pattern: Pattern,
    handler: Handler,
}

/// Dispatches `GET`/`HEAD` requests to registered handlers.
///
/// # Examples
///
/// ```rust,no_run
/// use epicache::{Router, Response, StatusCode};
///
/// let mut router = Router::new();
/// router.get("/healthcheck", |_ctx| async { Response::new(StatusCode::Ok) });
/// router.get("/countries/:country/evolution", |ctx| async move {
///     let country = ctx.params().get("country").unwrap_or_default().to_owned();
///     Response::new(StatusCode::Ok).body(country)
/// });
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for `GET` (and `HEAD`) requests matching `path`.
    pub fn get<H, F>(&mut self, path: &str, handler: H)
    where
        H: Fn(Context) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let handler: Handler = Arc::new(
            move |ctx: Context| -> Pin<Box<dyn Future<Output = Response> + Send>> {
                Box::pin(handler(ctx))
            },
        );
        self.routes.push(Route {
            pattern: Pattern::parse(path),
            handler,
        });
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatches `request` to the first matching route.
    ///
    /// Returns `405` for methods other than `GET`/`HEAD` and `404` when no
    /// pattern matches.
    pub async fn route(&self, request: Request) -> Response {
        if !matches!(request.method(), Method::Get | Method::Head) {
            return Response::error(StatusCode::MethodNotAllowed, "only GET is supported")
                .header("Allow", "GET, HEAD");
        }

        for route in &self.routes {
            if let Some(params) = route.pattern.matches(request.path()) {
                let ctx = Context::with_params(request, params);
                return (route.handler)(ctx).await;
            }
        }

        Response::error(StatusCode::NotFound, "not found")
    }
}
