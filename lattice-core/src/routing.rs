// Routing system for HTTP requests
//
// Routes bind (method, pattern) to a handler. Patterns are `/`-separated
// segments, each either a literal or a whole-segment `{name}` placeholder.
// Named routes can be turned back into concrete paths with `Router::reverse`.

use crate::handler::{handler as into_handler, HandlerFn};
use crate::middleware::{Middleware, MiddlewareChain};
use crate::{Context, Error, HttpMethod, HttpRequest, HttpResponse};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// Error handler invoked once per failed request.
pub type ErrorHandler = Arc<dyn Fn(&Context, Error) + Send + Sync>;

/// One segment of a parsed route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

/// A parsed route pattern such as `/users/{id}/posts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    /// Parse and validate a pattern.
    ///
    /// Placeholders must span a whole segment and carry a non-empty name made
    /// of ASCII alphanumerics and `_`; a name may appear only once.
    pub fn parse(pattern: &str) -> Result<Self, Error> {
        let invalid = |reason: &str| Error::InvalidRoutePattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if !pattern.starts_with('/') {
            return Err(invalid("pattern must start with '/'"));
        }

        let mut segments = Vec::new();
        for part in pattern.split('/').filter(|s| !s.is_empty()) {
            if !part.contains('{') && !part.contains('}') {
                segments.push(Segment::Literal(part.to_string()));
                continue;
            }

            let name = part
                .strip_prefix('{')
                .and_then(|p| p.strip_suffix('}'))
                .ok_or_else(|| invalid("placeholders must span a whole segment"))?;

            if name.is_empty() {
                return Err(invalid("empty placeholder name"));
            }
            if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(invalid("placeholder names may only contain [A-Za-z0-9_]"));
            }
            if segments
                .iter()
                .any(|s| matches!(s, Segment::Param(existing) if existing == name))
            {
                return Err(invalid("duplicate placeholder name"));
            }

            segments.push(Segment::Param(name.to_string()));
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names of all placeholders, in pattern order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Match a request path, returning the decoded captures.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(lit) => {
                    if lit != part {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = urlencoding::decode(part)
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| part.to_string());
                    params.insert(name.clone(), value);
                }
            }
        }

        Some(params)
    }

    /// Substitute every placeholder with its value from `params`.
    ///
    /// Fails on the first placeholder without a value; the result never
    /// contains placeholder syntax. Values are inserted verbatim.
    fn fill(&self, route: &str, params: &HashMap<String, String>) -> Result<String, Error> {
        let mut out = Vec::new();
        for part in self.raw.split('/') {
            match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(name) => {
                    let value = params.get(name).ok_or_else(|| Error::MissingRouteParameter {
                        route: route.to_string(),
                        param: name.to_string(),
                    })?;
                    out.push(value.as_str());
                }
                None => out.push(part),
            }
        }
        let path = out.join("/");
        if let Some(name) = find_placeholder(&path) {
            return Err(Error::MissingRouteParameter {
                route: route.to_string(),
                param: name.to_string(),
            });
        }
        Ok(path)
    }
}

/// First `{name}` token left in `path`, if any.
fn find_placeholder(path: &str) -> Option<&str> {
    let mut rest = path;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let end = after.find('}')?;
        let name = &after[..end];
        if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Some(name);
        }
        rest = after;
    }
    None
}

/// Route definition with handler
#[derive(Clone)]
pub struct Route {
    pub name: Option<String>,
    pub method: HttpMethod,
    pub pattern: RoutePattern,
    pub handler: HandlerFn,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("pattern", &self.pattern.raw)
            .finish()
    }
}

/// Router for managing routes and dispatching requests
///
/// Registration and reversal take `&self` so a router shared behind an `Arc`
/// can keep accepting routes; middleware and the error handler are
/// configured before the router is shared.
pub struct Router {
    routes: RwLock<Vec<Arc<Route>>>,
    names: RwLock<HashMap<String, RoutePattern>>,
    middleware: MiddlewareChain,
    error_handler: ErrorHandler,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(Vec::new()),
            names: RwLock::new(HashMap::new()),
            middleware: MiddlewareChain::new(),
            error_handler: Arc::new(default_error_handler),
        }
    }

    /// Register a handler for `method` and `pattern`.
    ///
    /// A non-empty `name` also records the pattern for [`Router::reverse`].
    /// Registering a name again replaces its pattern; the earlier HTTP binding
    /// stays in place.
    pub fn register<F, Fut>(
        &self,
        name: &str,
        method: HttpMethod,
        pattern: &str,
        handler: F,
    ) -> Result<(), Error>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.register_handler(name, method, pattern, into_handler(handler))
    }

    /// Register an already type-erased handler.
    pub fn register_handler(
        &self,
        name: &str,
        method: HttpMethod,
        pattern: &str,
        handler: HandlerFn,
    ) -> Result<(), Error> {
        let pattern = RoutePattern::parse(pattern)?;
        let name = (!name.is_empty()).then(|| name.to_string());

        if let Some(ref name) = name {
            let mut names = self.names.write();
            if let Some(previous) = names.get(name) {
                if previous.raw != pattern.raw {
                    warn!(
                        route = %name,
                        previous = %previous.raw,
                        pattern = %pattern.raw,
                        "Route name re-registered with a different pattern"
                    );
                }
            }
            names.insert(name.clone(), pattern.clone());
        }

        debug!(
            method = %method,
            pattern = %pattern.raw,
            name = name.as_deref().unwrap_or(""),
            "Route registered"
        );

        self.routes.write().push(Arc::new(Route {
            name,
            method,
            pattern,
            handler,
        }));

        Ok(())
    }

    pub fn get<F, Fut>(&self, pattern: &str, handler: F) -> Result<(), Error>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.register("", HttpMethod::GET, pattern, handler)
    }

    pub fn post<F, Fut>(&self, pattern: &str, handler: F) -> Result<(), Error>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.register("", HttpMethod::POST, pattern, handler)
    }

    pub fn put<F, Fut>(&self, pattern: &str, handler: F) -> Result<(), Error>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.register("", HttpMethod::PUT, pattern, handler)
    }

    pub fn patch<F, Fut>(&self, pattern: &str, handler: F) -> Result<(), Error>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.register("", HttpMethod::PATCH, pattern, handler)
    }

    pub fn delete<F, Fut>(&self, pattern: &str, handler: F) -> Result<(), Error>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.register("", HttpMethod::DELETE, pattern, handler)
    }

    /// Register a named route.
    pub fn named<F, Fut>(
        &self,
        name: &str,
        method: HttpMethod,
        pattern: &str,
        handler: F,
    ) -> Result<(), Error>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.register(name, method, pattern, handler)
    }

    /// Append a middleware; the first one added runs outermost.
    pub fn add_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        self.middleware.use_middleware(middleware);
    }

    /// Replace the error handler.
    pub fn set_error_handler<F>(&mut self, handler: F)
    where
        F: Fn(&Context, Error) + Send + Sync + 'static,
    {
        self.error_handler = Arc::new(handler);
    }

    pub fn route_count(&self) -> usize {
        self.routes.read().len()
    }

    /// Build the concrete path of a named route.
    ///
    /// ```
    /// use lattice_core::{Context, HttpMethod, Router};
    ///
    /// let router = Router::new();
    /// router
    ///     .named("user", HttpMethod::GET, "/users/{id}", |_ctx: Context| async { Ok(()) })
    ///     .unwrap();
    ///
    /// assert_eq!(router.reverse("user", [("id", "42")]).unwrap(), "/users/42");
    /// ```
    pub fn reverse<I, K, V>(&self, name: &str, params: I) -> Result<String, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let pattern = self
            .names
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::RouteNotFound(name.to_string()))?;

        let params: HashMap<String, String> = params
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
            .collect();

        pattern.fill(name, &params)
    }

    /// Dispatch a request and produce its response.
    ///
    /// Errors from the pipeline, unmatched paths and unmatched methods all go
    /// through the error handler exactly once.
    pub async fn serve(&self, mut request: HttpRequest) -> HttpResponse {
        if let Some((path, query)) = request.path.split_once('?') {
            request.query_params = parse_query_string(query);
            request.path = path.to_string();
        }

        let mut path_matched = false;
        let mut found = None;
        {
            let routes = self.routes.read();
            for route in routes.iter() {
                if let Some(params) = route.pattern.matches(&request.path) {
                    if route.method.as_str().eq_ignore_ascii_case(&request.method) {
                        found = Some((route.clone(), params));
                        break;
                    }
                    path_matched = true;
                }
            }
        }

        let Some((route, params)) = found else {
            let err = if path_matched {
                Error::MethodNotAllowed(format!("{} {}", request.method, request.path))
            } else {
                Error::NotFound(format!("{} {}", request.method, request.path))
            };
            let ctx = Context::new(request);
            (self.error_handler)(&ctx, err);
            return ctx.take_response();
        };

        trace!(
            method = %request.method,
            pattern = %route.pattern.raw,
            "Route matched"
        );

        request.path_params = params;
        let ctx = Context::new(request);

        if let Err(err) = self
            .middleware
            .apply(ctx.clone(), route.handler.clone())
            .await
        {
            (self.error_handler)(&ctx, err);
        }

        ctx.take_response()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes.read().len())
            .field("names", &self.names.read().len())
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

/// Write a content-free response for `err`.
///
/// The status comes from the error kind and the body is the canonical reason
/// phrase; the error text itself is only logged.
pub fn default_error_handler(ctx: &Context, err: Error) {
    let status = err.http_status();
    if status.is_server_error() {
        error!(method = %ctx.method(), path = %ctx.path(), error = %err, "Request failed");
    } else {
        debug!(method = %ctx.method(), path = %ctx.path(), error = %err, "Request rejected");
    }

    ctx.reset_response();
    ctx.status(status.code());
    ctx.text(status.reason());
}

/// Parse a query string into a map of parameters
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let mut split = part.splitn(2, '=');
            let key = split.next()?;
            let value = split.next().unwrap_or("");
            let key = urlencoding::decode(&key.replace('+', " "))
                .map(|k| k.into_owned())
                .unwrap_or_else(|_| key.to_string());
            let value = urlencoding::decode(&value.replace('+', " "))
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());
            Some((key, value))
        })
        .collect()
}
