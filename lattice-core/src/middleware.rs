// Middleware pipeline around context-aware handlers
//
// Middleware run in registration order on the way in and in reverse order on
// the way out: the first middleware added is the outermost layer. For
// middleware m1..mn and handler h the effective handler is m1(m2(..mn(h))).

use crate::handler::{BoxFuture, HandlerFn};
use crate::{Context, Error};
use async_trait::async_trait;
use futures_util::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace};

/// Type alias for the next handler in the middleware chain
pub type Next = Box<dyn FnOnce(Context) -> BoxFuture<Result<(), Error>> + Send>;

/// A decorator around the rest of the chain.
///
/// A middleware may inspect or mutate the context, short-circuit by returning
/// an error without calling `next`, or post-process after `next` returns.
/// When it observes an error coming back from `next` it must not assume a
/// response has been written.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, ctx: Context, next: Next) -> Result<(), Error>;
}

/// Middleware chain executor
#[derive(Clone)]
pub struct MiddlewareChain {
    middlewares: Arc<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self {
            middlewares: Arc::new(Vec::new()),
        }
    }

    /// Add a middleware to the chain
    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        self.push(Arc::new(middleware));
    }

    /// Add an already shared middleware to the chain
    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        let mut mws = (*self.middlewares).clone();
        mws.push(middleware);
        self.middlewares = Arc::new(mws);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Execute the middleware chain with a handler
    pub async fn apply(&self, ctx: Context, handler: HandlerFn) -> Result<(), Error> {
        debug!(
            middleware_count = self.middlewares.len(),
            path = %ctx.path(),
            method = %ctx.method(),
            "Executing middleware chain"
        );
        self.execute_from(0, ctx, handler).await
    }

    /// Compose the chain around `handler` into a single handler.
    pub fn wrap(&self, handler: HandlerFn) -> HandlerFn {
        let chain = self.clone();
        Arc::new(move |ctx| chain.execute_from(0, ctx, handler.clone()))
    }

    fn execute_from(
        &self,
        index: usize,
        ctx: Context,
        handler: HandlerFn,
    ) -> BoxFuture<Result<(), Error>> {
        if index >= self.middlewares.len() {
            trace!("Middleware chain complete, calling handler");
            handler(ctx)
        } else {
            let middleware = self.middlewares[index].clone();
            let chain = self.clone();

            trace!(middleware_index = index, "Executing middleware");
            Box::pin(async move {
                middleware
                    .handle(
                        ctx,
                        Box::new(move |ctx| chain.execute_from(index + 1, ctx, handler)),
                    )
                    .await
            })
        }
    }
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self::new()
    }
}

// ========== Closure middleware ==========

/// Middleware built from an async closure, see [`middleware_fn`].
pub struct FnMiddleware<F> {
    f: F,
}

/// Build a middleware from `async |ctx, next| { ... }`.
///
/// ```
/// use lattice_core::{middleware_fn, Context, MiddlewareChain, Next};
///
/// let mut chain = MiddlewareChain::new();
/// chain.use_middleware(middleware_fn(|ctx: Context, next: Next| async move {
///     ctx.set_header("X-Powered-By", "lattice");
///     next(ctx).await
/// }));
/// ```
pub fn middleware_fn<F, Fut>(f: F) -> FnMiddleware<F>
where
    F: Fn(Context, Next) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), Error>> + Send,
{
    FnMiddleware { f }
}

#[async_trait]
impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(Context, Next) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), Error>> + Send,
{
    async fn handle(&self, ctx: Context, next: Next) -> Result<(), Error> {
        (self.f)(ctx, next).await
    }
}

// ========== Built-in Middleware ==========

/// Converts panics raised anywhere below it into [`Error::PanicRecovered`].
///
/// Install it first so it wraps every other layer. The conversion is
/// deterministic: string payloads are carried over, anything else becomes a
/// fixed message.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryMiddleware;

impl RecoveryMiddleware {
    pub fn new() -> Self {
        Self
    }
}

/// Render a panic payload as text.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[async_trait]
impl Middleware for RecoveryMiddleware {
    async fn handle(&self, ctx: Context, next: Next) -> Result<(), Error> {
        let method = ctx.method().to_string();
        let path = ctx.path().to_string();

        // `next` itself may panic before returning a future.
        let outcome = match std::panic::catch_unwind(AssertUnwindSafe(move || next(ctx))) {
            Ok(fut) => AssertUnwindSafe(fut).catch_unwind().await,
            Err(payload) => Err(payload),
        };

        match outcome {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(
                    method = %method,
                    path = %path,
                    panic = %message,
                    "Recovered from panic in request handler"
                );
                Err(Error::PanicRecovered(message))
            }
        }
    }
}

/// HTTP Request/Response Logging Middleware
///
/// Logs method, path, status code and duration of every request through
/// `tracing`. Failed requests are logged at error level with the error text;
/// that text stays in the logs and never reaches the client.
#[derive(Debug, Clone, Default)]
pub struct LoggingMiddleware {
    /// Log the request's query parameters
    pub log_query: bool,
}

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, enable: bool) -> Self {
        self.log_query = enable;
        self
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(&self, ctx: Context, next: Next) -> Result<(), Error> {
        let start = Instant::now();
        let method = ctx.method().to_string();
        let path = ctx.path().to_string();

        if self.log_query && !ctx.request().query_params.is_empty() {
            info!(
                method = %method,
                path = %path,
                query = ?ctx.request().query_params,
                "HTTP request received"
            );
        } else {
            info!(method = %method, path = %path, "HTTP request received");
        }

        let result = next(ctx.clone()).await;
        let duration = start.elapsed();

        match &result {
            Ok(()) => {
                info!(
                    method = %method,
                    path = %path,
                    status = ctx.response_status(),
                    duration_ms = duration.as_millis() as u64,
                    "HTTP response sent"
                );
            }
            Err(err) => {
                error!(
                    method = %method,
                    path = %path,
                    duration_ms = duration.as_millis() as u64,
                    error = %err,
                    "HTTP request failed"
                );
            }
        }

        result
    }
}

/// Request id carried in the context by [`RequestIdMiddleware`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Request ID middleware
///
/// Reuses an incoming `x-request-id` header or generates a UUID, exposes it
/// to inner layers as [`RequestId`] and echoes it on the response.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdMiddleware;

#[async_trait]
impl Middleware for RequestIdMiddleware {
    async fn handle(&self, ctx: Context, next: Next) -> Result<(), Error> {
        let request_id = ctx
            .header("x-request-id")
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        ctx.insert(RequestId(request_id.clone()));
        let result = next(ctx.clone()).await;
        ctx.set_header("x-request-id", request_id);

        result
    }
}
