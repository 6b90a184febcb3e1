// Core library for the Lattice HTTP toolkit
// Request/response types, per-request context, routing with URL reversal and
// the middleware pipeline.

pub mod context;
pub mod cookie;
pub mod error;
pub mod handler;
pub mod http;
pub mod logging;
pub mod middleware;
pub mod routing;
pub mod server;
pub mod status;

// Re-export commonly used types
pub use context::Context;
pub use cookie::{Cookie, SameSite};
pub use error::{Error, Result};
pub use handler::{handler, BoxFuture, HandlerFn};
pub use self::http::{HttpMethod, HttpRequest, HttpResponse};
pub use middleware::{
    middleware_fn, FnMiddleware, LoggingMiddleware, Middleware, MiddlewareChain, Next,
    RecoveryMiddleware, RequestId, RequestIdMiddleware,
};
pub use routing::{default_error_handler, ErrorHandler, Route, RoutePattern, Router, Segment};
pub use server::Server;
pub use status::HttpStatus;

// Re-exported so downstream crates implement `Middleware` against the same
// macro version.
pub use async_trait::async_trait;
