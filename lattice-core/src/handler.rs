// Handler types shared by the router and the middleware pipeline
//
// A handler receives the per-request `Context`, writes its response into it
// and returns `Ok(())` or the error that the router's error handler will turn
// into a client response.

use crate::{Context, Error};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by handlers and middleware.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Type-erased, cheaply clonable request handler.
pub type HandlerFn = Arc<dyn Fn(Context) -> BoxFuture<Result<(), Error>> + Send + Sync>;

/// Wrap an async function or closure into a [`HandlerFn`].
///
/// ```
/// use lattice_core::{handler, Context, Error};
///
/// async fn hello(ctx: Context) -> Result<(), Error> {
///     ctx.text("hello");
///     Ok(())
/// }
///
/// let h = handler(hello);
/// let inline = handler(|ctx: Context| async move {
///     ctx.status(204);
///     Ok(())
/// });
/// # let _ = (h, inline);
/// ```
pub fn handler<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    Arc::new(move |ctx| -> BoxFuture<Result<(), Error>> { Box::pin(f(ctx)) })
}
