//! Session store trait definition.

use crate::error::SessionResult;
use crate::session::Session;
use async_trait::async_trait;
use lattice_core::Context;

/// Backend capability for loading, creating and persisting sessions.
///
/// Stores identify the client through the request carried by `ctx`
/// (normally a cookie called `name`) and write their cookie into the
/// context's response on save.
///
/// # Examples
///
/// ```ignore
/// use lattice_session::{SessionStore, SessionResult};
///
/// async fn load_or_create(store: &dyn SessionStore, ctx: &Context) -> SessionResult<Session> {
///     match store.get(ctx, "sid").await {
///         Ok(session) => Ok(session),
///         Err(_) => store.new(ctx, "sid").await,
///     }
/// }
/// ```
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the existing session for this request.
    ///
    /// Fails with [`SessionError::NotFound`](crate::SessionError::NotFound)
    /// for every kind of miss; never panics.
    async fn get(&self, ctx: &Context, name: &str) -> SessionResult<Session>;

    /// Create a fresh, empty session.
    ///
    /// Returns either a usable session or an error, never both.
    async fn new(&self, ctx: &Context, name: &str) -> SessionResult<Session>;

    /// Persist `session` and set its cookie on the response.
    ///
    /// Saving unchanged content twice leaves equivalent persisted state.
    async fn save(&self, ctx: &Context, session: &mut Session) -> SessionResult<()>;
}
