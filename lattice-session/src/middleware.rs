//! Middleware loading and persisting the request's session.

use crate::config::SessionConfig;
use crate::session::SessionHandle;
use crate::store::SessionStore;
use async_trait::async_trait;
use futures::FutureExt;
use lattice_core::{Context, Error, Middleware, Next};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Session middleware.
///
/// Loads the session named `name` from the store, or creates a new one when
/// loading fails, and makes it available as `ctx.session()`. After the inner
/// chain has run the session is saved, whether the chain succeeded, failed
/// or panicked.
///
/// # Examples
///
/// ```no_run
/// use lattice_core::Router;
/// use lattice_session::{MemoryStore, SessionConfig, SessionMiddleware};
/// use std::sync::Arc;
///
/// # async fn build() -> Result<(), Box<dyn std::error::Error>> {
/// let config = SessionConfig::default();
/// let store = Arc::new(MemoryStore::new(config.clone())?);
///
/// let mut router = Router::new();
/// router.add_middleware(SessionMiddleware::new(store, config.cookie_name));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SessionMiddleware {
    store: Arc<dyn SessionStore>,
    name: String,
}

impl SessionMiddleware {
    pub fn new(store: Arc<dyn SessionStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    /// Use the cookie name from `config`.
    pub fn from_config(store: Arc<dyn SessionStore>, config: &SessionConfig) -> Self {
        Self::new(store, config.cookie_name.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }
}

impl std::fmt::Debug for SessionMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMiddleware")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Middleware for SessionMiddleware {
    async fn handle(&self, ctx: Context, next: Next) -> Result<(), Error> {
        let session = match self.store.get(&ctx, &self.name).await {
            Ok(session) => session,
            Err(err) => {
                trace!(name = %self.name, error = %err, "No existing session, creating one");
                self.store
                    .new(&ctx, &self.name)
                    .await
                    .map_err(Error::from)?
            }
        };

        let handle = SessionHandle::new(session, self.store.clone());
        ctx.insert(handle.clone());

        let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| next(ctx.clone()))) {
            Ok(fut) => AssertUnwindSafe(fut).catch_unwind().await,
            Err(payload) => Err(payload),
        };

        let saved = handle.save(&ctx).await;
        if let Err(ref err) = saved {
            error!(
                name = %self.name,
                path = %ctx.path(),
                error = %err,
                "Failed to save session"
            );
        }

        match outcome {
            Ok(Ok(())) => saved.map_err(Error::from),
            Ok(Err(err)) => {
                if saved.is_ok() {
                    debug!(name = %self.name, "Session saved after failed request");
                }
                Err(err)
            }
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }
}
