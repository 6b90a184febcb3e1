//! Session persistence for Lattice applications.
//!
//! A session is a small map of [`SessionValue`]s tied to one client through
//! a cookie. Two backends implement [`SessionStore`]:
//!
//! - [`MemoryStore`] keeps records in process memory, keyed by a random id
//!   carried in the cookie, and evicts expired records from a background
//!   task.
//! - [`CookieStore`] keeps nothing on the server: the values are encoded,
//!   sealed with AES-GCM and sent as the cookie itself.
//!
//! [`SessionMiddleware`] loads (or creates) the session before the handler
//! runs and saves it afterwards. Handlers reach it through
//! [`SessionContextExt::session`].
//!
//! # Examples
//!
//! ```no_run
//! use lattice_core::{Context, Router};
//! use lattice_session::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::from_env()?;
//!     let store = Arc::new(MemoryStore::new(config.clone())?);
//!
//!     let mut router = Router::new();
//!     router.add_middleware(SessionMiddleware::from_config(store, &config));
//!
//!     router.get("/visits", |ctx: Context| async move {
//!         let session = ctx.session()?;
//!         let visits = session.get("visits").and_then(|v| v.as_i64()).unwrap_or(0) + 1;
//!         session.set("visits", visits);
//!         ctx.text(format!("visits: {}", visits));
//!         Ok(())
//!     })?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Cookie store keys
//!
//! ```
//! use lattice_session::{CookieStore, KeySize};
//!
//! let key = CookieStore::generate_key(KeySize::Aes128);
//! let store = CookieStore::new(&key).unwrap().with_max_cookie_size(2048);
//! assert_eq!(store.max_cookie_size(), 2048);
//! ```

pub mod codec;
pub mod config;
pub mod cookie_store;
pub mod error;
pub mod memory;
pub mod middleware;
pub mod session;
pub mod store;
pub mod value;

pub use codec::{Codec, JsonCodec};
pub use config::{CookieOptions, SessionConfig, DEFAULT_COOKIE_NAME, DEFAULT_MAX_COOKIE_SIZE};
pub use cookie_store::{CookieStore, KeySize};
pub use error::{SessionError, SessionResult};
pub use memory::{generate_session_id, MemoryStore};
pub use middleware::SessionMiddleware;
pub use session::{Session, SessionContextExt, SessionHandle};
pub use store::SessionStore;
pub use value::SessionValue;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{CookieOptions, SessionConfig};
    pub use crate::cookie_store::{CookieStore, KeySize};
    pub use crate::error::{SessionError, SessionResult};
    pub use crate::memory::MemoryStore;
    pub use crate::middleware::SessionMiddleware;
    pub use crate::session::{Session, SessionContextExt, SessionHandle};
    pub use crate::store::SessionStore;
    pub use crate::value::SessionValue;
}
