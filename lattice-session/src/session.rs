//! Sessions and the per-request session handle.

use crate::config::CookieOptions;
use crate::error::SessionResult;
use crate::store::SessionStore;
use crate::value::SessionValue;
use lattice_core::{Context, Error};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Session data structure.
///
/// `values` is allocated on the first write; reads against an unallocated
/// map report the key as absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Opaque identifier. Empty for cookie-backed sessions and for memory
    /// sessions that were never saved.
    pub id: String,
    /// Cookie name this session is stored under
    pub name: String,
    pub values: Option<HashMap<String, SessionValue>>,
    pub options: CookieOptions,
    pub is_new: bool,
}

impl Session {
    /// A fresh session with no values.
    pub fn new(name: impl Into<String>, options: CookieOptions) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            values: None,
            options,
            is_new: true,
        }
    }

    /// A session restored from a store.
    pub fn loaded(
        id: impl Into<String>,
        name: impl Into<String>,
        values: HashMap<String, SessionValue>,
        options: CookieOptions,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            values: Some(values),
            options,
            is_new: false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&SessionValue> {
        self.values.as_ref()?.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<SessionValue>) {
        self.values
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
    }

    pub fn delete(&mut self, key: &str) -> Option<SessionValue> {
        self.values.as_mut()?.remove(key)
    }

    /// Remove every value, keeping the session itself.
    pub fn clear(&mut self) {
        if let Some(values) = self.values.as_mut() {
            values.clear();
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.values.as_ref().is_none_or(HashMap::is_empty)
    }

    /// Values as a plain map (empty when nothing was ever written).
    pub fn values(&self) -> HashMap<String, SessionValue> {
        self.values.clone().unwrap_or_default()
    }
}

/// Shared handle to the current request's session.
///
/// The session middleware stores one in the request context; handlers reach
/// it through [`SessionContextExt::session`]. Clones refer to the same
/// session.
#[derive(Clone)]
pub struct SessionHandle {
    session: Arc<Mutex<Session>>,
    store: Arc<dyn SessionStore>,
}

impl SessionHandle {
    pub fn new(session: Session, store: Arc<dyn SessionStore>) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            store,
        }
    }

    pub fn get(&self, key: &str) -> Option<SessionValue> {
        self.session.lock().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<SessionValue>) {
        self.session.lock().set(key, value);
    }

    pub fn delete(&self, key: &str) -> Option<SessionValue> {
        self.session.lock().delete(key)
    }

    pub fn clear(&self) {
        self.session.lock().clear();
    }

    pub fn contains(&self, key: &str) -> bool {
        self.session.lock().contains(key)
    }

    pub fn id(&self) -> String {
        self.session.lock().id.clone()
    }

    pub fn name(&self) -> String {
        self.session.lock().name.clone()
    }

    pub fn is_new(&self) -> bool {
        self.session.lock().is_new
    }

    pub fn options(&self) -> CookieOptions {
        self.session.lock().options.clone()
    }

    pub fn set_options(&self, options: CookieOptions) {
        self.session.lock().options = options;
    }

    /// Copy of the current session state.
    pub fn snapshot(&self) -> Session {
        self.session.lock().clone()
    }

    /// Persist the session through its store.
    ///
    /// The store works on a snapshot; the id it assigns is written back.
    /// A save that leaves no id (a removal in the memory store) keeps
    /// `is_new` as it was.
    pub async fn save(&self, ctx: &Context) -> SessionResult<()> {
        let mut snapshot = self.snapshot();
        self.store.save(ctx, &mut snapshot).await?;

        let mut session = self.session.lock();
        let persisted = !snapshot.id.is_empty();
        session.id = snapshot.id;
        if persisted {
            session.is_new = false;
        }
        Ok(())
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session", &*self.session.lock())
            .finish()
    }
}

/// Session access on the request context.
pub trait SessionContextExt {
    /// The session loaded by the session middleware.
    fn session(&self) -> Result<SessionHandle, Error>;
}

impl SessionContextExt for Context {
    fn session(&self) -> Result<SessionHandle, Error> {
        self.get::<SessionHandle>()
            .ok_or_else(|| Error::Internal("session middleware is not installed".to_string()))
    }
}
