//! In-memory session storage implementation.
//!
//! Records live in a process-local map keyed by a random session id that
//! travels in the session cookie. An owned background task evicts expired
//! records; it starts with the store and stops on [`MemoryStore::close`],
//! [`MemoryStore::shutdown`] or drop.

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::session::Session;
use crate::store::SessionStore;
use crate::value::SessionValue;
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use lattice_core::Context;
use parking_lot::{Mutex, RwLock};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

/// Random bytes per session id (256 bits).
const SESSION_ID_BYTES: usize = 32;

/// Generate a new session id: 32 bytes from the OS CSPRNG, base64url
/// without padding.
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Debug, Clone)]
struct SessionRecord {
    values: HashMap<String, SessionValue>,
    created_at: Instant,
    expires_at: Instant,
}

impl SessionRecord {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Default)]
struct Inner {
    records: RwLock<HashMap<String, SessionRecord>>,
}

impl Inner {
    fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, record| !record.is_expired(now));
        before - records.len()
    }
}

struct Sweeper {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Process-local session store.
///
/// Must be created inside a Tokio runtime, which hosts the eviction task.
///
/// # Examples
///
/// ```no_run
/// use lattice_session::{MemoryStore, SessionConfig};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStore::new(
///         SessionConfig::new().with_cleanup_interval(Duration::from_secs(600)),
///     )?;
///
///     // ... serve requests ...
///
///     store.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct MemoryStore {
    inner: Arc<Inner>,
    config: SessionConfig,
    sweeper: Mutex<Option<Sweeper>>,
}

impl MemoryStore {
    /// Create the store and start its eviction task.
    pub fn new(config: SessionConfig) -> SessionResult<Self> {
        config.validate()?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            SessionError::Config("MemoryStore must be created inside a Tokio runtime".into())
        })?;

        let inner = Arc::new(Inner::default());
        let (stop, stop_rx) = oneshot::channel();
        let handle = runtime.spawn(sweep(inner.clone(), config.cleanup_interval, stop_rx));

        debug!(
            cleanup_interval_secs = config.cleanup_interval.as_secs(),
            default_ttl_secs = config.default_ttl.as_secs(),
            "Memory session store started"
        );

        Ok(Self {
            inner,
            config,
            sweeper: Mutex::new(Some(Sweeper { stop, handle })),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Number of stored records, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.inner.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.read().is_empty()
    }

    /// Remove expired records now, returning how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        self.inner.cleanup_expired()
    }

    /// Whether the eviction task is still owned by this store.
    pub fn is_running(&self) -> bool {
        self.sweeper.lock().is_some()
    }

    /// Stop the eviction task and drop every record.
    pub fn close(&self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            let _ = sweeper.stop.send(());
        }
        self.inner.records.write().clear();
        info!("Memory session store closed");
    }

    /// Like [`MemoryStore::close`], and also wait for the task to exit.
    pub async fn shutdown(&self) {
        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            let _ = sweeper.stop.send(());
            let _ = sweeper.handle.await;
        }
        self.inner.records.write().clear();
        info!("Memory session store shut down");
    }

    /// Record deadline; a lifetime past what the clock can represent is a
    /// configuration error.
    fn expiry(&self, now: Instant, max_age: Option<i64>) -> SessionResult<Instant> {
        let ttl = match max_age {
            Some(age) if age > 0 => Duration::from_secs(age as u64),
            _ => self.config.default_ttl,
        };
        now.checked_add(ttl).ok_or_else(|| {
            SessionError::Config(format!("session lifetime of {}s is out of range", ttl.as_secs()))
        })
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            let _ = sweeper.stop.send(());
        }
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("records", &self.len())
            .field("running", &self.is_running())
            .finish()
    }
}

async fn sweep(inner: Arc<Inner>, period: Duration, mut stop: oneshot::Receiver<()>) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                let removed = inner.cleanup_expired();
                if removed > 0 {
                    debug!(removed, "Evicted expired sessions");
                }
            }
        }
    }

    trace!("Session eviction task stopped");
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, ctx: &Context, name: &str) -> SessionResult<Session> {
        let id = ctx.cookie(name).ok_or(SessionError::NotFound)?;

        let values = {
            let records = self.inner.records.read();
            match records.get(&id) {
                Some(record) if !record.is_expired(Instant::now()) => record.values.clone(),
                _ => return Err(SessionError::NotFound),
            }
        };

        Ok(Session::loaded(
            id,
            name,
            values,
            self.config.cookie_options.clone(),
        ))
    }

    async fn new(&self, _ctx: &Context, name: &str) -> SessionResult<Session> {
        Ok(Session::new(name, self.config.cookie_options.clone()))
    }

    async fn save(&self, ctx: &Context, session: &mut Session) -> SessionResult<()> {
        if session.options.is_removal() {
            if !session.id.is_empty() {
                self.inner.records.write().remove(&session.id);
            }
            ctx.set_cookie(session.options.expired_cookie(&session.name));
            session.id.clear();
            return Ok(());
        }

        let now = Instant::now();
        let expires_at = self.expiry(now, session.options.max_age)?;

        if session.id.is_empty() {
            session.id = generate_session_id();
        }

        let values = session.values();

        {
            let mut records = self.inner.records.write();
            let created_at = records
                .get(&session.id)
                .map(|r| r.created_at)
                .unwrap_or(now);
            records.insert(
                session.id.clone(),
                SessionRecord {
                    values,
                    created_at,
                    expires_at,
                },
            );
        }

        ctx.set_cookie(session.options.cookie(&session.name, session.id.clone()));
        Ok(())
    }
}
