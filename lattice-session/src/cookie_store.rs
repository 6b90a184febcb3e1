//! Encrypted cookie session storage.
//!
//! The whole session travels in the cookie, sealed with AES-GCM:
//!
//! ```text
//! cookie value = base64url(nonce || ciphertext)
//! ```
//!
//! A fresh 12-byte nonce is drawn for every save. The key length picks the
//! cipher: 16 bytes for AES-128-GCM, 24 for AES-192-GCM, 32 for AES-256-GCM.
//! Missing, malformed, tampered and foreign-key cookies all read as
//! [`SessionError::NotFound`].

use crate::codec::{Codec, JsonCodec};
use crate::config::{CookieOptions, SessionConfig, DEFAULT_MAX_COOKIE_SIZE};
use crate::error::{SessionError, SessionResult};
use crate::session::Session;
use crate::store::SessionStore;
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm, Nonce};
use async_trait::async_trait;
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use lattice_core::Context;
use std::sync::Arc;
use tracing::{debug, trace};

type Aes192Gcm = AesGcm<Aes192, U12>;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Supported key sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySize {
    Aes128,
    Aes192,
    Aes256,
}

impl KeySize {
    pub fn bytes(&self) -> usize {
        match self {
            KeySize::Aes128 => 16,
            KeySize::Aes192 => 24,
            KeySize::Aes256 => 32,
        }
    }
}

enum SessionCipher {
    Aes128(Box<Aes128Gcm>),
    Aes192(Box<Aes192Gcm>),
    Aes256(Box<Aes256Gcm>),
}

impl SessionCipher {
    fn new(key: &[u8]) -> SessionResult<Self> {
        let invalid = |_| SessionError::InvalidKeyLength(key.len());
        match key.len() {
            16 => Ok(Self::Aes128(Box::new(
                Aes128Gcm::new_from_slice(key).map_err(invalid)?,
            ))),
            24 => Ok(Self::Aes192(Box::new(
                Aes192Gcm::new_from_slice(key).map_err(invalid)?,
            ))),
            32 => Ok(Self::Aes256(Box::new(
                Aes256Gcm::new_from_slice(key).map_err(invalid)?,
            ))),
            other => Err(SessionError::InvalidKeyLength(other)),
        }
    }

    fn key_size(&self) -> KeySize {
        match self {
            Self::Aes128(_) => KeySize::Aes128,
            Self::Aes192(_) => KeySize::Aes192,
            Self::Aes256(_) => KeySize::Aes256,
        }
    }

    fn seal(&self, nonce: &[u8; NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>, aes_gcm::Error> {
        let nonce = Nonce::<U12>::from_slice(nonce);
        match self {
            Self::Aes128(c) => c.encrypt(nonce, plaintext),
            Self::Aes192(c) => c.encrypt(nonce, plaintext),
            Self::Aes256(c) => c.encrypt(nonce, plaintext),
        }
    }

    fn open(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, aes_gcm::Error> {
        let nonce = Nonce::<U12>::from_slice(nonce);
        match self {
            Self::Aes128(c) => c.decrypt(nonce, ciphertext),
            Self::Aes192(c) => c.decrypt(nonce, ciphertext),
            Self::Aes256(c) => c.decrypt(nonce, ciphertext),
        }
    }
}

/// Stateless session store keeping the session inside an encrypted cookie.
///
/// # Examples
///
/// ```
/// use lattice_session::{CookieStore, KeySize};
///
/// let key = CookieStore::generate_key(KeySize::Aes256);
/// let store = CookieStore::new(&key).unwrap();
/// assert_eq!(store.key_size(), KeySize::Aes256);
///
/// assert!(CookieStore::new(&[0u8; 20]).is_err());
/// ```
pub struct CookieStore {
    cipher: SessionCipher,
    codec: Arc<dyn Codec>,
    options: CookieOptions,
    max_cookie_size: usize,
}

impl CookieStore {
    /// Create a store sealing with `key` (16, 24 or 32 bytes).
    pub fn new(key: &[u8]) -> SessionResult<Self> {
        let cipher = SessionCipher::new(key)?;
        debug!(key_bits = key.len() * 8, "Cookie session store created");
        Ok(Self {
            cipher,
            codec: Arc::new(JsonCodec),
            options: CookieOptions::default(),
            max_cookie_size: DEFAULT_MAX_COOKIE_SIZE,
        })
    }

    /// Create a store using the cookie options and size budget of `config`.
    pub fn from_config(key: &[u8], config: &SessionConfig) -> SessionResult<Self> {
        Ok(Self::new(key)?
            .with_options(config.cookie_options.clone())
            .with_max_cookie_size(config.max_cookie_size))
    }

    /// Create a store from a base64 key held in the environment variable
    /// `var` (standard or URL-safe alphabet).
    pub fn from_env_key(var: &str) -> SessionResult<Self> {
        let encoded = std::env::var(var)
            .map_err(|_| SessionError::Config(format!("{} is not set", var)))?;
        let encoded = encoded.trim();
        let key = URL_SAFE_NO_PAD
            .decode(encoded.trim_end_matches('='))
            .or_else(|_| STANDARD.decode(encoded))
            .map_err(|_| SessionError::Config(format!("{} is not valid base64", var)))?;
        Self::new(&key)
    }

    /// Generate a random key of the given size.
    pub fn generate_key(size: KeySize) -> Vec<u8> {
        let mut key = vec![0u8; size.bytes()];
        OsRng.fill_bytes(&mut key);
        key
    }

    pub fn with_options(mut self, options: CookieOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_codec<C: Codec + 'static>(mut self, codec: C) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn with_max_cookie_size(mut self, size: usize) -> Self {
        self.max_cookie_size = size;
        self
    }

    pub fn key_size(&self) -> KeySize {
        self.cipher.key_size()
    }

    pub fn max_cookie_size(&self) -> usize {
        self.max_cookie_size
    }

    /// Seal `plaintext` into a cookie value.
    pub fn encrypt(&self, plaintext: &[u8]) -> SessionResult<String> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .seal(&nonce, plaintext)
            .map_err(|_| SessionError::Encryption("failed to seal session payload".into()))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);

        Ok(URL_SAFE_NO_PAD.encode(&combined))
    }

    /// Open a cookie value; every failure is [`SessionError::NotFound`].
    pub fn decrypt(&self, encoded: &str) -> SessionResult<Vec<u8>> {
        let combined = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| SessionError::NotFound)?;

        if combined.len() < NONCE_LEN + TAG_LEN {
            return Err(SessionError::NotFound);
        }

        let (nonce, ciphertext) = combined.split_at(NONCE_LEN);
        self.cipher
            .open(nonce, ciphertext)
            .map_err(|_| SessionError::NotFound)
    }
}

impl std::fmt::Debug for CookieStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieStore")
            .field("key_size", &self.key_size())
            .field("options", &self.options)
            .field("max_cookie_size", &self.max_cookie_size)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SessionStore for CookieStore {
    async fn get(&self, ctx: &Context, name: &str) -> SessionResult<Session> {
        let encoded = ctx.cookie(name).ok_or(SessionError::NotFound)?;
        let plaintext = self.decrypt(&encoded)?;
        let values = self.codec.decode(&plaintext).map_err(|err| {
            trace!(error = %err, "Undecodable session payload");
            SessionError::NotFound
        })?;

        Ok(Session::loaded("", name, values, self.options.clone()))
    }

    async fn new(&self, _ctx: &Context, name: &str) -> SessionResult<Session> {
        Ok(Session::new(name, self.options.clone()))
    }

    async fn save(&self, ctx: &Context, session: &mut Session) -> SessionResult<()> {
        if session.options.is_removal() || session.is_empty() {
            ctx.set_cookie(session.options.expired_cookie(&session.name));
            return Ok(());
        }

        let plaintext = self.codec.encode(&session.values())?;
        let encoded = self.encrypt(&plaintext)?;

        if encoded.len() > self.max_cookie_size {
            debug!(
                size = encoded.len(),
                limit = self.max_cookie_size,
                "Session cookie over size budget"
            );
            return Err(SessionError::PayloadTooLarge {
                size: encoded.len(),
                limit: self.max_cookie_size,
            });
        }

        ctx.set_cookie(session.options.cookie(&session.name, encoded));
        Ok(())
    }
}
