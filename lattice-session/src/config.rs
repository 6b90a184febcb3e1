//! Session configuration.

use crate::error::{SessionError, SessionResult};
use lattice_core::{Cookie, SameSite};
use std::time::Duration;

/// Default session cookie name.
pub const DEFAULT_COOKIE_NAME: &str = "lattice_session";

/// Default cookie size budget in bytes, the smallest per-cookie limit common
/// browsers enforce.
pub const DEFAULT_MAX_COOKIE_SIZE: usize = 4096;

/// Attributes of the session cookie.
///
/// `max_age` of `None` makes a browser-session cookie; `Some(n)` with
/// `n <= 0` deletes the session on the next save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub path: String,
    pub domain: Option<String>,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
            max_age: None,
            secure: false,
            http_only: true,
            same_site: SameSite::Lax,
        }
    }
}

impl CookieOptions {
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    /// Whether a save under these options removes the session.
    pub fn is_removal(&self) -> bool {
        matches!(self.max_age, Some(age) if age <= 0)
    }

    /// Build the `Set-Cookie` entry for `name=value`.
    pub fn cookie(&self, name: &str, value: impl Into<String>) -> Cookie {
        let mut cookie = Cookie::new(name, value)
            .with_path(self.path.clone())
            .with_secure(self.secure)
            .with_http_only(self.http_only)
            .with_same_site(self.same_site);
        if let Some(ref domain) = self.domain {
            cookie = cookie.with_domain(domain.clone());
        }
        if let Some(age) = self.max_age {
            cookie = cookie.with_max_age(age);
        }
        cookie
    }

    /// Build a cookie that drops `name` from the browser.
    pub fn expired_cookie(&self, name: &str) -> Cookie {
        self.cookie(name, "").with_max_age(0)
    }
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Cookie carrying the session id or payload
    pub cookie_name: String,
    pub cookie_options: CookieOptions,
    /// Record lifetime in the memory store when no positive max-age is set
    pub default_ttl: Duration,
    /// Period of the memory store's eviction sweep
    pub cleanup_interval: Duration,
    /// Cookie store size budget for the encoded value
    pub max_cookie_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_options: CookieOptions::default(),
            default_ttl: Duration::from_secs(86400), // 24 hours
            cleanup_interval: Duration::from_secs(3600), // 1 hour
            max_cookie_size: DEFAULT_MAX_COOKIE_SIZE,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from `LATTICE_SESSION_*` environment variables.
    ///
    /// Recognised: `COOKIE_NAME`, `TTL_SECS`, `CLEANUP_INTERVAL_SECS`,
    /// `SECURE` and `MAX_COOKIE_SIZE`. Unset variables keep their defaults;
    /// unparsable ones are a configuration error.
    pub fn from_env() -> SessionResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`SessionConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> SessionResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup("LATTICE_SESSION_COOKIE_NAME") {
            config = config.with_cookie_name(name);
        }
        if let Some(secs) = lookup("LATTICE_SESSION_TTL_SECS") {
            config.default_ttl = Duration::from_secs(parse_var("LATTICE_SESSION_TTL_SECS", &secs)?);
        }
        if let Some(secs) = lookup("LATTICE_SESSION_CLEANUP_INTERVAL_SECS") {
            config.cleanup_interval = Duration::from_secs(parse_var(
                "LATTICE_SESSION_CLEANUP_INTERVAL_SECS",
                &secs,
            )?);
        }
        if let Some(secure) = lookup("LATTICE_SESSION_SECURE") {
            config.cookie_options.secure = parse_bool("LATTICE_SESSION_SECURE", &secure)?;
        }
        if let Some(size) = lookup("LATTICE_SESSION_MAX_COOKIE_SIZE") {
            config.max_cookie_size = parse_var("LATTICE_SESSION_MAX_COOKIE_SIZE", &size)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn with_cookie_options(mut self, options: CookieOptions) -> Self {
        self.cookie_options = options;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn with_max_cookie_size(mut self, size: usize) -> Self {
        self.max_cookie_size = size;
        self
    }

    /// Reject values the stores cannot work with.
    pub fn validate(&self) -> SessionResult<()> {
        if self.cookie_name.is_empty() {
            return Err(SessionError::Config("cookie name must not be empty".into()));
        }
        if self.cleanup_interval.is_zero() {
            return Err(SessionError::Config(
                "cleanup interval must be greater than zero".into(),
            ));
        }
        if self.default_ttl.is_zero() {
            return Err(SessionError::Config(
                "default TTL must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> SessionResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SessionError::Config(format!("{} has an invalid value: {}", key, value)))
}

fn parse_bool(key: &str, value: &str) -> SessionResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SessionError::Config(format!(
            "{} has an invalid value: {}",
            key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.cookie_name, "lattice_session");
        assert_eq!(config.default_ttl, Duration::from_secs(86400));
        assert_eq!(config.cleanup_interval, Duration::from_secs(3600));
        assert_eq!(config.max_cookie_size, 4096);
        assert_eq!(config.cookie_options.path, "/");
        assert!(config.cookie_options.http_only);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = SessionConfig::from_lookup(lookup(&[
            ("LATTICE_SESSION_COOKIE_NAME", "sid"),
            ("LATTICE_SESSION_TTL_SECS", "600"),
            ("LATTICE_SESSION_CLEANUP_INTERVAL_SECS", "30"),
            ("LATTICE_SESSION_SECURE", "true"),
            ("LATTICE_SESSION_MAX_COOKIE_SIZE", "2048"),
        ]))
        .unwrap();

        assert_eq!(config.cookie_name, "sid");
        assert_eq!(config.default_ttl, Duration::from_secs(600));
        assert_eq!(config.cleanup_interval, Duration::from_secs(30));
        assert!(config.cookie_options.secure);
        assert_eq!(config.max_cookie_size, 2048);
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let result = SessionConfig::from_lookup(lookup(&[("LATTICE_SESSION_TTL_SECS", "soon")]));
        assert!(matches!(result, Err(SessionError::Config(_))));

        let result =
            SessionConfig::from_lookup(lookup(&[("LATTICE_SESSION_CLEANUP_INTERVAL_SECS", "0")]));
        assert!(matches!(result, Err(SessionError::Config(_))));

        let result = SessionConfig::from_lookup(lookup(&[("LATTICE_SESSION_SECURE", "maybe")]));
        assert!(matches!(result, Err(SessionError::Config(_))));
    }

    #[test]
    fn test_cookie_rendering() {
        let options = CookieOptions::default()
            .with_domain("example.com")
            .with_max_age(60)
            .with_secure(true)
            .with_same_site(SameSite::Strict);

        let cookie = options.cookie("sid", "abc");
        assert_eq!(
            cookie.to_header_value(),
            "sid=abc; Path=/; Domain=example.com; Max-Age=60; Secure; HttpOnly; SameSite=Strict"
        );

        let expired = options.expired_cookie("sid");
        assert!(expired.is_removal());
        assert_eq!(expired.value, "");
    }

    #[test]
    fn test_removal_options() {
        assert!(!CookieOptions::default().is_removal());
        assert!(CookieOptions::default().with_max_age(0).is_removal());
        assert!(CookieOptions::default().with_max_age(-1).is_removal());
        assert!(!CookieOptions::default().with_max_age(1).is_removal());
    }
}
