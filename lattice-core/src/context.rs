//! Per-request context.
//!
//! A [`Context`] bundles the immutable [`HttpRequest`], the response being
//! built, and a typed value store that middleware use to hand data to inner
//! layers (the session middleware stores its session handle there). It is a
//! cheap handle: clones share the same request state, so a middleware can keep
//! one clone while passing another down the chain and still observe the
//! response the handler wrote.
//!
//! A context lives for exactly one request and is never reused.

use crate::cookie::Cookie;
use crate::{Error, HttpRequest, HttpResponse};
use parking_lot::Mutex;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

type ValueMap = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    request: HttpRequest,
    response: Mutex<HttpResponse>,
    values: Mutex<ValueMap>,
}

impl Context {
    pub fn new(request: HttpRequest) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                request,
                response: Mutex::new(HttpResponse::ok()),
                values: Mutex::new(HashMap::new()),
            }),
        }
    }

    // ========== Request accessors ==========

    pub fn request(&self) -> &HttpRequest {
        &self.inner.request
    }

    pub fn method(&self) -> &str {
        &self.inner.request.method
    }

    pub fn path(&self) -> &str {
        &self.inner.request.path
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.inner.request.param(name).map(String::as_str)
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.inner.request.query(name).map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.request.header(name)
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.inner.request.cookie(name)
    }

    // ========== Response writers ==========

    pub fn status(&self, status: u16) {
        self.inner.response.lock().status = status;
    }

    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
        self.inner
            .response
            .lock()
            .headers
            .insert(name.into(), value.into());
    }

    pub fn set_cookie(&self, cookie: Cookie) {
        self.inner.response.lock().set_cookie(cookie);
    }

    pub fn write(&self, body: impl Into<Vec<u8>>) {
        self.inner.response.lock().body = body.into();
    }

    pub fn text(&self, body: impl Into<String>) {
        self.set_header("Content-Type", "text/plain; charset=utf-8");
        self.write(body.into());
    }

    pub fn html(&self, body: impl Into<String>) {
        self.set_header("Content-Type", "text/html; charset=utf-8");
        self.write(body.into());
    }

    pub fn json<T: Serialize>(&self, value: &T) -> Result<(), Error> {
        let body = serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
        self.set_header("Content-Type", "application/json");
        self.write(body);
        Ok(())
    }

    /// Inspect or modify the response under its lock.
    ///
    /// The closure must not block; the lock is a plain mutex.
    pub fn with_response<R>(&self, f: impl FnOnce(&mut HttpResponse) -> R) -> R {
        f(&mut self.inner.response.lock())
    }

    pub fn response_status(&self) -> u16 {
        self.inner.response.lock().status
    }

    /// Discard the status, headers and body written so far.
    ///
    /// Pending cookies are kept, so a session saved before a failure still
    /// reaches the client.
    pub fn reset_response(&self) {
        let mut response = self.inner.response.lock();
        let cookies = std::mem::take(&mut response.cookies);
        *response = HttpResponse::ok();
        response.cookies = cookies;
    }

    /// Move the finished response out of the context.
    pub fn take_response(&self) -> HttpResponse {
        std::mem::take(&mut *self.inner.response.lock())
    }

    // ========== Per-request values ==========

    /// Store a value for inner layers, replacing any value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&self, value: T) {
        self.inner
            .values
            .lock()
            .insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Clone out the value of type `T`, if one was stored.
    pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.inner
            .values
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.inner.values.lock().contains_key(&TypeId::of::<T>())
    }

    pub fn remove<T: Send + Sync + 'static>(&self) -> Option<T> {
        self.inner
            .values
            .lock()
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.inner.request.method)
            .field("path", &self.inner.request.path)
            .field("values", &self.inner.values.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct UserId(u64);

    #[test]
    fn test_request_accessors() {
        let mut req = HttpRequest::new("GET", "/users/7")
            .with_header("Accept", "text/html")
            .with_cookie("sid", "abc");
        req.path_params.insert("id".into(), "7".into());
        req.query_params.insert("page".into(), "2".into());

        let ctx = Context::new(req);
        assert_eq!(ctx.method(), "GET");
        assert_eq!(ctx.path(), "/users/7");
        assert_eq!(ctx.param("id"), Some("7"));
        assert_eq!(ctx.query("page"), Some("2"));
        assert_eq!(ctx.header("accept"), Some("text/html"));
        assert_eq!(ctx.cookie("sid"), Some("abc".to_string()));
    }

    #[test]
    fn test_clones_share_response() {
        let ctx = Context::new(HttpRequest::new("GET", "/"));
        let inner = ctx.clone();

        inner.status(201);
        inner.text("created");

        let response = ctx.take_response();
        assert_eq!(response.status, 201);
        assert_eq!(response.body_str(), "created");
        assert_eq!(
            response.headers.get("Content-Type"),
            Some(&"text/plain; charset=utf-8".to_string())
        );
    }

    #[test]
    fn test_json_writer() {
        let ctx = Context::new(HttpRequest::new("GET", "/"));
        ctx.json(&serde_json::json!({"id": 1})).unwrap();
        let response = ctx.take_response();
        assert_eq!(response.body_str(), r#"{"id":1}"#);
    }

    #[test]
    fn test_typed_values() {
        let ctx = Context::new(HttpRequest::new("GET", "/"));
        assert!(!ctx.contains::<UserId>());

        ctx.insert(UserId(5));
        ctx.clone().insert(UserId(6));

        assert_eq!(ctx.get::<UserId>(), Some(UserId(6)));
        assert_eq!(ctx.remove::<UserId>(), Some(UserId(6)));
        assert_eq!(ctx.get::<UserId>(), None);
    }

    #[test]
    fn test_reset_response() {
        let ctx = Context::new(HttpRequest::new("GET", "/"));
        ctx.status(418);
        ctx.write(b"partial".to_vec());
        ctx.set_header("X-Partial", "1");
        ctx.set_cookie(Cookie::new("sid", "abc"));
        ctx.reset_response();
        let response = ctx.take_response();
        assert_eq!(response.status, 200);
        assert!(response.body.is_empty());
        assert!(response.headers.is_empty());
        assert_eq!(response.cookie("sid").map(|c| c.value.as_str()), Some("abc"));
    }
}
