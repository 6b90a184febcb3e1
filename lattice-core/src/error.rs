// Error types for the Lattice framework

use crate::HttpStatus;
use thiserror::Error;

/// Result alias used across the core crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// No route is registered under the requested name (URL reversal).
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    /// A placeholder was left unresolved while reversing a named route.
    #[error("Missing parameter '{param}' for route '{route}'")]
    MissingRouteParameter { route: String, param: String },

    #[error("Invalid route pattern '{pattern}': {reason}")]
    InvalidRoutePattern { pattern: String, reason: String },

    /// No registered pattern matches the request path.
    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Opaque application-level failure raised by a handler.
    #[error("Handler error: {0}")]
    Handler(String),

    /// A panic caught by the recovery middleware.
    #[error("Panic recovered: {0}")]
    PanicRecovered(String),

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session persistence failed: {0}")]
    SessionPersistence(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap any displayable application failure as a handler error.
    pub fn handler(err: impl std::fmt::Display) -> Self {
        Error::Handler(err.to_string())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        self.http_status().code()
    }

    /// Get the HttpStatus enum for this error
    pub fn http_status(&self) -> HttpStatus {
        match self {
            Error::NotFound(_) => HttpStatus::NotFound,
            Error::MethodNotAllowed(_) => HttpStatus::MethodNotAllowed,
            Error::BadRequest(_) => HttpStatus::BadRequest,
            Error::Unauthorized(_) => HttpStatus::Unauthorized,
            Error::Forbidden(_) => HttpStatus::Forbidden,
            Error::PayloadTooLarge(_) => HttpStatus::PayloadTooLarge,

            // Reversal, session and handler failures are server-side problems
            // from the client's point of view.
            _ => HttpStatus::InternalServerError,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.http_status().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.http_status().is_server_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::NotFound("/x".into()).status_code(), 404);
        assert_eq!(Error::MethodNotAllowed("POST /x".into()).status_code(), 405);
        assert_eq!(Error::PayloadTooLarge("cookie".into()).status_code(), 413);
        assert_eq!(Error::PanicRecovered("boom".into()).status_code(), 500);
        assert_eq!(Error::RouteNotFound("home".into()).status_code(), 500);
        assert_eq!(Error::SessionNotFound.status_code(), 500);
    }

    #[test]
    fn test_classification() {
        assert!(Error::Forbidden("no".into()).is_client_error());
        assert!(Error::handler("db down").is_server_error());
    }

    #[test]
    fn test_handler_constructor_keeps_message() {
        let err = Error::handler(std::fmt::Error);
        assert!(matches!(err, Error::Handler(_)));
        assert!(err.to_string().starts_with("Handler error:"));
    }

    #[test]
    fn test_missing_parameter_display() {
        let err = Error::MissingRouteParameter {
            route: "user".into(),
            param: "id".into(),
        };
        assert_eq!(err.to_string(), "Missing parameter 'id' for route 'user'");
    }
}
