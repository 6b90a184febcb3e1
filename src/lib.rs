// Lattice - routing, middleware and sessions for async HTTP services
//
// This library bundles the dispatcher with named routes and URL reversal,
// the ordered middleware pipeline and the session layer.

// Re-export core functionality
pub use lattice_core::*;

// Re-export optional crates
#[cfg(feature = "session")]
pub use lattice_session;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Context,
        Cookie,
        Error,
        HttpMethod,
        HttpRequest,
        HttpResponse,
        LoggingMiddleware,
        Middleware,
        Next,
        RecoveryMiddleware,
        RequestIdMiddleware,
        Route,
        Router,
        SameSite,
        Server,
        async_trait,
        middleware_fn,
    };

    pub use crate::logging::{LogConfig, LogFormat, LogLevel};

    #[cfg(feature = "session")]
    pub use lattice_session::prelude::*;
}
