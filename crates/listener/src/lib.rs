//! hubhook HTTP listener.
//!
//! Binds an [`dispatch::EventDispatcher`] to one HTTP endpoint using axum.
//! The dispatch core decides what a request means; this crate only moves bytes
//! and statuses across the network boundary:
//!
//! | Situation | Status |
//! |-----------|--------|
//! | Method other than `POST` (body never read) | `404` |
//! | Body larger than [`ListenerConfig::max_body_bytes`] | `413` |
//! | Body stream failed mid-read | `400` |
//! | Signature missing or wrong | `403` |
//! | Delivery accepted (handlers run afterwards) | `200` |
//! | Panic inside the request path | `500` |
//!
//! Responses never carry a body.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Socket binding, body limits, task spawning, and HTTP
//! tracing live here. The [`dispatch`] crate sees only method, headers, and
//! bytes.

pub mod config;
pub mod server;

use std::net::SocketAddr;

use thiserror::Error;

pub use config::{ListenerConfig, DEFAULT_MAX_BODY_BYTES, DEFAULT_PATH};
pub use server::{router, serve, serve_on};

/// Errors raised while setting up or running the listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The configured path cannot be mounted as a literal route.
    #[error("Webhook path '{path}' must start with '/' and contain no route patterns")]
    InvalidPath {
        /// The rejected path.
        path: String,
    },

    /// The configured body limit would reject every request.
    #[error("Maximum body size must be greater than zero")]
    InvalidBodyLimit,

    /// The listen address could not be bound.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Address that was requested.
        address: SocketAddr,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// The accept loop terminated with an error.
    #[error("Webhook server failed: {source}")]
    Serve {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
