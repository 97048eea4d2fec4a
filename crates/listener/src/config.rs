//! Listener settings.

use std::net::{Ipv4Addr, SocketAddr};

use crate::ListenerError;

/// Upper bound on request bodies accepted by default (25 MiB, the largest
/// payload the upstream event source will send).
pub const DEFAULT_MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Path the webhook endpoint is mounted at by default.
pub const DEFAULT_PATH: &str = "/webhook";

/// Where and how the webhook endpoint is served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Socket address to bind.
    pub bind_address: SocketAddr,
    /// Route the endpoint is mounted at; must start with `/`.
    pub path: String,
    /// Bodies larger than this are answered with `413` and never verified.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            path: DEFAULT_PATH.to_owned(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ListenerConfig {
    /// Checks that the settings can be turned into a router.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::InvalidPath`] when `path` does not start with
    /// `/` or contains route-pattern syntax (`{`, `}`, `*`, `:`), and
    /// [`ListenerError::InvalidBodyLimit`] when `max_body_bytes` is zero.
    pub fn validate(&self) -> Result<(), ListenerError> {
        let literal = self.path.starts_with('/')
            && !self.path.contains(|c| matches!(c, '{' | '}' | '*' | ':'));
        if !literal {
            return Err(ListenerError::InvalidPath {
                path: self.path.clone(),
            });
        }
        if self.max_body_bytes == 0 {
            return Err(ListenerError::InvalidBodyLimit);
        }
        Ok(())
    }
}
