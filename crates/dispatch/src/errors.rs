//! Error and fault-isolation types for the dispatch core.
//!
//! [`HookError`] is what a handler reports when it fails without panicking.
//! [`FaultIsolation`] decides what a delivery does with the remaining handlers
//! once one of them has failed, whether by error or by panic.
//!
//! Authentication failures are deliberately absent: a bad signature is an
//! expected outcome of [`crate::EventDispatcher::handle_request`], reported as
//! [`crate::Dispatch::Forbidden`], never as an error value.

use std::str::FromStr;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Fault isolation
// ---------------------------------------------------------------------------

/// What happens to the remaining handlers of a delivery after one fails.
///
/// Either way the fault is caught, logged, and never reaches the HTTP response
/// (which has already been sent) or the serving process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FaultIsolation {
    /// Every handler gets its own recovery scope; a failing handler never
    /// prevents the handlers registered after it from running.
    #[default]
    PerHandler,
    /// One recovery scope around the whole fan-out: the first failure stops
    /// the delivery and the handlers after it are skipped.
    AbortRemaining,
}

impl FaultIsolation {
    /// Returns the configuration spelling of this policy.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PerHandler => "per-handler",
            Self::AbortRemaining => "abort-remaining",
        }
    }
}

impl std::fmt::Display for FaultIsolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FaultIsolation {
    type Err = UnknownSettingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-handler" | "per_handler" => Ok(Self::PerHandler),
            "abort-remaining" | "abort_remaining" => Ok(Self::AbortRemaining),
            _ => Err(UnknownSettingError {
                setting: "fault isolation",
                value: s.to_owned(),
                expected: "per-handler, abort-remaining",
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure reported by a handler.
///
/// Closures registered with [`crate::EventDispatcher::register`] may return
/// `Result<(), E>` for any displayable `E`; the error is converted into a
/// [`HookError::Failed`] carrying its message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HookError {
    /// The handler returned an error.
    #[error("Handler failed: {message}")]
    Failed {
        /// Display form of the underlying error.
        message: String,
    },

    /// The handler panicked; the panic was caught at the dispatch boundary.
    #[error("Handler panicked: {message}")]
    Panicked {
        /// The panic payload when it was a string, otherwise a placeholder.
        message: String,
    },
}

impl HookError {
    /// Creates a [`HookError::Failed`] from any message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// A secret key could not be constructed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecretKeyError {
    /// The key material was empty.
    #[error("Secret key must not be empty")]
    Empty,

    /// The hex-encoded form of the key could not be decoded.
    #[error("Secret key is not valid hex: {reason}")]
    InvalidHex {
        /// Decoder message.
        reason: String,
    },
}

/// A textual setting did not name a known variant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unrecognised {setting} '{value}' (expected one of: {expected})")]
pub struct UnknownSettingError {
    /// Which setting was being parsed.
    pub setting: &'static str,
    /// The rejected input.
    pub value: String,
    /// Accepted spellings.
    pub expected: &'static str,
}
