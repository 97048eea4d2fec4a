//! Dispatch core for hubhook.
//!
//! Verifies signed webhook deliveries and routes them to handlers registered
//! by event type. Everything network-facing (binding a socket, reading the
//! body off the wire, sending the response) belongs to the `listener` crate;
//! this crate only sees a method, a header map, and the raw body bytes.
//!
//! ## Architectural Layer
//!
//! **Business logic.** No network I/O. `http` and `bytes` are used purely as
//! value types so that any HTTP stack can feed requests in.
//!
//! ## Handler panics
//!
//! [`DeliveryJob::run`] catches handler panics and logs them at `error` with
//! the panic message, event type, delivery id and handler position. It does
//! not capture a stack trace: the panic hook in effect at the panic site is
//! the only thing that sees one. Embedders that want the trace in their logs
//! must install a panic hook that records [`std::backtrace::Backtrace`] (the
//! `hubhook` binary does), or run with `RUST_BACKTRACE=1` so the default hook
//! prints it to stderr.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | `EventType`, `DeliveryId` newtypes |
//! | [`signature`] | `SecretKey`, `SignatureAlgorithm`, `verify`, `sign` |
//! | [`dispatcher`] | `EventDispatcher`, `Hook`, `Dispatch`, `DeliveryJob` |
//! | [`errors`] | `HookError`, `FaultIsolation`, configuration parse errors |

pub mod dispatcher;
pub mod errors;
pub mod identifiers;
pub mod signature;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use dispatcher::{
    Delivery, DeliveryJob, DeliveryReport, Dispatch, EventDispatcher, Hook, IntoHookResult,
    DELIVERY_HEADER, EVENT_HEADER,
};
pub use errors::{FaultIsolation, HookError, SecretKeyError, UnknownSettingError};
pub use identifiers::{DeliveryId, EventType};
pub use signature::{sign, verify, SecretKey, SignatureAlgorithm};
