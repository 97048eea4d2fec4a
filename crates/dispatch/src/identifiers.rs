//! Newtype identifiers carried by every delivery.
//!
//! The event source decides what these strings look like; this crate treats
//! them as opaque. Keeping them as distinct types prevents handing a delivery
//! id to something that expects an event type even though both are strings
//! under the hood.

use std::borrow::Borrow;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new(), as_str(), is_empty(), Display, From, Borrow<str>.
// Empty values are valid: a missing header yields an empty identifier.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from any string value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns `true` if the identifier is the empty string.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id! {
    /// Sender-defined category of a delivery (e.g. `"push"`, `"pull_request"`).
    ///
    /// Read from the `X-GitHub-Event` header and used as the routing key for
    /// registered handlers.
    EventType
}

string_id! {
    /// Identifies one delivery attempt.
    ///
    /// Read from the `X-GitHub-Delivery` header and passed through to handlers,
    /// which may use it for de-duplication. The dispatcher itself never
    /// de-duplicates.
    DeliveryId
}
