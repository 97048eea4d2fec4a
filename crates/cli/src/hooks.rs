//! Handlers the `hubhook` binary registers on its own.
//!
//! Real deployments embed the `dispatch` crate and register their own
//! handlers; these exist so a bare `hubhook` process shows what it receives.

use dispatch::{Delivery, EventDispatcher};
use serde::Deserialize;
use tracing::info;

/// The fields of a `ping` payload worth logging.
#[derive(Debug, Default, Deserialize)]
struct PingPayload {
    zen: Option<String>,
    hook_id: Option<u64>,
}

/// Logs the zen line and hook id GitHub sends when a webhook is created.
///
/// # Errors
///
/// Returns the parse error if the body is not a JSON object.
pub fn log_ping(delivery: &Delivery) -> Result<(), serde_json::Error> {
    let ping: PingPayload = serde_json::from_slice(&delivery.body)?;
    info!(
        delivery_id = %delivery.id,
        zen = ping.zen.as_deref().unwrap_or(""),
        hook_id = ping.hook_id,
        "Received ping"
    );
    Ok(())
}

/// Logs that a delivery arrived, without inspecting the payload.
pub fn log_delivery(delivery: &Delivery) {
    info!(
        event_type = %delivery.event,
        delivery_id = %delivery.id,
        body_bytes = delivery.body.len(),
        "Received webhook delivery"
    );
}

/// Registers [`log_ping`] for `ping` and [`log_delivery`] for each of `log_events`.
pub fn register_builtin(dispatcher: &EventDispatcher, log_events: &[String]) {
    dispatcher.register("ping", log_ping);
    for event in log_events {
        dispatcher.register(event.as_str(), log_delivery);
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use dispatch::{DeliveryId, EventType, SecretKey};

    use super::*;

    fn delivery(event: &str, body: &'static [u8]) -> Delivery {
        Delivery {
            event: EventType::new(event),
            id: DeliveryId::new("d-1"),
            body: Bytes::from_static(body),
        }
    }

    #[test]
    fn ping_payload_is_parsed() {
        let body = br#"{"zen":"Keep it logically awesome.","hook_id":42,"hook":{}}"#;
        let ping: PingPayload = serde_json::from_slice(body).unwrap();

        assert_eq!(ping.zen.as_deref(), Some("Keep it logically awesome."));
        assert_eq!(ping.hook_id, Some(42));
        assert!(log_ping(&delivery("ping", body)).is_ok());
    }

    #[test]
    fn ping_without_known_fields_still_succeeds() {
        assert!(log_ping(&delivery("ping", b"{}")).is_ok());
    }

    #[test]
    fn ping_with_non_json_body_fails() {
        assert!(log_ping(&delivery("ping", b"zen")).is_err());
    }

    #[test]
    fn builtin_handlers_are_registered_per_event() {
        let dispatcher = EventDispatcher::new(SecretKey::new("secret").unwrap());
        let events = vec!["push".to_owned(), "ping".to_owned()];

        register_builtin(&dispatcher, &events);

        assert_eq!(dispatcher.handler_count("ping"), 2);
        assert_eq!(dispatcher.handler_count("push"), 1);
        assert_eq!(dispatcher.handler_count("issues"), 0);
    }
}
