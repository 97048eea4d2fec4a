//! Handler registry and request dispatch.
//!
//! [`EventDispatcher`] owns the shared secret and the mapping from event type
//! to an ordered list of handlers. [`EventDispatcher::handle_request`] is the
//! single entry point for an inbound request: it guards the method, verifies
//! the signature over the raw body, and on success hands back a
//! [`DeliveryJob`] instead of running the handlers itself. The network layer
//! sends its `200` first and runs the job afterwards, so upstream redelivery
//! timing never depends on how long local handlers take.
//!
//! ## Fault isolation
//!
//! [`DeliveryJob::run`] wraps every handler invocation in
//! [`std::panic::catch_unwind`]. A handler that returns an error or panics is
//! logged and counted; whether the remaining handlers still run is decided by
//! the dispatcher's [`FaultIsolation`] policy.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use tracing::{debug, error, info_span, warn};

use crate::errors::{FaultIsolation, HookError};
use crate::identifiers::{DeliveryId, EventType};
use crate::signature::{self, SecretKey, SignatureAlgorithm};

/// Header carrying the event type.
pub const EVENT_HEADER: &str = "x-github-event";

/// Header carrying the delivery id.
pub const DELIVERY_HEADER: &str = "x-github-delivery";

// ---------------------------------------------------------------------------
// Delivery and handlers
// ---------------------------------------------------------------------------

/// One verified delivery as seen by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Event type from the `X-GitHub-Event` header.
    pub event: EventType,
    /// Delivery id from the `X-GitHub-Delivery` header.
    pub id: DeliveryId,
    /// The exact request body the signature was verified against.
    pub body: Bytes,
}

/// Application callback invoked for every delivery of a registered event type.
///
/// Implemented for any `Fn(&Delivery) -> R` closure where `R` is `()` or
/// `Result<(), E>` with a displayable `E`. Implement it directly for handlers
/// that carry their own state.
pub trait Hook: Send + Sync {
    /// Handles one delivery.
    ///
    /// # Errors
    ///
    /// A returned [`HookError`] is logged by the dispatcher and counted as a
    /// failed invocation; it never reaches the event source.
    fn call(&self, delivery: &Delivery) -> Result<(), HookError>;
}

/// Return values a closure handler may produce.
pub trait IntoHookResult {
    /// Converts the closure's return value into the handler result.
    fn into_hook_result(self) -> Result<(), HookError>;
}

impl IntoHookResult for () {
    fn into_hook_result(self) -> Result<(), HookError> {
        Ok(())
    }
}

impl<E: std::fmt::Display> IntoHookResult for Result<(), E> {
    fn into_hook_result(self) -> Result<(), HookError> {
        self.map_err(|e| HookError::failed(e.to_string()))
    }
}

impl<F, R> Hook for F
where
    F: Fn(&Delivery) -> R + Send + Sync,
    R: IntoHookResult,
{
    fn call(&self, delivery: &Delivery) -> Result<(), HookError> {
        self(delivery).into_hook_result()
    }
}

// ---------------------------------------------------------------------------
// Dispatch outcome
// ---------------------------------------------------------------------------

/// Result of handling one inbound request.
#[must_use = "an accepted dispatch carries a job that must be run"]
pub enum Dispatch {
    /// The method was not `POST`; nothing else was inspected.
    NotFound,
    /// The signature was missing, malformed, or wrong; no handler will run.
    Forbidden,
    /// The signature was valid. Respond, then run the job.
    Accepted(DeliveryJob),
}

impl Dispatch {
    /// HTTP status to send back to the event source.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Accepted(_) => StatusCode::OK,
        }
    }

    /// Returns the job for an accepted request.
    pub fn into_job(self) -> Option<DeliveryJob> {
        match self {
            Self::Accepted(job) => Some(job),
            Self::NotFound | Self::Forbidden => None,
        }
    }
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => f.write_str("NotFound"),
            Self::Forbidden => f.write_str("Forbidden"),
            Self::Accepted(job) => f.debug_tuple("Accepted").field(job).finish(),
        }
    }
}

/// Counts from running one [`DeliveryJob`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Handlers that returned successfully.
    pub completed: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
    /// Handlers not invoked because an earlier one failed under
    /// [`FaultIsolation::AbortRemaining`].
    pub skipped: usize,
}

/// The handler fan-out for one verified delivery.
///
/// Holds a snapshot of the handlers registered for the event type at the time
/// the request was verified. Running it never panics.
pub struct DeliveryJob {
    delivery: Delivery,
    hooks: Vec<Arc<dyn Hook>>,
    isolation: FaultIsolation,
}

impl DeliveryJob {
    /// The delivery this job will hand to each handler.
    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    /// Number of handlers this job will invoke.
    pub fn handler_count(&self) -> usize {
        self.hooks.len()
    }

    /// Invokes every handler in registration order, sequentially.
    ///
    /// A panicking handler is logged with its panic message only; the stack
    /// trace reaches the logs through the process panic hook, if one records
    /// it (see the crate docs).
    pub fn run(self) -> DeliveryReport {
        let span = info_span!(
            "delivery",
            event_type = %self.delivery.event,
            delivery_id = %self.delivery.id,
        );
        let _entered = span.enter();

        let mut report = DeliveryReport::default();
        if self.hooks.is_empty() {
            debug!("No handlers registered for event type; ignoring delivery");
            return report;
        }

        let total = self.hooks.len();
        for (position, hook) in self.hooks.iter().enumerate() {
            let outcome = catch_unwind(AssertUnwindSafe(|| hook.call(&self.delivery)))
                .unwrap_or_else(|payload| {
                    Err(HookError::Panicked {
                        message: panic_message(payload.as_ref()),
                    })
                });

            match outcome {
                Ok(()) => report.completed += 1,
                Err(err) => {
                    report.failed += 1;
                    error!(handler = position, error = %err, "Webhook handler failed");

                    if self.isolation == FaultIsolation::AbortRemaining {
                        report.skipped = total - position - 1;
                        if report.skipped > 0 {
                            warn!(
                                skipped = report.skipped,
                                "Skipping remaining handlers for this delivery"
                            );
                        }
                        break;
                    }
                }
            }
        }

        debug!(
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            "Delivery dispatched"
        );
        report
    }
}

impl std::fmt::Debug for DeliveryJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryJob")
            .field("delivery", &self.delivery)
            .field("handlers", &self.hooks.len())
            .field("isolation", &self.isolation)
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

type HookMap = HashMap<EventType, Vec<Arc<dyn Hook>>>;

/// Verifies inbound deliveries and routes them to registered handlers.
///
/// Construct once at startup, register handlers, and share it behind an
/// [`Arc`]. Registration is additive and may continue while requests are
/// being served; the map is behind a reader-writer lock that is never held
/// while a handler runs.
///
/// ```
/// use dispatch::{sign, Delivery, EventDispatcher, SecretKey, SignatureAlgorithm};
/// use http::{HeaderMap, Method, StatusCode};
///
/// let secret = SecretKey::new("secret").unwrap();
/// let dispatcher = EventDispatcher::new(secret.clone());
/// dispatcher.register("push", |delivery: &Delivery| {
///     assert_eq!(delivery.event.as_str(), "push");
/// });
///
/// let body = br#"{"zen":"x"}"#;
/// let mut headers = HeaderMap::new();
/// headers.insert("x-hub-signature", sign(SignatureAlgorithm::Sha1, &secret, body).parse().unwrap());
/// headers.insert("x-github-event", "push".parse().unwrap());
///
/// let dispatch = dispatcher.handle_request(&Method::POST, &headers, body.to_vec().into());
/// assert_eq!(dispatch.status(), StatusCode::OK);
/// let report = dispatch.into_job().unwrap().run();
/// assert_eq!(report.completed, 1);
/// ```
pub struct EventDispatcher {
    secret: SecretKey,
    algorithm: SignatureAlgorithm,
    isolation: FaultIsolation,
    hooks: RwLock<HookMap>,
}

impl EventDispatcher {
    /// Creates a dispatcher using SHA-1 signatures and per-handler isolation.
    pub fn new(secret: SecretKey) -> Self {
        Self {
            secret,
            algorithm: SignatureAlgorithm::default(),
            isolation: FaultIsolation::default(),
            hooks: RwLock::new(HashMap::new()),
        }
    }

    /// Selects the signature algorithm (and therefore the signature header).
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Selects what happens to remaining handlers after one fails.
    #[must_use]
    pub fn with_fault_isolation(mut self, isolation: FaultIsolation) -> Self {
        self.isolation = isolation;
        self
    }

    /// The configured signature algorithm.
    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// The configured fault-isolation policy.
    pub fn fault_isolation(&self) -> FaultIsolation {
        self.isolation
    }

    /// Appends a closure handler for `event`.
    ///
    /// The same handler may be registered several times and then runs several
    /// times per delivery.
    pub fn register<F, R>(&self, event: impl Into<EventType>, handler: F)
    where
        F: Fn(&Delivery) -> R + Send + Sync + 'static,
        R: IntoHookResult,
    {
        self.register_hook(event, Arc::new(handler));
    }

    /// Appends a shared handler for `event`.
    pub fn register_hook(&self, event: impl Into<EventType>, hook: Arc<dyn Hook>) {
        let event = event.into();
        debug!(event_type = %event, "Registering webhook handler");
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event)
            .or_default()
            .push(hook);
    }

    /// Number of handlers registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Registered event types, sorted.
    pub fn event_types(&self) -> Vec<EventType> {
        let mut events: Vec<EventType> = self
            .hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        events.sort();
        events
    }

    /// Returns `true` for the only method deliveries arrive with.
    ///
    /// Network layers call this before reading the body so that other methods
    /// are turned away without consuming it.
    pub fn accepts_method(&self, method: &Method) -> bool {
        method == Method::POST
    }

    /// Verifies one inbound request and prepares its handler fan-out.
    ///
    /// `body` must be the raw body exactly as received.
    pub fn handle_request(&self, method: &Method, headers: &HeaderMap, body: Bytes) -> Dispatch {
        if !self.accepts_method(method) {
            debug!(%method, "Rejecting webhook request with unsupported method");
            return Dispatch::NotFound;
        }

        let event = EventType::new(header_str(headers, EVENT_HEADER));
        let id = DeliveryId::new(header_str(headers, DELIVERY_HEADER));
        let provided = header_str(headers, self.algorithm.header_name());

        if !signature::verify(self.algorithm, &self.secret, &body, provided) {
            warn!(
                event_type = %event,
                delivery_id = %id,
                signature_present = !provided.is_empty(),
                "Rejecting webhook delivery with invalid signature"
            );
            return Dispatch::Forbidden;
        }

        let hooks = self
            .hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event.as_str())
            .cloned()
            .unwrap_or_default();

        Dispatch::Accepted(DeliveryJob {
            delivery: Delivery { event, id, body },
            hooks,
            isolation: self.isolation,
        })
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("secret", &self.secret)
            .field("algorithm", &self.algorithm)
            .field("isolation", &self.isolation)
            .field("event_types", &self.event_types())
            .finish()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn secret() -> SecretKey {
        SecretKey::new("secret").unwrap()
    }

    fn signed_headers(event: &str, id: &str, body: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-hub-signature",
            signature::sign(SignatureAlgorithm::Sha1, &secret(), body)
                .parse()
                .unwrap(),
        );
        headers.insert(EVENT_HEADER, event.parse().unwrap());
        headers.insert(DELIVERY_HEADER, id.parse().unwrap());
        headers
    }

    fn record(
        calls: &Arc<Mutex<Vec<String>>>,
        name: &'static str,
    ) -> impl Fn(&Delivery) + Send + Sync + 'static {
        let calls = Arc::clone(calls);
        move |d: &Delivery| {
            calls
                .lock()
                .unwrap()
                .push(format!("{name}:{}:{}", d.event, d.id));
        }
    }

    fn must_not_run(_: &Delivery) {
        panic!("handler for an unrelated event type ran");
    }

    #[test]
    fn registration_preserves_order_and_duplicates() {
        let dispatcher = EventDispatcher::new(secret());
        let calls = Arc::new(Mutex::new(Vec::new()));
        dispatcher.register("push", record(&calls, "h1"));
        dispatcher.register("push", record(&calls, "h2"));
        let shared: Arc<dyn Hook> = Arc::new(|_: &Delivery| ());
        dispatcher.register_hook("push", Arc::clone(&shared));
        dispatcher.register_hook("push", shared);

        assert_eq!(dispatcher.handler_count("push"), 4);

        let body = b"{}";
        let report = dispatcher
            .handle_request(&Method::POST, &signed_headers("push", "d-1", body), Bytes::from_static(body))
            .into_job()
            .unwrap()
            .run();

        assert_eq!(report.completed, 4);
        assert_eq!(*calls.lock().unwrap(), vec!["h1:push:d-1", "h2:push:d-1"]);
    }

    #[test]
    fn non_post_is_not_found_before_signature_check() {
        let dispatcher = EventDispatcher::new(secret());
        let body = b"{}";
        let headers = signed_headers("push", "d-1", body);

        for method in [Method::GET, Method::PUT, Method::DELETE, Method::HEAD] {
            let dispatch = dispatcher.handle_request(&method, &headers, Bytes::from_static(body));
            assert_eq!(dispatch.status(), StatusCode::NOT_FOUND);
        }
        assert!(!dispatcher.accepts_method(&Method::GET));
        assert!(dispatcher.accepts_method(&Method::POST));
    }

    #[test]
    fn missing_signature_is_forbidden() {
        let dispatcher = EventDispatcher::new(secret());
        let mut headers = HeaderMap::new();
        headers.insert(EVENT_HEADER, "push".parse().unwrap());

        let dispatch = dispatcher.handle_request(&Method::POST, &headers, Bytes::from_static(b"{}"));
        assert_eq!(dispatch.status(), StatusCode::FORBIDDEN);
        assert!(dispatch.into_job().is_none());
    }

    #[test]
    fn unknown_event_is_accepted_as_noop() {
        let dispatcher = EventDispatcher::new(secret());
        dispatcher.register("push", must_not_run);

        let body = b"{}";
        let dispatch = dispatcher.handle_request(
            &Method::POST,
            &signed_headers("star", "d-2", body),
            Bytes::from_static(body),
        );
        assert_eq!(dispatch.status(), StatusCode::OK);

        let job = dispatch.into_job().unwrap();
        assert_eq!(job.handler_count(), 0);
        assert_eq!(job.run(), DeliveryReport::default());
    }

    #[test]
    fn missing_event_and_delivery_headers_read_as_empty() {
        let dispatcher = EventDispatcher::new(secret());
        let body = b"{}";
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-hub-signature",
            signature::sign(SignatureAlgorithm::Sha1, &secret(), body)
                .parse()
                .unwrap(),
        );

        let job = dispatcher
            .handle_request(&Method::POST, &headers, Bytes::from_static(body))
            .into_job()
            .unwrap();
        assert!(job.delivery().event.is_empty());
        assert!(job.delivery().id.is_empty());
    }

    #[test]
    fn err_returning_handler_counts_as_failure() {
        let dispatcher = EventDispatcher::new(secret());
        dispatcher.register("issues", |_: &Delivery| Err::<(), _>("boom"));
        dispatcher.register("issues", |_: &Delivery| Ok::<(), String>(()));

        let body = b"{}";
        let report = dispatcher
            .handle_request(&Method::POST, &signed_headers("issues", "d-3", body), Bytes::from_static(body))
            .into_job()
            .unwrap()
            .run();

        assert_eq!(
            report,
            DeliveryReport {
                completed: 1,
                failed: 1,
                skipped: 0
            }
        );
    }

    #[test]
    fn sha256_dispatcher_reads_sha256_header() {
        let dispatcher = EventDispatcher::new(secret()).with_algorithm(SignatureAlgorithm::Sha256);
        let body = b"{}";

        let mut headers = signed_headers("push", "d-4", body);
        assert_eq!(
            dispatcher
                .handle_request(&Method::POST, &headers, Bytes::from_static(body))
                .status(),
            StatusCode::FORBIDDEN
        );

        headers.insert(
            "x-hub-signature-256",
            signature::sign(SignatureAlgorithm::Sha256, &secret(), body)
                .parse()
                .unwrap(),
        );
        assert_eq!(
            dispatcher
                .handle_request(&Method::POST, &headers, Bytes::from_static(body))
                .status(),
            StatusCode::OK
        );
    }

    #[test]
    fn job_snapshot_ignores_later_registrations() {
        let dispatcher = EventDispatcher::new(secret());
        dispatcher.register("push", |_: &Delivery| ());

        let body = b"{}";
        let job = dispatcher
            .handle_request(&Method::POST, &signed_headers("push", "d-5", body), Bytes::from_static(body))
            .into_job()
            .unwrap();
        dispatcher.register("push", |_: &Delivery| ());

        assert_eq!(job.handler_count(), 1);
        assert_eq!(dispatcher.handler_count("push"), 2);

        let later = dispatcher
            .handle_request(&Method::POST, &signed_headers("push", "d-6", body), Bytes::from_static(body))
            .into_job()
            .unwrap();
        assert_eq!(later.handler_count(), 2);
        assert_eq!(later.run().completed, 2);
    }

    #[test]
    fn event_types_are_sorted() {
        let dispatcher = EventDispatcher::new(secret());
        dispatcher.register("push", |_: &Delivery| ());
        dispatcher.register("issues", |_: &Delivery| ());
        dispatcher.register("ping", |_: &Delivery| ());

        let events: Vec<String> = dispatcher
            .event_types()
            .into_iter()
            .map(|e| e.to_string())
            .collect();
        assert_eq!(events, vec!["issues", "ping", "push"]);
    }

    #[test]
    fn panic_message_extracts_string_payloads() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(42_u32);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }
}
