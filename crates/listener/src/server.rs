//! Axum wiring for the webhook endpoint.
//!
//! The endpoint accepts every method so the method guard, not the router,
//! decides the status: anything but `POST` gets `404` before the body is
//! touched. Verified deliveries are answered with `200` straight away and their
//! handlers run on the blocking pool afterwards.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use dispatch::{DeliveryJob, EventDispatcher};
use http_body_util::LengthLimitError;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn, Instrument, Span};

use crate::{ListenerConfig, ListenerError};

#[derive(Clone)]
struct ListenerState {
    dispatcher: Arc<EventDispatcher>,
    max_body_bytes: usize,
}

/// Builds the router serving `dispatcher` at `config.path`.
///
/// Requests to any other path get axum's default `404`.
///
/// # Errors
///
/// Returns an error if `config` fails [`ListenerConfig::validate`].
pub fn router(
    dispatcher: Arc<EventDispatcher>,
    config: &ListenerConfig,
) -> Result<Router, ListenerError> {
    config.validate()?;

    let state = ListenerState {
        dispatcher,
        max_body_bytes: config.max_body_bytes,
    };

    let routes = Router::new()
        .route(&config.path, any(receive))
        .with_state(state);
    Ok(with_outer_layers(routes))
}

/// Request tracing, plus a `500` with an empty body for any panic that
/// escapes the request path.
fn with_outer_layers(routes: Router) -> Router {
    routes
        .layer(CatchPanicLayer::custom(recovered_panic))
        .layer(TraceLayer::new_for_http())
}

/// Binds `config.bind_address` and serves until `shutdown` resolves.
///
/// # Errors
///
/// Returns [`ListenerError::Bind`] if the address cannot be bound and
/// [`ListenerError::Serve`] if the accept loop fails.
pub async fn serve<F>(
    dispatcher: Arc<EventDispatcher>,
    config: &ListenerConfig,
    shutdown: F,
) -> Result<(), ListenerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(config.bind_address)
        .await
        .map_err(|source| ListenerError::Bind {
            address: config.bind_address,
            source,
        })?;
    serve_on(listener, dispatcher, config, shutdown).await
}

/// Serves on an already bound socket until `shutdown` resolves.
///
/// `config.bind_address` is ignored. In-flight requests finish before this
/// returns; handler jobs already handed to the blocking pool keep running.
///
/// # Errors
///
/// Returns an error if `config` is invalid or the accept loop fails.
pub async fn serve_on<F>(
    listener: TcpListener,
    dispatcher: Arc<EventDispatcher>,
    config: &ListenerConfig,
    shutdown: F,
) -> Result<(), ListenerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(Arc::clone(&dispatcher), config)?;

    match listener.local_addr() {
        Ok(address) => info!(
            %address,
            path = %config.path,
            algorithm = %dispatcher.algorithm(),
            event_types = ?dispatcher.event_types(),
            "Webhook listener ready"
        ),
        Err(err) => warn!(error = %err, "Webhook listener ready; local address unavailable"),
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|source| ListenerError::Serve { source })?;

    info!("Webhook listener stopped");
    Ok(())
}

async fn receive(
    State(state): State<ListenerState>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> StatusCode {
    if !state.dispatcher.accepts_method(&method) {
        debug!(%method, "Rejecting webhook request before reading body");
        return StatusCode::NOT_FOUND;
    }

    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(body) => body,
        Err(err) if exceeds_limit(&err) => {
            warn!(
                limit = state.max_body_bytes,
                "Rejecting webhook request with oversized body"
            );
            return StatusCode::PAYLOAD_TOO_LARGE;
        }
        Err(err) => {
            warn!(error = %err, "Failed to read webhook request body");
            return StatusCode::BAD_REQUEST;
        }
    };

    let dispatch = state.dispatcher.handle_request(&method, &headers, body);
    let status = dispatch.status();
    if let Some(job) = dispatch.into_job() {
        spawn_delivery(job);
    }
    status
}

/// Runs `job` on the blocking pool and watches it from a detached task.
///
/// The job catches handler panics itself; the watcher is the last line of
/// defence should anything else in the fan-out unwind.
fn spawn_delivery(job: DeliveryJob) {
    let event = job.delivery().event.clone();
    let id = job.delivery().id.clone();
    let span = Span::current();

    let handle = tokio::task::spawn_blocking(move || span.in_scope(|| job.run()));

    tokio::spawn(
        async move {
            if let Err(err) = handle.await {
                error!(
                    event_type = %event,
                    delivery_id = %id,
                    error = %err,
                    "Webhook delivery task aborted"
                );
            }
        }
        .in_current_span(),
    );
}

fn exceeds_limit(err: &axum::Error) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(source) = current {
        if source.is::<LengthLimitError>() {
            return true;
        }
        current = source.source();
    }
    false
}

fn recovered_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned());
    error!(panic = %message, "Recovered panic while handling webhook request");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}
