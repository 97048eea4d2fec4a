//! Process configuration, read from environment variables.
//!
//! `main` loads `.env` (if present) before calling [`Config::from_env`], so
//! every variable below can also live in that file.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `HUBHOOK_BIND_ADDRESS` | `0.0.0.0:8080` |
//! | `HUBHOOK_PATH` | `/webhook` |
//! | `HUBHOOK_SECRET` / `HUBHOOK_SECRET_HEX` | exactly one required |
//! | `HUBHOOK_SIGNATURE_ALGORITHM` | `sha1` |
//! | `HUBHOOK_FAULT_ISOLATION` | `per-handler` |
//! | `HUBHOOK_MAX_BODY_BYTES` | 25 MiB |
//! | `HUBHOOK_LOG_EVENTS` | none |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | unset (no export) |

use std::env;
use std::net::SocketAddr;

use anyhow::{bail, Context, Result};
use dispatch::{FaultIsolation, SecretKey, SignatureAlgorithm};
use listener::ListenerConfig;

const BIND_ADDRESS: &str = "HUBHOOK_BIND_ADDRESS";
const PATH: &str = "HUBHOOK_PATH";
const SECRET: &str = "HUBHOOK_SECRET";
const SECRET_HEX: &str = "HUBHOOK_SECRET_HEX";
const SIGNATURE_ALGORITHM: &str = "HUBHOOK_SIGNATURE_ALGORITHM";
const FAULT_ISOLATION: &str = "HUBHOOK_FAULT_ISOLATION";
const MAX_BODY_BYTES: &str = "HUBHOOK_MAX_BODY_BYTES";
const LOG_EVENTS: &str = "HUBHOOK_LOG_EVENTS";
const OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Everything the composition root needs to start serving.
#[derive(Debug, Clone)]
pub struct Config {
    /// Socket, path and body limit for the webhook endpoint.
    pub listener: ListenerConfig,
    /// Shared secret deliveries are signed with.
    pub secret: SecretKey,
    /// Signature scheme (and header) to verify.
    pub algorithm: SignatureAlgorithm,
    /// What a failing handler does to the handlers after it.
    pub fault_isolation: FaultIsolation,
    /// Event types that get the built-in logging handler.
    pub log_events: Vec<String>,
    /// OTLP collector endpoint; tracing export is off when `None`.
    pub otlp_endpoint: Option<String>,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = ListenerConfig::default();

        let bind_address = match get(BIND_ADDRESS) {
            Some(value) => value
                .trim()
                .parse::<SocketAddr>()
                .with_context(|| format!("{BIND_ADDRESS} must be a socket address, got '{value}'"))?,
            None => defaults.bind_address,
        };

        let max_body_bytes = match get(MAX_BODY_BYTES) {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .with_context(|| format!("{MAX_BODY_BYTES} must be a byte count, got '{value}'"))?,
            None => defaults.max_body_bytes,
        };

        let listener = ListenerConfig {
            bind_address,
            path: get(PATH).unwrap_or(defaults.path),
            max_body_bytes,
        };
        listener.validate().context("Invalid listener configuration")?;

        let secret = match (get(SECRET), get(SECRET_HEX)) {
            (Some(raw), None) => SecretKey::new(raw).with_context(|| format!("Invalid {SECRET}"))?,
            (None, Some(encoded)) => {
                SecretKey::from_hex(&encoded).with_context(|| format!("Invalid {SECRET_HEX}"))?
            }
            (Some(_), Some(_)) => bail!("Set only one of {SECRET} and {SECRET_HEX}"),
            (None, None) => bail!("{SECRET} or {SECRET_HEX} must be set"),
        };

        let algorithm = match get(SIGNATURE_ALGORITHM) {
            Some(value) => value
                .parse::<SignatureAlgorithm>()
                .with_context(|| format!("Invalid {SIGNATURE_ALGORITHM}"))?,
            None => SignatureAlgorithm::default(),
        };

        let fault_isolation = match get(FAULT_ISOLATION) {
            Some(value) => value
                .parse::<FaultIsolation>()
                .with_context(|| format!("Invalid {FAULT_ISOLATION}"))?,
            None => FaultIsolation::default(),
        };

        let log_events = get(LOG_EVENTS)
            .map(|value| {
                value
                    .split(',')
                    .map(|event| event.trim().to_owned())
                    .filter(|event| !event.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            listener,
            secret,
            algorithm,
            fault_isolation,
            log_events,
            otlp_endpoint: get(OTLP_ENDPOINT),
        })
    }
}
