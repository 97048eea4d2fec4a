//! Webhook signature verification.
//!
//! The event source signs every delivery with an HMAC of the raw request body
//! keyed by a shared secret and sends it hex-encoded in a header, prefixed
//! with the algorithm name:
//!
//! - SHA-1: `X-Hub-Signature: sha1=<40 hex chars>`
//! - SHA-256: `X-Hub-Signature-256: sha256=<64 hex chars>`
//!
//! [`verify`] recomputes the MAC over the exact bytes received and compares it
//! with the decoded signature using [`subtle::ConstantTimeEq`]. It only ever
//! answers yes or no: a malformed signature is simply a failed verification.

use std::str::FromStr;

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::errors::{SecretKeyError, UnknownSettingError};

// ---------------------------------------------------------------------------
// Secret key
// ---------------------------------------------------------------------------

/// Shared secret used to key the HMAC.
///
/// The bytes are opaque and immutable once constructed. [`SecretKey::new`]
/// takes the secret verbatim; [`SecretKey::from_hex`] accepts a hex-encoded
/// form for deployments that provision binary secrets. The two are not
/// interchangeable: the hex string `"616263"` used verbatim is a different key
/// than the three bytes it decodes to.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    /// Creates a key from raw secret bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SecretKeyError::Empty`] if `bytes` is empty.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, SecretKeyError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(SecretKeyError::Empty);
        }
        Ok(Self(bytes))
    }

    /// Creates a key by hex-decoding `encoded`.
    ///
    /// # Errors
    ///
    /// Returns [`SecretKeyError::InvalidHex`] if `encoded` is not valid hex and
    /// [`SecretKeyError::Empty`] if it decodes to nothing.
    pub fn from_hex(encoded: &str) -> Result<Self, SecretKeyError> {
        let bytes = hex::decode(encoded.trim()).map_err(|e| SecretKeyError::InvalidHex {
            reason: e.to_string(),
        })?;
        Self::new(bytes)
    }

    /// Returns the key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey([redacted; {} bytes])", self.0.len())
    }
}

// ---------------------------------------------------------------------------
// Algorithm
// ---------------------------------------------------------------------------

/// Hash function used for the delivery HMAC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    /// HMAC-SHA1, the legacy hub signature scheme.
    #[default]
    Sha1,
    /// HMAC-SHA256.
    Sha256,
}

impl SignatureAlgorithm {
    /// Name of the request header that carries signatures of this kind.
    pub fn header_name(self) -> &'static str {
        match self {
            Self::Sha1 => "x-hub-signature",
            Self::Sha256 => "x-hub-signature-256",
        }
    }

    /// Prefix preceding the hex digest in the header value.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1=",
            Self::Sha256 => "sha256=",
        }
    }

    /// Length of the raw MAC in bytes.
    pub fn digest_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    /// Returns the configuration spelling of this algorithm.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }
}

impl std::fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = UnknownSettingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha1" | "sha-1" => Ok(Self::Sha1),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            _ => Err(UnknownSettingError {
                setting: "signature algorithm",
                value: s.to_owned(),
                expected: "sha1, sha256",
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

fn compute_mac(algorithm: SignatureAlgorithm, secret: &SecretKey, payload: &[u8]) -> Vec<u8> {
    match algorithm {
        SignatureAlgorithm::Sha1 => mac::<Hmac<Sha1>>(secret.as_bytes(), payload),
        SignatureAlgorithm::Sha256 => mac::<Hmac<Sha256>>(secret.as_bytes(), payload),
    }
}

/// HMAC accepts keys of any length, so `new_from_slice` cannot fail. Were it
/// to, the empty result fails the digest length check in [`verify`].
fn mac<M: Mac + KeyInit>(key: &[u8], payload: &[u8]) -> Vec<u8> {
    match <M as KeyInit>::new_from_slice(key) {
        Ok(mut mac) => {
            Mac::update(&mut mac, payload);
            mac.finalize().into_bytes().to_vec()
        }
        Err(_) => Vec::new(),
    }
}

/// Returns `true` if `provided` is the hex HMAC of `payload` under `secret`.
///
/// `provided` may carry the algorithm prefix (`sha1=`, `sha256=`) or be bare
/// hex. Only the prefix of `algorithm` is stripped; a signature prefixed for a
/// different algorithm fails to decode and is rejected.
///
/// Malformed hex, a digest of the wrong length, and the empty string all yield
/// `false`. The comparison is constant-time in the digest contents.
pub fn verify(
    algorithm: SignatureAlgorithm,
    secret: &SecretKey,
    payload: &[u8],
    provided: &str,
) -> bool {
    let hex_digest = provided
        .strip_prefix(algorithm.prefix())
        .unwrap_or(provided);

    let Ok(provided_mac) = hex::decode(hex_digest) else {
        return false;
    };

    let expected_mac = compute_mac(algorithm, secret, payload);
    if expected_mac.len() != algorithm.digest_len() {
        return false;
    }

    expected_mac.as_slice().ct_eq(provided_mac.as_slice()).into()
}

/// Computes the full signature header value for `payload`, prefix included.
///
/// ```
/// use dispatch::{sign, SecretKey, SignatureAlgorithm};
///
/// let key = SecretKey::new("key").unwrap();
/// let header = sign(SignatureAlgorithm::Sha1, &key, b"The quick brown fox jumps over the lazy dog");
/// assert_eq!(header, "sha1=de7c9b85b8b78aa6bc8a7a36f70a90701c9db4d9");
/// ```
pub fn sign(algorithm: SignatureAlgorithm, secret: &SecretKey, payload: &[u8]) -> String {
    format!(
        "{}{}",
        algorithm.prefix(),
        hex::encode(compute_mac(algorithm, secret, payload))
    )
}
