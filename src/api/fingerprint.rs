//! Deterministic request fingerprinting.
//!
//! Retried requests must coalesce onto the same idempotency key even when
//! the client re-serializes the body (different key order, whitespace). The
//! fingerprint therefore hashes a canonical rendering of the JSON body
//! (object keys sorted recursively, no insignificant whitespace) together
//! with the method and path. Non-JSON bodies hash the raw bytes.

use sha2::{Digest, Sha256};

/// Maximum accepted client-supplied idempotency key length.
pub const MAX_KEY_LENGTH: usize = 200;

// =============================================================================
// Canonical JSON
// =============================================================================

/// Renders a JSON value canonically: object keys sorted recursively,
/// compact separators.
fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (index, key) in keys.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                // Keys are serialized through serde_json so escaping matches
                // the value rendering below.
                out.push_str(&serde_json::Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Returns the canonical rendering of a JSON value.
#[must_use]
pub fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

// =============================================================================
// Fingerprinting
// =============================================================================

/// Computes the SHA-256 fingerprint of a request.
///
/// The digest covers the method, the path, and the canonicalized body, each
/// separated by a newline so field boundaries cannot collide.
#[must_use]
pub fn request_fingerprint(method: &str, path: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\n");
    hasher.update(path.as_bytes());
    hasher.update(b"\n");

    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => hasher.update(canonical_json(&value).as_bytes()),
        // Not JSON (or empty): hash the raw bytes.
        Err(_) => hasher.update(body),
    }

    hex_digest(&hasher.finalize())
}

/// Derives an idempotency key from a fingerprint when the client supplied
/// none.
#[must_use]
pub fn derived_key(fingerprint: &str) -> String {
    format!("auto-{fingerprint}")
}

/// Validates a client-supplied idempotency key.
///
/// Keys must be non-empty after trimming, at most [`MAX_KEY_LENGTH`] bytes,
/// and free of whitespace and control characters (they travel in headers and
/// Redis keys).
#[must_use]
pub fn validate_client_key(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_KEY_LENGTH {
        return None;
    }
    if trimmed
        .chars()
        .any(|character| character.is_whitespace() || character.is_control())
    {
        return None;
    }
    Some(trimmed.to_string())
}

fn hex_digest(bytes: &[u8]) -> String {
    use std::fmt::Write as _;

    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        // Writing to a String cannot fail.
        let _ = write!(out, "{byte:02x}");
    }
    out
}

// =============================================================================
// Tests
// =============================================================================
