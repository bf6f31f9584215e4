//! Idempotency record store.
//!
//! Stores one record per idempotency key: `pending` while the first request
//! executes, `completed` with the captured response afterwards. The Redis
//! implementation uses Lua scripts so claim/complete/release are atomic
//! across instances, and fails open to a process-local in-memory store when
//! Redis is unreachable (dedup degrades to per-process rather than failing
//! requests).
//!
//! # Key Design
//!
//! - Record key: `idempotency:{key}` -> JSON `IdempotencyRecord`
//! - Pending claims expire after `pending_ttl_seconds` so a crashed worker
//!   releases the key automatically.
//! - Completed records expire after `ttl_seconds`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use deadpool_redis::Pool;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

const RECORD_KEY_PREFIX: &str = "idempotency:";

#[must_use]
fn record_key(key: &str) -> String {
    format!("{RECORD_KEY_PREFIX}{key}")
}

// =============================================================================
// Records
// =============================================================================

/// A captured response, replayed verbatim on retries.
///
/// The body is base64-encoded so the record round-trips through JSON
/// regardless of content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    /// Original HTTP status code.
    pub status: u16,
    /// Original `Content-Type` header, if any.
    pub content_type: Option<String>,
    /// Base64-encoded response body.
    pub body_b64: String,
}

impl StoredResponse {
    /// Captures a response from its parts.
    #[must_use]
    pub fn capture(status: u16, content_type: Option<String>, body: &[u8]) -> Self {
        use base64::Engine as _;
        Self {
            status,
            content_type,
            body_b64: base64::engine::general_purpose::STANDARD.encode(body),
        }
    }

    /// Decodes the stored body.
    ///
    /// # Errors
    ///
    /// Returns [`IdempotencyStoreError::Serialization`] if the stored body is
    /// not valid base64.
    pub fn body(&self) -> Result<Vec<u8>, IdempotencyStoreError> {
        use base64::Engine as _;
        base64::engine::general_purpose::STANDARD
            .decode(&self.body_b64)
            .map_err(|error| IdempotencyStoreError::Serialization(error.to_string()))
    }
}

/// State of an idempotency record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecordState {
    /// The first request is still executing.
    Pending,
    /// The operation finished; the response is available for replay.
    Completed {
        /// The captured response.
        response: StoredResponse,
    },
}

/// A record stored per idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// Request fingerprint the key was first used with.
    pub fingerprint: String,
    /// Current state.
    #[serde(flatten)]
    pub state: RecordState,
}

/// Outcome of attempting to claim a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The caller now owns the key and must execute the operation.
    Claimed,
    /// Another request is executing the operation.
    Pending,
    /// The operation already completed; replay the stored response.
    Completed(StoredResponse),
    /// The key exists with a different request fingerprint.
    FingerprintMismatch,
}

/// Errors from the idempotency store.
#[derive(Debug, Error, Clone)]
pub enum IdempotencyStoreError {
    /// Redis operation failed.
    #[error("Redis error: {0}")]
    Redis(String),

    /// Record (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

// =============================================================================
// Store Trait
// =============================================================================

/// Store for idempotency records.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically claims `key` for execution.
    ///
    /// If the key is unknown, a pending record with `fingerprint` is written
    /// and `Claimed` returned. Otherwise the existing record decides the
    /// outcome (fingerprint mismatch, pending, or completed).
    async fn claim(
        &self,
        key: &str,
        fingerprint: &str,
    ) -> Result<ClaimOutcome, IdempotencyStoreError>;

    /// Marks `key` as completed with the captured response.
    ///
    /// Completion never overwrites an already-completed record.
    async fn complete(
        &self,
        key: &str,
        response: StoredResponse,
    ) -> Result<(), IdempotencyStoreError>;

    /// Releases a pending claim (execution failed); completed records are
    /// left untouched so replays keep working.
    async fn release(&self, key: &str) -> Result<(), IdempotencyStoreError>;

    /// Fetches the record for `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, IdempotencyStoreError>;
}

// =============================================================================
// Store Configuration
// =============================================================================

/// TTL configuration for idempotency records.
#[derive(Debug, Clone, Copy)]
pub struct IdempotencyStoreConfig {
    /// TTL for completed records, in seconds.
    pub ttl_seconds: u64,
    /// TTL for pending claims, in seconds.
    pub pending_ttl_seconds: u64,
}

impl Default for IdempotencyStoreConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 86_400,
            pending_ttl_seconds: 120,
        }
    }
}

impl IdempotencyStoreConfig {
    /// Creates a config, clamping both TTLs to at least 1 second to avoid
    /// Redis SETEX errors.
    #[must_use]
    pub const fn new(ttl_seconds: u64, pending_ttl_seconds: u64) -> Self {
        Self {
            ttl_seconds: if ttl_seconds == 0 { 1 } else { ttl_seconds },
            pending_ttl_seconds: if pending_ttl_seconds == 0 {
                1
            } else {
                pending_ttl_seconds
            },
        }
    }
}

// =============================================================================
// In-Memory Store
// =============================================================================

#[derive(Debug, Clone)]
struct InMemoryEntry {
    record: IdempotencyRecord,
    expires_at: Instant,
}

/// Process-local idempotency store.
///
/// Serves as the default backend in development and as the fail-open
/// fallback behind the Redis store. Expired entries are dropped lazily on
/// access.
#[derive(Debug, Clone)]
pub struct InMemoryIdempotencyStore {
    entries: Arc<RwLock<HashMap<String, InMemoryEntry>>>,
    config: IdempotencyStoreConfig,
}

impl InMemoryIdempotencyStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new(config: IdempotencyStoreConfig) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    fn live_record(entry: &InMemoryEntry, now: Instant) -> Option<&IdempotencyRecord> {
        (entry.expires_at > now).then_some(&entry.record)
    }
}

impl Default for InMemoryIdempotencyStore {
    fn default() -> Self {
        Self::new(IdempotencyStoreConfig::default())
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn claim(
        &self,
        key: &str,
        fingerprint: &str,
    ) -> Result<ClaimOutcome, IdempotencyStoreError> {
        let now = Instant::now();
        let mut guard = self.entries.write().await;

        if let Some(record) = guard.get(key).and_then(|entry| Self::live_record(entry, now)) {
            // An empty stored fingerprint means the original request is
            // unknown (the pending claim expired before completion landed);
            // it matches any retry.
            if !record.fingerprint.is_empty() && record.fingerprint != fingerprint {
                return Ok(ClaimOutcome::FingerprintMismatch);
            }
            return Ok(match &record.state {
                RecordState::Pending => ClaimOutcome::Pending,
                RecordState::Completed { response } => ClaimOutcome::Completed(response.clone()),
            });
        }

        guard.insert(
            key.to_string(),
            InMemoryEntry {
                record: IdempotencyRecord {
                    fingerprint: fingerprint.to_string(),
                    state: RecordState::Pending,
                },
                expires_at: now + Duration::from_secs(self.config.pending_ttl_seconds),
            },
        );
        Ok(ClaimOutcome::Claimed)
    }

    async fn complete(
        &self,
        key: &str,
        response: StoredResponse,
    ) -> Result<(), IdempotencyStoreError> {
        let now = Instant::now();
        let mut guard = self.entries.write().await;

        let fingerprint = match guard.get(key).and_then(|entry| Self::live_record(entry, now)) {
            // Completion never overwrites an already-completed record.
            Some(IdempotencyRecord {
                state: RecordState::Completed { .. },
                ..
            }) => return Ok(()),
            Some(record) => record.fingerprint.clone(),
            None => String::new(),
        };

        guard.insert(
            key.to_string(),
            InMemoryEntry {
                record: IdempotencyRecord {
                    fingerprint,
                    state: RecordState::Completed { response },
                },
                expires_at: now + Duration::from_secs(self.config.ttl_seconds),
            },
        );
        Ok(())
    }

    async fn release(&self, key: &str) -> Result<(), IdempotencyStoreError> {
        let now = Instant::now();
        let mut guard = self.entries.write().await;
        let is_pending = guard
            .get(key)
            .and_then(|entry| Self::live_record(entry, now))
            .is_some_and(|record| matches!(record.state, RecordState::Pending));
        if is_pending {
            guard.remove(key);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, IdempotencyStoreError> {
        let now = Instant::now();
        let guard = self.entries.read().await;
        Ok(guard
            .get(key)
            .and_then(|entry| Self::live_record(entry, now))
            .cloned())
    }
}

// =============================================================================
// Redis Store
// =============================================================================

/// Lua script for atomic claim.
///
/// Returns the existing record JSON when the key is already present,
/// otherwise writes a pending record with the pending TTL and returns
/// `CLAIMED`. Doing both in one script prevents two instances from claiming
/// the same key between a GET and a SET.
const CLAIM_SCRIPT: &str = r"
local existing = redis.call('GET', KEYS[1])
if existing then
    return existing
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', tonumber(ARGV[2]))
return 'CLAIMED'
";

/// Lua script for atomic completion.
///
/// Skips the write when a completed record is already present, so a late
/// completion (e.g. after a pending claim expired and another worker
/// finished first) cannot replace the response clients may have replayed.
const COMPLETE_SCRIPT: &str = r"
local existing = redis.call('GET', KEYS[1])
if existing then
    local record = cjson.decode(existing)
    if record.state == 'completed' then
        return 'SKIPPED'
    end
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', tonumber(ARGV[2]))
return 'OK'
";

/// Lua script for releasing a failed claim.
///
/// Deletes the record only while it is still pending; completed records
/// stay for replay.
const RELEASE_SCRIPT: &str = r"
local existing = redis.call('GET', KEYS[1])
if existing then
    local record = cjson.decode(existing)
    if record.state == 'pending' then
        redis.call('DEL', KEYS[1])
    end
end
return 'OK'
";

/// Redis-backed idempotency store with an in-memory fail-open fallback.
#[derive(Clone)]
pub struct RedisIdempotencyStore {
    pool: Pool,
    fallback: InMemoryIdempotencyStore,
    config: IdempotencyStoreConfig,
}

impl RedisIdempotencyStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: Pool, config: IdempotencyStoreConfig) -> Self {
        Self {
            pool,
            fallback: InMemoryIdempotencyStore::new(config),
            config,
        }
    }

    fn decode_record(raw: &str) -> Result<IdempotencyRecord, IdempotencyStoreError> {
        serde_json::from_str(raw)
            .map_err(|error| IdempotencyStoreError::Serialization(error.to_string()))
    }

    fn encode_record(record: &IdempotencyRecord) -> Result<String, IdempotencyStoreError> {
        serde_json::to_string(record)
            .map_err(|error| IdempotencyStoreError::Serialization(error.to_string()))
    }

    async fn run_claim(
        &self,
        key: &str,
        fingerprint: &str,
    ) -> Result<ClaimOutcome, IdempotencyStoreError> {
        let mut connection = self
            .pool
            .get()
            .await
            .map_err(|error| IdempotencyStoreError::Redis(error.to_string()))?;

        let pending = IdempotencyRecord {
            fingerprint: fingerprint.to_string(),
            state: RecordState::Pending,
        };
        let payload = Self::encode_record(&pending)?;

        let script = redis::Script::new(CLAIM_SCRIPT);
        let raw: String = script
            .key(record_key(key))
            .arg(&payload)
            .arg(self.config.pending_ttl_seconds)
            .invoke_async(&mut *connection)
            .await
            .map_err(|error| IdempotencyStoreError::Redis(error.to_string()))?;

        if raw == "CLAIMED" {
            return Ok(ClaimOutcome::Claimed);
        }

        let record = Self::decode_record(&raw)?;
        // Empty stored fingerprint: original request unknown, matches any
        // retry (see the in-memory store).
        if !record.fingerprint.is_empty() && record.fingerprint != fingerprint {
            return Ok(ClaimOutcome::FingerprintMismatch);
        }
        Ok(match record.state {
            RecordState::Pending => ClaimOutcome::Pending,
            RecordState::Completed { response } => ClaimOutcome::Completed(response),
        })
    }

    async fn run_complete(
        &self,
        key: &str,
        record: &IdempotencyRecord,
    ) -> Result<(), IdempotencyStoreError> {
        let mut connection = self
            .pool
            .get()
            .await
            .map_err(|error| IdempotencyStoreError::Redis(error.to_string()))?;

        let payload = Self::encode_record(record)?;
        let script = redis::Script::new(COMPLETE_SCRIPT);
        script
            .key(record_key(key))
            .arg(&payload)
            .arg(self.config.ttl_seconds)
            .invoke_async::<()>(&mut *connection)
            .await
            .map_err(|error| IdempotencyStoreError::Redis(error.to_string()))?;
        Ok(())
    }

    async fn run_release(&self, key: &str) -> Result<(), IdempotencyStoreError> {
        let mut connection = self
            .pool
            .get()
            .await
            .map_err(|error| IdempotencyStoreError::Redis(error.to_string()))?;

        let script = redis::Script::new(RELEASE_SCRIPT);
        script
            .key(record_key(key))
            .invoke_async::<()>(&mut *connection)
            .await
            .map_err(|error| IdempotencyStoreError::Redis(error.to_string()))?;
        Ok(())
    }

    async fn run_get(
        &self,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, IdempotencyStoreError> {
        use redis::AsyncCommands as _;

        let mut connection = self
            .pool
            .get()
            .await
            .map_err(|error| IdempotencyStoreError::Redis(error.to_string()))?;

        let raw: Option<String> = connection
            .get(record_key(key))
            .await
            .map_err(|error| IdempotencyStoreError::Redis(error.to_string()))?;

        raw.map(|value| Self::decode_record(&value)).transpose()
    }
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn claim(
        &self,
        key: &str,
        fingerprint: &str,
    ) -> Result<ClaimOutcome, IdempotencyStoreError> {
        match self.run_claim(key, fingerprint).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                // Fail-open: dedup degrades to per-process rather than
                // failing the request.
                tracing::warn!(
                    idempotency_key = %key,
                    error = %error,
                    "Redis claim failed, falling back to in-memory store"
                );
                self.fallback.claim(key, fingerprint).await
            }
        }
    }

    async fn complete(
        &self,
        key: &str,
        response: StoredResponse,
    ) -> Result<(), IdempotencyStoreError> {
        let record = IdempotencyRecord {
            fingerprint: String::new(),
            state: RecordState::Completed {
                response: response.clone(),
            },
        };

        // Preserve the original fingerprint when the pending record is still
        // readable; completion with an empty fingerprint would break the
        // key-reuse check on later retries.
        let record = match self.run_get(key).await {
            Ok(Some(existing)) => IdempotencyRecord {
                fingerprint: existing.fingerprint,
                state: record.state,
            },
            _ => record,
        };

        match self.run_complete(key, &record).await {
            Ok(()) => {
                // Keep the fallback coherent for readers that already failed
                // over.
                let _ = self.fallback.complete(key, response).await;
                Ok(())
            }
            Err(error) => {
                tracing::warn!(
                    idempotency_key = %key,
                    error = %error,
                    "Redis complete failed, falling back to in-memory store"
                );
                self.fallback.complete(key, response).await
            }
        }
    }

    async fn release(&self, key: &str) -> Result<(), IdempotencyStoreError> {
        let _ = self.fallback.release(key).await;
        match self.run_release(key).await {
            Ok(()) => Ok(()),
            Err(error) => {
                tracing::warn!(
                    idempotency_key = %key,
                    error = %error,
                    "Redis release failed; pending claim will expire via TTL"
                );
                Ok(())
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, IdempotencyStoreError> {
        match self.run_get(key).await {
            Ok(record) => Ok(record),
            Err(error) => {
                tracing::warn!(
                    idempotency_key = %key,
                    error = %error,
                    "Redis get failed, falling back to in-memory store"
                );
                self.fallback.get(key).await
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn store() -> InMemoryIdempotencyStore {
        InMemoryIdempotencyStore::new(IdempotencyStoreConfig::default())
    }

    fn sample_response() -> StoredResponse {
        StoredResponse::capture(200, Some("application/json".to_string()), b"{\"ok\":true}")
    }

    // -------------------------------------------------------------------------
    // StoredResponse Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_stored_response_body_roundtrip() {
        let response = sample_response();
        assert_eq!(response.body().unwrap(), b"{\"ok\":true}");
    }

    #[rstest]
    fn test_stored_response_invalid_base64() {
        let response = StoredResponse {
            status: 200,
            content_type: None,
            body_b64: "!!not base64!!".to_string(),
        };
        assert!(matches!(
            response.body(),
            Err(IdempotencyStoreError::Serialization(_))
        ));
    }

    // -------------------------------------------------------------------------
    // Record Serialization Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_record_json_state_tag() {
        // The Lua scripts read `record.state`, so the JSON tag must be a
        // plain string field.
        let pending = IdempotencyRecord {
            fingerprint: "abc".to_string(),
            state: RecordState::Pending,
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&pending).unwrap()).unwrap();
        assert_eq!(json["state"], "pending");
        assert_eq!(json["fingerprint"], "abc");

        let completed = IdempotencyRecord {
            fingerprint: "abc".to_string(),
            state: RecordState::Completed {
                response: sample_response(),
            },
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&completed).unwrap()).unwrap();
        assert_eq!(json["state"], "completed");
        assert_eq!(json["response"]["status"], 200);
    }

    #[rstest]
    fn test_record_json_roundtrip() {
        let record = IdempotencyRecord {
            fingerprint: "fp".to_string(),
            state: RecordState::Completed {
                response: sample_response(),
            },
        };
        let json = serde_json::to_string(&record).unwrap();
        let parsed: IdempotencyRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }

    // -------------------------------------------------------------------------
    // In-Memory Claim Lifecycle Tests
    // -------------------------------------------------------------------------

    #[rstest]
    #[tokio::test]
    async fn test_claim_then_pending_then_completed() {
        let store = store();

        let first = store.claim("key-1", "fp").await.unwrap();
        assert_eq!(first, ClaimOutcome::Claimed);

        let second = store.claim("key-1", "fp").await.unwrap();
        assert_eq!(second, ClaimOutcome::Pending);

        store.complete("key-1", sample_response()).await.unwrap();

        let third = store.claim("key-1", "fp").await.unwrap();
        assert_eq!(third, ClaimOutcome::Completed(sample_response()));
    }

    #[rstest]
    #[tokio::test]
    async fn test_claim_fingerprint_mismatch() {
        let store = store();
        store.claim("key-1", "fp-a").await.unwrap();

        let outcome = store.claim("key-1", "fp-b").await.unwrap();
        assert_eq!(outcome, ClaimOutcome::FingerprintMismatch);
    }

    #[rstest]
    #[tokio::test]
    async fn test_release_reopens_pending_key() {
        let store = store();
        store.claim("key-1", "fp").await.unwrap();
        store.release("key-1").await.unwrap();

        let outcome = store.claim("key-1", "fp").await.unwrap();
        assert_eq!(outcome, ClaimOutcome::Claimed);
    }

    #[rstest]
    #[tokio::test]
    async fn test_release_keeps_completed_record() {
        let store = store();
        store.claim("key-1", "fp").await.unwrap();
        store.complete("key-1", sample_response()).await.unwrap();
        store.release("key-1").await.unwrap();

        let record = store.get("key-1").await.unwrap().unwrap();
        assert!(matches!(record.state, RecordState::Completed { .. }));
    }

    #[rstest]
    #[tokio::test]
    async fn test_complete_does_not_overwrite_completed() {
        let store = store();
        store.claim("key-1", "fp").await.unwrap();
        store.complete("key-1", sample_response()).await.unwrap();

        let other = StoredResponse::capture(500, None, b"boom");
        store.complete("key-1", other).await.unwrap();

        let record = store.get("key-1").await.unwrap().unwrap();
        let RecordState::Completed { response } = record.state else {
            panic!("expected completed record");
        };
        assert_eq!(response.status, 200);
    }

    #[rstest]
    #[tokio::test]
    async fn test_complete_preserves_fingerprint() {
        let store = store();
        store.claim("key-1", "fp").await.unwrap();
        store.complete("key-1", sample_response()).await.unwrap();

        // A retry with a different body must still be rejected after
        // completion.
        let outcome = store.claim("key-1", "other-fp").await.unwrap();
        assert_eq!(outcome, ClaimOutcome::FingerprintMismatch);
    }

    #[rstest]
    #[tokio::test]
    async fn test_late_completion_matches_any_retry() {
        let store = store();
        // Completion lands with no surviving pending record (e.g. the claim
        // expired); the resulting record has no fingerprint and must still
        // replay for any retry.
        store.complete("key-1", sample_response()).await.unwrap();

        let outcome = store.claim("key-1", "whatever-fp").await.unwrap();
        assert_eq!(outcome, ClaimOutcome::Completed(sample_response()));
    }

    #[rstest]
    #[tokio::test]
    async fn test_pending_claim_expires() {
        let store = InMemoryIdempotencyStore::new(IdempotencyStoreConfig {
            ttl_seconds: 60,
            pending_ttl_seconds: 0,
        });
        // pending_ttl of 0 is not clamped here (only `new` clamps), so the
        // entry is immediately expired.
        store.claim("key-1", "fp").await.unwrap();
        let outcome = store.claim("key-1", "fp").await.unwrap();
        assert_eq!(outcome, ClaimOutcome::Claimed);
    }

    #[rstest]
    fn test_config_clamps_zero_ttls() {
        let config = IdempotencyStoreConfig::new(0, 0);
        assert_eq!(config.ttl_seconds, 1);
        assert_eq!(config.pending_ttl_seconds, 1);
    }

    // -------------------------------------------------------------------------
    // Lua Script Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_claim_script_is_get_or_set() {
        assert!(CLAIM_SCRIPT.contains("GET"));
        assert!(CLAIM_SCRIPT.contains("return existing"));
        assert!(CLAIM_SCRIPT.contains("CLAIMED"));
    }

    #[rstest]
    fn test_complete_script_never_overwrites_completed() {
        assert!(COMPLETE_SCRIPT.contains("record.state == 'completed'"));
        assert!(COMPLETE_SCRIPT.contains("SKIPPED"));
    }

    #[rstest]
    fn test_release_script_only_deletes_pending() {
        assert!(RELEASE_SCRIPT.contains("record.state == 'pending'"));
        assert!(RELEASE_SCRIPT.contains("DEL"));
    }
}
