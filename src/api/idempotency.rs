//! Idempotency middleware for calculation-style POST endpoints.
//!
//! Retried mutating requests must not re-execute the operation. The layer
//! below implements the protocol:
//!
//! 1. Buffer the POST body (bounded) and fingerprint the request.
//! 2. Resolve the idempotency key: `Idempotency-Key` header, then
//!    `X-Idempotency-Key`, then a key derived from the fingerprint.
//! 3. Consult the process-local in-flight registry, then atomically claim
//!    the key in the shared store:
//!    - completed record → replay the stored response verbatim
//!      (`Idempotency-Status: replayed`);
//!    - pending record → `202 Accepted` with a polling `Location` and
//!      `Retry-After`;
//!    - fingerprint mismatch → `409 Conflict`;
//!    - claimed → execute the inner service in a background task
//!      (single-flight), record the response on completion, and answer
//!      `202 Accepted` immediately.
//! 4. Store failures never fail the request: the layer falls through to
//!    inline execution.
//!
//! `GET /api/operations/{key}` serves the polling side of the protocol.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::{Body, to_bytes};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, header};
use axum::response::IntoResponse;
use axum::Json;
use tower::{Layer, Service};

use super::error::{ApiErrorResponse, FieldError};
use super::fingerprint::{derived_key, request_fingerprint, validate_client_key};
use super::handlers::AppState;
use crate::infrastructure::{
    ClaimOutcome, IdempotencyStore, InflightRegistry, RecordState, StoredResponse,
};

/// Primary request header carrying the client-supplied key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
/// Legacy alias accepted for compatibility.
pub const IDEMPOTENCY_KEY_HEADER_ALT: &str = "x-idempotency-key";
/// Response header describing how the request was resolved.
pub const IDEMPOTENCY_STATUS_HEADER: &str = "idempotency-status";

// =============================================================================
// Configuration
// =============================================================================

/// Runtime configuration for the idempotency layer.
#[derive(Debug, Clone)]
pub struct IdempotencyConfig {
    /// Maximum request/response body size the layer will buffer.
    pub max_body_bytes: usize,
    /// `Retry-After` value on 202 responses, in seconds.
    pub retry_after_seconds: u64,
    /// Path prefix for polling URLs (`{prefix}/{key}`).
    pub location_prefix: String,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024,
            retry_after_seconds: 1,
            location_prefix: "/api/operations".to_string(),
        }
    }
}

impl IdempotencyConfig {
    /// Creates a configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `IDEMPOTENCY_MAX_BODY_BYTES`: body buffer cap (default: 1 MiB)
    /// - `IDEMPOTENCY_RETRY_AFTER_SECS`: polling hint (default: 1)
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_body_bytes = std::env::var("IDEMPOTENCY_MAX_BODY_BYTES")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(defaults.max_body_bytes);
        let retry_after_seconds = std::env::var("IDEMPOTENCY_RETRY_AFTER_SECS")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(defaults.retry_after_seconds);

        Self {
            max_body_bytes,
            retry_after_seconds,
            location_prefix: defaults.location_prefix,
        }
    }

    /// Polling URL for a key.
    #[must_use]
    pub fn location_for(&self, key: &str) -> String {
        format!("{}/{key}", self.location_prefix)
    }
}

// =============================================================================
// Key Extraction
// =============================================================================

/// Result of reading the idempotency key headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyExtraction {
    /// A valid client key was supplied.
    Provided(String),
    /// No key header was present.
    Absent,
    /// A key header was present but malformed.
    Invalid,
}

/// Reads the idempotency key from the request headers.
#[must_use]
pub fn extract_client_key(headers: &HeaderMap) -> KeyExtraction {
    let raw = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .or_else(|| headers.get(IDEMPOTENCY_KEY_HEADER_ALT));

    match raw {
        None => KeyExtraction::Absent,
        Some(value) => match value.to_str().ok().and_then(validate_client_key) {
            Some(key) => KeyExtraction::Provided(key),
            None => KeyExtraction::Invalid,
        },
    }
}

// =============================================================================
// Response Builders
// =============================================================================

fn insert_header(response: &mut Response<Body>, name: &'static str, value: &str) {
    if let Ok(header_value) = HeaderValue::from_str(value) {
        response.headers_mut().insert(name, header_value);
    }
}

/// Body returned on 202 responses.
#[derive(Debug, Clone, serde::Serialize)]
struct AcceptedBody {
    status: &'static str,
    operation: String,
}

/// Builds a `202 Accepted` response pointing at the polling endpoint.
fn accepted_response(
    key: &str,
    config: &IdempotencyConfig,
    status_label: &'static str,
) -> Response<Body> {
    let location = config.location_for(key);
    let mut response = (
        StatusCode::ACCEPTED,
        Json(AcceptedBody {
            status: status_label,
            operation: location.clone(),
        }),
    )
        .into_response();

    insert_header(&mut response, "location", &location);
    insert_header(
        &mut response,
        "retry-after",
        &config.retry_after_seconds.to_string(),
    );
    insert_header(&mut response, IDEMPOTENCY_STATUS_HEADER, status_label);
    insert_header(&mut response, IDEMPOTENCY_KEY_HEADER, key);
    response
}

/// Rebuilds a stored response for replay.
fn replay_response(key: &str, stored: &StoredResponse, status_label: &str) -> Response<Body> {
    let body = match stored.body() {
        Ok(body) => body,
        Err(error) => {
            tracing::warn!(
                idempotency_key = %key,
                error = %error,
                "Stored response body could not be decoded"
            );
            return ApiErrorResponse::internal_error("An internal error occurred").into_response();
        }
    };

    let status = StatusCode::from_u16(stored.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, body).into_response();

    if let Some(content_type) = &stored.content_type {
        insert_header(&mut response, "content-type", content_type);
    }
    insert_header(&mut response, IDEMPOTENCY_STATUS_HEADER, status_label);
    insert_header(&mut response, IDEMPOTENCY_KEY_HEADER, key);
    response
}

fn key_reuse_response(key: &str) -> Response<Body> {
    let mut response = ApiErrorResponse::idempotency_key_reuse().into_response();
    insert_header(&mut response, IDEMPOTENCY_KEY_HEADER, key);
    response
}

fn invalid_key_response() -> Response<Body> {
    ApiErrorResponse::validation_error(
        "Validation failed",
        vec![FieldError::new(
            "Idempotency-Key",
            "must be non-empty, at most 200 characters, without whitespace",
        )],
    )
    .into_response()
}

// =============================================================================
// Idempotency Layer
// =============================================================================

/// Tower layer applying the idempotency protocol to POST routes.
#[derive(Clone)]
pub struct IdempotencyLayer {
    store: Arc<dyn IdempotencyStore>,
    inflight: InflightRegistry,
    config: Arc<IdempotencyConfig>,
}

impl IdempotencyLayer {
    /// Creates a layer over the given store and in-flight registry.
    #[must_use]
    pub fn new(
        store: Arc<dyn IdempotencyStore>,
        inflight: InflightRegistry,
        config: IdempotencyConfig,
    ) -> Self {
        Self {
            store,
            inflight,
            config: Arc::new(config),
        }
    }

    /// Creates a layer wired to the application state.
    #[must_use]
    pub fn for_state(state: &AppState, config: IdempotencyConfig) -> Self {
        Self::new(
            Arc::clone(&state.idempotency_store),
            state.inflight.clone(),
            config,
        )
    }
}

impl<S> Layer<S> for IdempotencyLayer {
    type Service = IdempotencyService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        IdempotencyService {
            inner,
            store: Arc::clone(&self.store),
            inflight: self.inflight.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

// =============================================================================
// Idempotency Service
// =============================================================================

/// Service created by [`IdempotencyLayer`].
#[derive(Clone)]
pub struct IdempotencyService<S> {
    inner: S,
    store: Arc<dyn IdempotencyStore>,
    inflight: InflightRegistry,
    config: Arc<IdempotencyConfig>,
}

impl<S> Service<Request<Body>> for IdempotencyService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, context: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(context)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        // Swap in the freshly-cloned service so the one we keep has been
        // driven to readiness (standard tower clone pattern).
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let store = Arc::clone(&self.store);
        let inflight = self.inflight.clone();
        let config = Arc::clone(&self.config);

        Box::pin(async move {
            if request.method() != Method::POST {
                return inner.call(request).await;
            }

            let (parts, body) = request.into_parts();
            let bytes = match to_bytes(body, config.max_body_bytes).await {
                Ok(bytes) => bytes,
                Err(error) => {
                    tracing::warn!(%error, "Failed to buffer request body");
                    return Ok(ApiErrorResponse::payload_too_large(format!(
                        "Request body exceeds {} bytes or could not be read",
                        config.max_body_bytes
                    ))
                    .into_response());
                }
            };

            let path = parts.uri.path().to_string();
            let fingerprint = request_fingerprint(parts.method.as_str(), &path, &bytes);
            let key = match extract_client_key(&parts.headers) {
                KeyExtraction::Provided(key) => key,
                KeyExtraction::Absent => derived_key(&fingerprint),
                KeyExtraction::Invalid => return Ok(invalid_key_response()),
            };

            // Process-local coalescing: a running execution answers without
            // a store round-trip.
            if inflight.is_running(&key) {
                return Ok(accepted_response(&key, &config, "pending"));
            }

            match store.claim(&key, &fingerprint).await {
                Ok(ClaimOutcome::Completed(stored)) => {
                    Ok(replay_response(&key, &stored, "replayed"))
                }
                Ok(ClaimOutcome::Pending) => Ok(accepted_response(&key, &config, "pending")),
                Ok(ClaimOutcome::FingerprintMismatch) => Ok(key_reuse_response(&key)),
                Ok(ClaimOutcome::Claimed) => {
                    let Some(guard) = inflight.try_begin(&key) else {
                        // Lost a local race between the registry check and
                        // the claim; the other execution owns the key now.
                        return Ok(accepted_response(&key, &config, "pending"));
                    };

                    let request = Request::from_parts(parts, Body::from(bytes));
                    let task_store = Arc::clone(&store);
                    let task_key = key.clone();
                    let max_body_bytes = config.max_body_bytes;

                    tokio::spawn(async move {
                        // Holds the in-flight slot until the execution and
                        // its bookkeeping finish.
                        let _guard = guard;
                        match inner.call(request).await {
                            Ok(response) => {
                                record_response(
                                    task_store.as_ref(),
                                    &task_key,
                                    response,
                                    max_body_bytes,
                                )
                                .await;
                            }
                            Err(_) => {
                                // Handler infrastructure failed before a
                                // response existed; release so a retry can
                                // execute.
                                if let Err(error) = task_store.release(&task_key).await {
                                    tracing::warn!(
                                        idempotency_key = %task_key,
                                        error = %error,
                                        "Failed to release idempotency claim"
                                    );
                                }
                            }
                        }
                    });

                    Ok(accepted_response(&key, &config, "accepted"))
                }
                Err(error) => {
                    // Store unusable even through its fallback: execute the
                    // request inline rather than failing it.
                    tracing::warn!(
                        idempotency_key = %key,
                        error = %error,
                        "Idempotency store unavailable, executing request inline"
                    );
                    let request = Request::from_parts(parts, Body::from(bytes));
                    inner.call(request).await
                }
            }
        })
    }
}

/// Buffers a handler response and records it as the key's completed result.
async fn record_response(
    store: &dyn IdempotencyStore,
    key: &str,
    response: Response<Body>,
    max_body_bytes: usize,
) {
    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::warn!(
                idempotency_key = %key,
                error = %error,
                "Response body too large to record, releasing claim"
            );
            if let Err(error) = store.release(key).await {
                tracing::warn!(
                    idempotency_key = %key,
                    error = %error,
                    "Failed to release idempotency claim"
                );
            }
            return;
        }
    };

    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);

    let stored = StoredResponse::capture(parts.status.as_u16(), content_type, &bytes);
    if let Err(error) = store.complete(key, stored).await {
        tracing::warn!(
            idempotency_key = %key,
            error = %error,
            "Failed to record completed response"
        );
    }
}

// =============================================================================
// GET /api/operations/{key} Handler
// =============================================================================

/// Body returned while an operation is still pending.
#[derive(Debug, Clone, serde::Serialize)]
struct PendingBody {
    status: &'static str,
}

/// Polls the status of an idempotent operation.
///
/// # Response
///
/// - **200/xxx**: the stored response, replayed verbatim
///   (`Idempotency-Status: completed`)
/// - **202 Accepted**: still executing (`Retry-After` set)
/// - **404 Not Found**: unknown or expired key
pub async fn get_operation_status(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Response<Body> {
    match state.idempotency_store.get(&key).await {
        Ok(None) => {
            ApiErrorResponse::not_found(format!("Operation {key} not found")).into_response()
        }
        Ok(Some(record)) => match record.state {
            RecordState::Pending => {
                let config = IdempotencyConfig::default();
                let mut response =
                    (StatusCode::ACCEPTED, Json(PendingBody { status: "pending" }))
                        .into_response();
                insert_header(
                    &mut response,
                    "retry-after",
                    &config.retry_after_seconds.to_string(),
                );
                insert_header(&mut response, IDEMPOTENCY_STATUS_HEADER, "pending");
                insert_header(&mut response, IDEMPOTENCY_KEY_HEADER, &key);
                response
            }
            RecordState::Completed { response } => replay_response(&key, &response, "completed"),
        },
        Err(error) => {
            tracing::error!(idempotency_key = %key, %error, "Failed to read operation status");
            ApiErrorResponse::internal_error("An internal error occurred").into_response()
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

    // -------------------------------------------------------------------------
    // Key Extraction Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_extract_client_key_primary_header() {
        let mut headers = HeaderMap::new();
        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_static("order-42"));
        assert_eq!(
            extract_client_key(&headers),
            KeyExtraction::Provided("order-42".to_string())
        );
    }

    #[rstest]
    fn test_extract_client_key_alt_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            IDEMPOTENCY_KEY_HEADER_ALT,
            HeaderValue::from_static("order-42"),
        );
        assert_eq!(
            extract_client_key(&headers),
            KeyExtraction::Provided("order-42".to_string())
        );
    }

    #[rstest]
    fn test_extract_client_key_prefers_primary() {
        let mut headers = HeaderMap::new();
        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_static("primary"));
        headers.insert(IDEMPOTENCY_KEY_HEADER_ALT, HeaderValue::from_static("alt"));
        assert_eq!(
            extract_client_key(&headers),
            KeyExtraction::Provided("primary".to_string())
        );
    }

    #[rstest]
    fn test_extract_client_key_absent() {
        assert_eq!(extract_client_key(&HeaderMap::new()), KeyExtraction::Absent);
    }

    #[rstest]
    fn test_extract_client_key_invalid() {
        let mut headers = HeaderMap::new();
        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_static("  "));
        assert_eq!(extract_client_key(&headers), KeyExtraction::Invalid);
    }

    // -------------------------------------------------------------------------
    // Configuration Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_config_defaults() {
        let config = IdempotencyConfig::default();
        assert_eq!(config.max_body_bytes, 1024 * 1024);
        assert_eq!(config.retry_after_seconds, 1);
        assert_eq!(config.location_prefix, "/api/operations");
    }

    #[rstest]
    fn test_config_location_for() {
        let config = IdempotencyConfig::default();
        assert_eq!(config.location_for("abc"), "/api/operations/abc");
    }

    // -------------------------------------------------------------------------
    // Response Builder Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_accepted_response_headers() {
        let config = IdempotencyConfig::default();
        let response = accepted_response("key-1", &config, "accepted");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(
            response.headers().get("location").unwrap(),
            "/api/operations/key-1"
        );
        assert_eq!(response.headers().get("retry-after").unwrap(), "1");
        assert_eq!(
            response.headers().get(IDEMPOTENCY_STATUS_HEADER).unwrap(),
            "accepted"
        );
        assert_eq!(
            response.headers().get(IDEMPOTENCY_KEY_HEADER).unwrap(),
            "key-1"
        );
    }

    #[rstest]
    fn test_replay_response_restores_status_and_content_type() {
        let stored = StoredResponse::capture(
            201,
            Some("application/json".to_string()),
            b"{\"id\":\"x\"}",
        );
        let response = replay_response("key-1", &stored, "replayed");

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
        assert_eq!(
            response.headers().get(IDEMPOTENCY_STATUS_HEADER).unwrap(),
            "replayed"
        );
    }

    #[rstest]
    fn test_replay_response_corrupt_body_is_internal_error() {
        let stored = StoredResponse {
            status: 200,
            content_type: None,
            body_b64: "!!corrupt!!".to_string(),
        };
        let response = replay_response("key-1", &stored, "replayed");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[rstest]
    fn test_key_reuse_response() {
        let response = key_reuse_response("key-1");
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            response.headers().get(IDEMPOTENCY_KEY_HEADER).unwrap(),
            "key-1"
        );
    }

    #[rstest]
    fn test_invalid_key_response() {
        let response = invalid_key_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
