//! API layer: handlers, DTOs, error formatting, and the idempotency
//! middleware.

pub mod deals;
pub mod dto;
pub mod error;
pub mod fingerprint;
pub mod handlers;
pub mod idempotency;
pub mod portfolio;
pub mod variance;

use axum::Router;
use axum::routing::{delete, get, patch, post};

pub use error::{ApiError, ApiErrorResponse, FieldError, ValidationError};
pub use handlers::{AppConfig, AppState, PaginationQuery, health_check};
pub use idempotency::{IdempotencyConfig, IdempotencyLayer};

/// Builds the application router.
///
/// The calculation-style POST endpoints are grouped under the idempotency
/// layer; everything else is plain request/response.
#[must_use]
pub fn build_router(state: AppState, idempotency_config: IdempotencyConfig) -> Router {
    let idempotency_layer = IdempotencyLayer::for_state(&state, idempotency_config);

    // Idempotent calculation endpoints. The layer only intercepts POST, so
    // the GET sharing the variance-reports path passes through untouched.
    let idempotent_routes = Router::new()
        .route("/api/funds/calculate", post(handlers::calculate_fund))
        .route(
            "/api/portfolio/scenarios/{id}/run",
            post(portfolio::run_scenario),
        )
        .route(
            "/api/funds/{id}/variance-reports",
            get(variance::list_variance_reports).post(variance::create_variance_report),
        )
        .route_layer(idempotency_layer);

    Router::new()
        .route("/health", get(handlers::health_check))
        // Fund CRUD
        .route(
            "/api/funds",
            get(handlers::list_funds).post(handlers::create_fund),
        )
        .route(
            "/api/funds/{id}",
            get(handlers::get_fund)
                .put(handlers::update_fund)
                .delete(handlers::delete_fund),
        )
        // Deal pipeline
        .route("/api/deals", get(deals::list_deals).post(deals::create_deal))
        .route(
            "/api/deals/{id}",
            get(deals::get_deal).delete(deals::delete_deal),
        )
        .route("/api/deals/{id}/stage", patch(deals::update_deal_stage))
        // Portfolio scenarios
        .route(
            "/api/portfolio/scenarios",
            get(portfolio::list_scenarios).post(portfolio::create_scenario),
        )
        .route(
            "/api/portfolio/scenarios/{id}",
            get(portfolio::get_scenario)
                .put(portfolio::update_scenario)
                .delete(portfolio::delete_scenario),
        )
        // Variance tracking
        .route(
            "/api/funds/{id}/baselines",
            get(variance::list_baselines).post(variance::create_baseline),
        )
        .route(
            "/api/funds/{id}/alert-rules",
            get(variance::list_alert_rules).post(variance::create_alert_rule),
        )
        .route(
            "/api/funds/{id}/alert-rules/{rule_id}",
            delete(variance::delete_alert_rule),
        )
        .route("/api/funds/{id}/alerts", get(variance::list_alerts))
        .route(
            "/api/funds/{id}/alerts/{alert_id}",
            patch(variance::acknowledge_alert),
        )
        // Idempotent operation polling
        .route(
            "/api/operations/{key}",
            get(idempotency::get_operation_status),
        )
        .merge(idempotent_routes)
        .with_state(state)
}
