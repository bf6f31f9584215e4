//! HTTP handlers for funds and the projection endpoint.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;

use super::dto::{
    CalculateRequest, CreateFundRequest, FundResponse, ListResponse, ProjectionResponse,
    UpdateFundRequest, parse_uuid, validate_allocations, validate_bps, validate_expenses,
    validate_fund_size, validate_name, validate_stages, validate_vintage_year,
    validate_waterfall,
};
use super::error::{ApiErrorResponse, ValidationError};
use crate::domain::{Fund, FundId, ScenarioAssumptions, Timestamp};
use crate::infrastructure::{
    DealRepository, FundRepository, IdempotencyStore, InflightRegistry, Pagination,
    ProjectionEngine, Repositories, ScenarioRepository, VarianceRepository,
};

// =============================================================================
// Application Configuration
// =============================================================================

/// Application configuration for runtime settings.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Default page size for list endpoints.
    pub default_page_size: u32,
    /// Maximum page size accepted from clients.
    pub max_page_size: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

// =============================================================================
// Application State
// =============================================================================

/// Shared application dependencies.
///
/// Uses trait objects (`dyn`) instead of generics to work seamlessly with
/// the `RepositoryFactory`, which selects backends at runtime.
#[derive(Clone)]
pub struct AppState {
    /// Fund repository.
    pub fund_repository: Arc<dyn FundRepository>,
    /// Deal repository.
    pub deal_repository: Arc<dyn DealRepository>,
    /// Scenario repository.
    pub scenario_repository: Arc<dyn ScenarioRepository>,
    /// Variance repository.
    pub variance_repository: Arc<dyn VarianceRepository>,
    /// Projection engine.
    pub engine: Arc<dyn ProjectionEngine>,
    /// Idempotency record store.
    pub idempotency_store: Arc<dyn IdempotencyStore>,
    /// Process-local single-flight registry.
    pub inflight: InflightRegistry,
    /// Application configuration.
    pub config: AppConfig,
}

impl AppState {
    /// Creates application state from factory output and an engine.
    #[must_use]
    pub fn new(repositories: Repositories, engine: Arc<dyn ProjectionEngine>) -> Self {
        Self {
            fund_repository: repositories.fund_repository,
            deal_repository: repositories.deal_repository,
            scenario_repository: repositories.scenario_repository,
            variance_repository: repositories.variance_repository,
            engine,
            idempotency_store: repositories.idempotency_store,
            inflight: InflightRegistry::new(),
            config: AppConfig::default(),
        }
    }
}

// =============================================================================
// Pagination Query
// =============================================================================

/// Pagination query parameters shared by list endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PaginationQuery {
    /// Page number (0-indexed).
    #[serde(default)]
    pub page: Option<u32>,
    /// Items per page.
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl PaginationQuery {
    /// Resolves the query against application defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when `page_size` is zero or exceeds the
    /// configured maximum.
    pub fn resolve(self, config: &AppConfig) -> Result<Pagination, ValidationError> {
        let page_size = self.page_size.unwrap_or(config.default_page_size);
        if page_size == 0 || page_size > config.max_page_size {
            return Err(ValidationError::single(
                "page_size",
                format!("must be between 1 and {}", config.max_page_size),
            ));
        }
        Ok(Pagination::new_unchecked(
            self.page.unwrap_or(0),
            page_size,
        ))
    }
}

// =============================================================================
// GET /health Handler
// =============================================================================

/// Health check response body.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
}

/// Health check endpoint.
///
/// # Response
///
/// - **200 OK**: Service is healthy
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// =============================================================================
// Fund CRUD Handlers
// =============================================================================

/// Validated create-fund data.
#[derive(Debug)]
struct ValidatedCreateFund {
    name: String,
    vintage_year: u16,
    fund_size: rust_decimal::Decimal,
    management_fee_bps: u32,
    carried_interest_bps: u32,
    expenses: Vec<crate::domain::FundExpense>,
    waterfall: Vec<crate::domain::WaterfallTier>,
    allocations: Vec<crate::domain::CapitalAllocation>,
    stages: Vec<crate::domain::InvestmentStage>,
}

fn validate_create_fund(request: &CreateFundRequest) -> Result<ValidatedCreateFund, ApiErrorResponse> {
    Ok(ValidatedCreateFund {
        name: validate_name("name", &request.name)?,
        vintage_year: validate_vintage_year(request.vintage_year)?,
        fund_size: validate_fund_size(request.fund_size)?,
        management_fee_bps: validate_bps(
            "management_fee_bps",
            request.management_fee_bps.unwrap_or(200),
        )?,
        carried_interest_bps: validate_bps(
            "carried_interest_bps",
            request.carried_interest_bps.unwrap_or(2_000),
        )?,
        expenses: validate_expenses(&request.expenses)?,
        waterfall: validate_waterfall(&request.waterfall)?,
        allocations: validate_allocations(&request.allocations)?,
        stages: validate_stages(&request.stages)?,
    })
}

fn build_fund(validated: ValidatedCreateFund) -> Fund {
    let mut fund = Fund::new(
        FundId::generate_v7(),
        validated.name,
        validated.vintage_year,
        validated.fund_size,
        Timestamp::now(),
    );
    fund.management_fee_bps = validated.management_fee_bps;
    fund.carried_interest_bps = validated.carried_interest_bps;
    fund.expenses = validated.expenses;
    fund.waterfall = validated.waterfall;
    fund.allocations = validated.allocations;
    fund.stages = validated.stages;
    fund
}

/// Creates a new fund.
///
/// # Response
///
/// - **201 Created**: Fund created successfully
/// - **400 Bad Request**: Validation error
/// - **500 Internal Server Error**: Repository error
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] on validation or repository failure.
pub async fn create_fund(
    State(state): State<AppState>,
    Json(request): Json<CreateFundRequest>,
) -> Result<(StatusCode, Json<FundResponse>), ApiErrorResponse> {
    let validated = validate_create_fund(&request)?;
    let fund = build_fund(validated);

    state.fund_repository.save(&fund).await?;

    Ok((StatusCode::CREATED, Json(FundResponse::from(&fund))))
}

/// Lists funds with pagination.
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] on invalid pagination or repository failure.
pub async fn list_funds(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListResponse<FundResponse>>, ApiErrorResponse> {
    let pagination = query.resolve(&state.config)?;
    let page = state.fund_repository.list(pagination).await?;

    Ok(Json(ListResponse {
        items: page.items.iter().map(FundResponse::from).collect(),
        total: page.total,
        page: page.page,
        page_size: page.page_size,
    }))
}

/// Fetches a fund by ID.
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] when the ID is malformed, the fund does not
/// exist, or the repository fails.
pub async fn get_fund(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FundResponse>, ApiErrorResponse> {
    let fund_id = FundId::from_uuid(parse_uuid("id", &id)?);

    let fund = state
        .fund_repository
        .find_by_id(&fund_id)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found(format!("Fund {id} not found")))?;

    Ok(Json(FundResponse::from(&fund)))
}

/// Updates a fund. The request must carry the current version.
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] on validation failure, missing fund, version
/// conflict, or repository failure.
pub async fn update_fund(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateFundRequest>,
) -> Result<Json<FundResponse>, ApiErrorResponse> {
    let fund_id = FundId::from_uuid(parse_uuid("id", &id)?);

    let mut fund = state
        .fund_repository
        .find_by_id(&fund_id)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found(format!("Fund {id} not found")))?;

    if request.version != fund.version {
        return Err(ApiErrorResponse::conflict(format!(
            "Expected version {}, found {}",
            fund.version, request.version
        )));
    }

    if let Some(name) = &request.name {
        fund.name = validate_name("name", name)?;
    }
    if let Some(vintage_year) = request.vintage_year {
        fund.vintage_year = validate_vintage_year(vintage_year)?;
    }
    if let Some(fund_size) = request.fund_size {
        fund.fund_size = validate_fund_size(fund_size)?;
    }
    if let Some(fee) = request.management_fee_bps {
        fund.management_fee_bps = validate_bps("management_fee_bps", fee)?;
    }
    if let Some(carry) = request.carried_interest_bps {
        fund.carried_interest_bps = validate_bps("carried_interest_bps", carry)?;
    }
    if let Some(expenses) = &request.expenses {
        fund.expenses = validate_expenses(expenses)?;
    }
    if let Some(waterfall) = &request.waterfall {
        fund.waterfall = validate_waterfall(waterfall)?;
    }
    if let Some(allocations) = &request.allocations {
        fund.allocations = validate_allocations(allocations)?;
    }
    if let Some(stages) = &request.stages {
        fund.stages = validate_stages(stages)?;
    }

    fund.touch(Timestamp::now());
    state.fund_repository.save(&fund).await?;

    Ok(Json(FundResponse::from(&fund)))
}

/// Deletes a fund.
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] when the fund does not exist or the
/// repository fails.
pub async fn delete_fund(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiErrorResponse> {
    let fund_id = FundId::from_uuid(parse_uuid("id", &id)?);

    if state.fund_repository.delete(&fund_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiErrorResponse::not_found(format!("Fund {id} not found")))
    }
}

// =============================================================================
// POST /api/funds/calculate Handler
// =============================================================================

/// Runs a projection for a fund.
///
/// Wrapped by the idempotency layer in the router: clients receive `202
/// Accepted` with a polling `Location` on first submission and the stored
/// response on replay.
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] on validation failure, missing fund, or
/// engine rejection.
pub async fn calculate_fund(
    State(state): State<AppState>,
    Json(request): Json<CalculateRequest>,
) -> Result<Json<ProjectionResponse>, ApiErrorResponse> {
    let fund_id = FundId::from_uuid(parse_uuid("fund_id", &request.fund_id)?);

    let fund = state
        .fund_repository
        .find_by_id(&fund_id)
        .await?
        .ok_or_else(|| {
            ApiErrorResponse::not_found(format!("Fund {} not found", request.fund_id))
        })?;

    let assumptions = match &request.assumptions {
        Some(dto) => super::dto::validate_assumptions(dto)?,
        None => ScenarioAssumptions::default(),
    };

    let result = state.engine.project(&fund, &assumptions).await?;

    Ok(Json(ProjectionResponse::from(&result)))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal::Decimal;

    use crate::api::dto::{CapitalAllocationDto, WaterfallTierDto, WaterfallTierKindDto};

    fn sample_request() -> CreateFundRequest {
        CreateFundRequest {
            name: "Growth Fund I".to_string(),
            vintage_year: 2024,
            fund_size: Decimal::new(100_000_000, 0),
            management_fee_bps: None,
            carried_interest_bps: Some(2_500),
            expenses: vec![],
            waterfall: vec![WaterfallTierDto {
                tier: WaterfallTierKindDto::CarriedInterest,
                rate_bps: 2_000,
            }],
            allocations: vec![CapitalAllocationDto {
                stage_name: "seed".to_string(),
                percentage_bps: 5_000,
            }],
            stages: vec![],
        }
    }

    // -------------------------------------------------------------------------
    // Validation Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_validate_create_fund_valid() {
        let validated = validate_create_fund(&sample_request()).unwrap();
        assert_eq!(validated.name, "Growth Fund I");
        assert_eq!(validated.management_fee_bps, 200);
        assert_eq!(validated.carried_interest_bps, 2_500);
    }

    #[rstest]
    fn test_validate_create_fund_rejects_bad_year() {
        let mut request = sample_request();
        request.vintage_year = 1900;
        let error = validate_create_fund(&request).unwrap_err();
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
    }

    #[rstest]
    fn test_build_fund_applies_terms() {
        let fund = build_fund(validate_create_fund(&sample_request()).unwrap());
        assert_eq!(fund.version, 1);
        assert_eq!(fund.carried_interest_bps, 2_500);
        assert_eq!(fund.waterfall.len(), 1);
        assert_eq!(fund.allocations.len(), 1);
    }

    // -------------------------------------------------------------------------
    // PaginationQuery Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_pagination_query_defaults() {
        let query = PaginationQuery::default();
        let pagination = query.resolve(&AppConfig::default()).unwrap();
        assert_eq!(pagination.page, 0);
        assert_eq!(pagination.page_size, 20);
    }

    #[rstest]
    #[case(Some(0), false)]
    #[case(Some(1), true)]
    #[case(Some(100), true)]
    #[case(Some(101), false)]
    fn test_pagination_query_bounds(#[case] page_size: Option<u32>, #[case] valid: bool) {
        let query = PaginationQuery {
            page: None,
            page_size,
        };
        assert_eq!(query.resolve(&AppConfig::default()).is_ok(), valid);
    }
}
