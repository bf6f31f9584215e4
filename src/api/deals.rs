//! HTTP handlers for the deal pipeline.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;

use super::dto::{
    CreateDealRequest, DealResponse, ListResponse, PipelineStageDto, UpdateDealStageRequest,
    parse_uuid, validate_name, validate_optional_amount,
};
use super::error::ApiErrorResponse;
use super::handlers::{AppState, PaginationQuery};
use crate::domain::{DealId, DealOpportunity, FundId, PipelineStage, Timestamp};

// =============================================================================
// Query Parameters
// =============================================================================

/// Query parameters for listing deals.
///
/// Pagination fields are inlined rather than flattened because
/// `serde_urlencoded` does not deserialize numbers through `#[serde(flatten)]`.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct DealListQuery {
    /// Optional stage filter.
    #[serde(default)]
    pub stage: Option<PipelineStageDto>,
    /// Page number (0-indexed).
    #[serde(default)]
    pub page: Option<u32>,
    /// Items per page.
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl DealListQuery {
    /// The pagination portion of the query.
    #[must_use]
    pub const fn pagination(self) -> PaginationQuery {
        PaginationQuery {
            page: self.page,
            page_size: self.page_size,
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Creates a new deal at the `sourced` stage.
///
/// # Response
///
/// - **201 Created**: Deal created successfully
/// - **400 Bad Request**: Validation error
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] on validation or repository failure. A
/// referenced fund must exist.
pub async fn create_deal(
    State(state): State<AppState>,
    Json(request): Json<CreateDealRequest>,
) -> Result<(StatusCode, Json<DealResponse>), ApiErrorResponse> {
    let company_name = validate_name("company_name", &request.company_name)?;
    let round_size = validate_optional_amount("round_size", request.round_size)?;
    let valuation = validate_optional_amount("valuation", request.valuation)?;

    let fund_id = match &request.fund_id {
        Some(raw) => {
            let fund_id = FundId::from_uuid(parse_uuid("fund_id", raw)?);
            // Referencing a missing fund is a validation failure, not a 404:
            // the deal itself is the resource being created.
            if state.fund_repository.find_by_id(&fund_id).await?.is_none() {
                return Err(ApiErrorResponse::validation_error(
                    "Validation failed",
                    vec![super::error::FieldError::new(
                        "fund_id",
                        format!("fund {raw} does not exist"),
                    )],
                ));
            }
            Some(fund_id)
        }
        None => None,
    };

    let mut deal = DealOpportunity::new(DealId::generate_v7(), company_name, Timestamp::now());
    deal.fund_id = fund_id;
    deal.sector = request
        .sector
        .as_deref()
        .map(str::trim)
        .filter(|sector| !sector.is_empty())
        .map(ToString::to_string);
    deal.round_size = round_size;
    deal.valuation = valuation;

    state.deal_repository.save(&deal).await?;

    Ok((StatusCode::CREATED, Json(DealResponse::from(&deal))))
}

/// Lists deals, optionally filtered by pipeline stage.
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] on invalid pagination or repository failure.
pub async fn list_deals(
    State(state): State<AppState>,
    Query(query): Query<DealListQuery>,
) -> Result<Json<ListResponse<DealResponse>>, ApiErrorResponse> {
    let pagination = query.pagination().resolve(&state.config)?;
    let stage = query.stage.map(PipelineStage::from);

    let page = state.deal_repository.list(stage, pagination).await?;

    Ok(Json(ListResponse {
        items: page.items.iter().map(DealResponse::from).collect(),
        total: page.total,
        page: page.page,
        page_size: page.page_size,
    }))
}

/// Fetches a deal by ID.
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] when the ID is malformed, the deal does not
/// exist, or the repository fails.
pub async fn get_deal(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DealResponse>, ApiErrorResponse> {
    let deal_id = DealId::from_uuid(parse_uuid("id", &id)?);

    let deal = state
        .deal_repository
        .find_by_id(&deal_id)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found(format!("Deal {id} not found")))?;

    Ok(Json(DealResponse::from(&deal)))
}

/// Transitions a deal to a new pipeline stage.
///
/// Moves advance one stage at a time or to `passed`; terminal stages reject
/// all moves. The request carries the current version for optimistic
/// locking.
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] on invalid transitions (400), missing deal
/// (404), or version conflicts (409).
pub async fn update_deal_stage(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateDealStageRequest>,
) -> Result<Json<DealResponse>, ApiErrorResponse> {
    let deal_id = DealId::from_uuid(parse_uuid("id", &id)?);

    let mut deal = state
        .deal_repository
        .find_by_id(&deal_id)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found(format!("Deal {id} not found")))?;

    if request.version != deal.version {
        return Err(ApiErrorResponse::conflict(format!(
            "Expected version {}, found {}",
            deal.version, request.version
        )));
    }

    deal.transition_to(request.stage.into(), Timestamp::now())?;
    state.deal_repository.save(&deal).await?;

    Ok(Json(DealResponse::from(&deal)))
}

/// Deletes a deal.
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] when the deal does not exist or the
/// repository fails.
pub async fn delete_deal(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiErrorResponse> {
    let deal_id = DealId::from_uuid(parse_uuid("id", &id)?);

    if state.deal_repository.delete(&deal_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiErrorResponse::not_found(format!("Deal {id} not found")))
    }
}

// =============================================================================
// Tests
// =============================================================================
