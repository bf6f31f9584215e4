//! HTTP handlers for portfolio-intelligence scenarios.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;

use super::dto::{
    CreateScenarioRequest, ListResponse, ProjectionResponse, ScenarioResponse,
    UpdateScenarioRequest, parse_uuid, validate_assumptions, validate_name,
};
use super::error::ApiErrorResponse;
use super::handlers::{AppState, PaginationQuery};
use crate::domain::{FundId, Scenario, ScenarioId, Timestamp};

// =============================================================================
// Query Parameters
// =============================================================================

/// Query parameters for listing scenarios.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScenarioListQuery {
    /// Optional fund filter.
    #[serde(default)]
    pub fund_id: Option<String>,
    /// Page number (0-indexed).
    #[serde(default)]
    pub page: Option<u32>,
    /// Items per page.
    #[serde(default)]
    pub page_size: Option<u32>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Creates a new scenario for a fund.
///
/// # Response
///
/// - **201 Created**: Scenario created
/// - **400 Bad Request**: Validation error (including unknown fund)
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] on validation or repository failure.
pub async fn create_scenario(
    State(state): State<AppState>,
    Json(request): Json<CreateScenarioRequest>,
) -> Result<(StatusCode, Json<ScenarioResponse>), ApiErrorResponse> {
    let name = validate_name("name", &request.name)?;
    let fund_id = FundId::from_uuid(parse_uuid("fund_id", &request.fund_id)?);

    if state.fund_repository.find_by_id(&fund_id).await?.is_none() {
        return Err(ApiErrorResponse::validation_error(
            "Validation failed",
            vec![super::error::FieldError::new(
                "fund_id",
                format!("fund {} does not exist", request.fund_id),
            )],
        ));
    }

    let mut scenario = Scenario::new(ScenarioId::generate_v7(), fund_id, name, Timestamp::now());
    if let Some(assumptions) = &request.assumptions {
        scenario.assumptions = validate_assumptions(assumptions)?;
    }

    state.scenario_repository.save(&scenario).await?;

    Ok((StatusCode::CREATED, Json(ScenarioResponse::from(&scenario))))
}

/// Lists scenarios, optionally filtered by fund.
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] on invalid pagination or repository failure.
pub async fn list_scenarios(
    State(state): State<AppState>,
    Query(query): Query<ScenarioListQuery>,
) -> Result<Json<ListResponse<ScenarioResponse>>, ApiErrorResponse> {
    let pagination = PaginationQuery {
        page: query.page,
        page_size: query.page_size,
    }
    .resolve(&state.config)?;

    let fund_id = query
        .fund_id
        .as_deref()
        .map(|raw| parse_uuid("fund_id", raw).map(FundId::from_uuid))
        .transpose()?;

    let page = state.scenario_repository.list(fund_id, pagination).await?;

    Ok(Json(ListResponse {
        items: page.items.iter().map(ScenarioResponse::from).collect(),
        total: page.total,
        page: page.page,
        page_size: page.page_size,
    }))
}

/// Fetches a scenario by ID.
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] when the ID is malformed, the scenario does
/// not exist, or the repository fails.
pub async fn get_scenario(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ScenarioResponse>, ApiErrorResponse> {
    let scenario_id = ScenarioId::from_uuid(parse_uuid("id", &id)?);

    let scenario = state
        .scenario_repository
        .find_by_id(&scenario_id)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found(format!("Scenario {id} not found")))?;

    Ok(Json(ScenarioResponse::from(&scenario)))
}

/// Updates a scenario. The request must carry the current version.
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] on validation failure, missing scenario,
/// version conflict, or repository failure.
pub async fn update_scenario(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateScenarioRequest>,
) -> Result<Json<ScenarioResponse>, ApiErrorResponse> {
    let scenario_id = ScenarioId::from_uuid(parse_uuid("id", &id)?);

    let mut scenario = state
        .scenario_repository
        .find_by_id(&scenario_id)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found(format!("Scenario {id} not found")))?;

    if request.version != scenario.version {
        return Err(ApiErrorResponse::conflict(format!(
            "Expected version {}, found {}",
            scenario.version, request.version
        )));
    }

    if let Some(name) = &request.name {
        scenario.name = validate_name("name", name)?;
    }
    if let Some(assumptions) = &request.assumptions {
        scenario.assumptions = validate_assumptions(assumptions)?;
    }

    scenario.touch(Timestamp::now());
    state.scenario_repository.save(&scenario).await?;

    Ok(Json(ScenarioResponse::from(&scenario)))
}

/// Deletes a scenario.
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] when the scenario does not exist or the
/// repository fails.
pub async fn delete_scenario(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiErrorResponse> {
    let scenario_id = ScenarioId::from_uuid(parse_uuid("id", &id)?);

    if state.scenario_repository.delete(&scenario_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiErrorResponse::not_found(format!(
            "Scenario {id} not found"
        )))
    }
}

/// Runs a scenario through the projection engine.
///
/// Wrapped by the idempotency layer in the router.
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] when the scenario or its fund is missing, or
/// the engine rejects the inputs.
pub async fn run_scenario(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProjectionResponse>, ApiErrorResponse> {
    let scenario_id = ScenarioId::from_uuid(parse_uuid("id", &id)?);

    let scenario = state
        .scenario_repository
        .find_by_id(&scenario_id)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found(format!("Scenario {id} not found")))?;

    let fund = state
        .fund_repository
        .find_by_id(&scenario.fund_id)
        .await?
        .ok_or_else(|| {
            // The fund was deleted out from under the scenario.
            ApiErrorResponse::not_found(format!("Fund {} not found", scenario.fund_id))
        })?;

    let result = state.engine.project(&fund, &scenario.assumptions).await?;

    Ok(Json(ProjectionResponse::from(&result)))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_scenario_list_query_optional_fields() {
        let query: ScenarioListQuery = serde_json::from_str("{}").unwrap();
        assert!(query.fund_id.is_none());
        assert!(query.page.is_none());

        let query: ScenarioListQuery =
            serde_json::from_str(r#"{"fund_id":"abc","page_size":5}"#).unwrap();
        assert_eq!(query.fund_id.as_deref(), Some("abc"));
        assert_eq!(query.page_size, Some(5));
    }
}
