//! HTTP handlers for variance tracking: baselines, variance reports, alert
//! rules, and alerts.
//!
//! Report generation is the one compound operation: it derives current
//! metrics (deployed capital from closed deals, the rest from the engine),
//! computes deltas against the chosen baseline, and evaluates the fund's
//! enabled alert rules, persisting any alerts they raise.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::dto::{
    AlertResponse, AlertRuleResponse, BaselineResponse, CreateAlertRuleRequest,
    CreateBaselineRequest, CreateVarianceReportRequest, VarianceReportResponse, parse_uuid,
    validate_name,
};
use super::error::ApiErrorResponse;
use super::handlers::AppState;
use crate::domain::{
    Alert, AlertId, AlertRule, AlertRuleId, Baseline, BaselineId, Fund, FundId, MetricSet,
    PipelineStage, Timestamp, VarianceReport, VarianceReportId,
};

// =============================================================================
// Helpers
// =============================================================================

async fn load_fund(state: &AppState, raw_id: &str) -> Result<Fund, ApiErrorResponse> {
    let fund_id = FundId::from_uuid(parse_uuid("id", raw_id)?);
    state
        .fund_repository
        .find_by_id(&fund_id)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found(format!("Fund {raw_id} not found")))
}

/// Derives the fund's current metrics.
///
/// Deployed capital is the sum of round sizes across the fund's closed
/// deals; the remaining metrics come from the projection engine.
async fn current_metrics(state: &AppState, fund: &Fund) -> Result<MetricSet, ApiErrorResponse> {
    let deals = state.deal_repository.list_by_fund(&fund.fund_id).await?;
    let deployed: Decimal = deals
        .iter()
        .filter(|deal| deal.stage == PipelineStage::Closed)
        .filter_map(|deal| deal.round_size)
        .sum();

    let metrics = state.engine.current_metrics(fund, deployed).await?;
    Ok(metrics)
}

// =============================================================================
// Baseline Handlers
// =============================================================================

/// Captures a baseline snapshot of the fund's current metrics.
///
/// # Response
///
/// - **201 Created**: Baseline captured
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] when the fund is missing or metric
/// derivation fails.
pub async fn create_baseline(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CreateBaselineRequest>,
) -> Result<(StatusCode, Json<BaselineResponse>), ApiErrorResponse> {
    let name = validate_name("name", &request.name)?;
    let fund = load_fund(&state, &id).await?;
    let metrics = current_metrics(&state, &fund).await?;

    let baseline = Baseline {
        baseline_id: BaselineId::generate_v7(),
        fund_id: fund.fund_id,
        name,
        metrics,
        captured_at: Timestamp::now(),
    };

    state.variance_repository.save_baseline(&baseline).await?;

    Ok((StatusCode::CREATED, Json(BaselineResponse::from(&baseline))))
}

/// Lists baselines for a fund, newest first.
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] when the fund is missing or the repository
/// fails.
pub async fn list_baselines(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<BaselineResponse>>, ApiErrorResponse> {
    let fund = load_fund(&state, &id).await?;
    let baselines = state
        .variance_repository
        .list_baselines(&fund.fund_id)
        .await?;

    Ok(Json(baselines.iter().map(BaselineResponse::from).collect()))
}

// =============================================================================
// Variance Report Handlers
// =============================================================================

/// Generates a variance report against a baseline and evaluates alert rules.
///
/// Wrapped by the idempotency layer in the router.
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] when the fund or baseline is missing, the
/// baseline belongs to another fund, or persistence fails.
pub async fn create_variance_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CreateVarianceReportRequest>,
) -> Result<(StatusCode, Json<VarianceReportResponse>), ApiErrorResponse> {
    let fund = load_fund(&state, &id).await?;

    let baseline_id = BaselineId::from_uuid(parse_uuid("baseline_id", &request.baseline_id)?);
    let baseline = state
        .variance_repository
        .find_baseline(&baseline_id)
        .await?
        .ok_or_else(|| {
            ApiErrorResponse::not_found(format!("Baseline {} not found", request.baseline_id))
        })?;

    if baseline.fund_id != fund.fund_id {
        return Err(ApiErrorResponse::validation_error(
            "Validation failed",
            vec![super::error::FieldError::new(
                "baseline_id",
                "baseline belongs to a different fund",
            )],
        ));
    }

    let metrics = current_metrics(&state, &fund).await?;
    let report = VarianceReport::compute(
        VarianceReportId::generate_v7(),
        &baseline,
        &metrics,
        Timestamp::now(),
    );
    state.variance_repository.save_report(&report).await?;

    // Evaluate enabled alert rules against the current metrics.
    let rules = state.variance_repository.list_rules(&fund.fund_id).await?;
    let mut alerts_raised = 0;
    for rule in &rules {
        let value = metrics.value_of(rule.metric);
        if rule.is_triggered_by(value) {
            let alert = Alert::from_rule(AlertId::generate_v7(), rule, value, Timestamp::now());
            state.variance_repository.save_alert(&alert).await?;
            alerts_raised += 1;
            tracing::info!(
                fund_id = %fund.fund_id,
                rule_id = %rule.rule_id,
                metric = %rule.metric,
                %value,
                "Alert raised during variance report generation"
            );
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(VarianceReportResponse::from_report(
            &report,
            Some(alerts_raised),
        )),
    ))
}

/// Lists variance reports for a fund, newest first.
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] when the fund is missing or the repository
/// fails.
pub async fn list_variance_reports(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<VarianceReportResponse>>, ApiErrorResponse> {
    let fund = load_fund(&state, &id).await?;
    let reports = state
        .variance_repository
        .list_reports(&fund.fund_id)
        .await?;

    Ok(Json(
        reports
            .iter()
            .map(|report| VarianceReportResponse::from_report(report, None))
            .collect(),
    ))
}

// =============================================================================
// Alert Rule Handlers
// =============================================================================

/// Creates an alert rule for a fund.
///
/// # Response
///
/// - **201 Created**: Rule created
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] when the fund is missing or persistence
/// fails.
pub async fn create_alert_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CreateAlertRuleRequest>,
) -> Result<(StatusCode, Json<AlertRuleResponse>), ApiErrorResponse> {
    let fund = load_fund(&state, &id).await?;

    let rule = AlertRule {
        rule_id: AlertRuleId::generate_v7(),
        fund_id: fund.fund_id,
        metric: request.metric.into(),
        operator: request.operator.into(),
        threshold: request.threshold,
        severity: request.severity.into(),
        enabled: request.enabled,
        created_at: Timestamp::now(),
    };

    state.variance_repository.save_rule(&rule).await?;

    Ok((StatusCode::CREATED, Json(AlertRuleResponse::from(&rule))))
}

/// Lists alert rules for a fund.
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] when the fund is missing or the repository
/// fails.
pub async fn list_alert_rules(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<AlertRuleResponse>>, ApiErrorResponse> {
    let fund = load_fund(&state, &id).await?;
    let rules = state.variance_repository.list_rules(&fund.fund_id).await?;

    Ok(Json(rules.iter().map(AlertRuleResponse::from).collect()))
}

/// Deletes an alert rule.
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] when the rule does not exist or the
/// repository fails.
pub async fn delete_alert_rule(
    State(state): State<AppState>,
    Path((id, rule_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiErrorResponse> {
    // The fund path segment is validated for consistency with sibling routes.
    let _ = load_fund(&state, &id).await?;
    let rule_id = AlertRuleId::from_uuid(parse_uuid("rule_id", &rule_id)?);

    if state.variance_repository.delete_rule(&rule_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiErrorResponse::not_found("Alert rule not found"))
    }
}

// =============================================================================
// Alert Handlers
// =============================================================================

/// Query parameters for listing alerts.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct AlertListQuery {
    /// Filter by acknowledgement state.
    #[serde(default)]
    pub acknowledged: Option<bool>,
}

/// Lists alerts for a fund, newest first.
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] when the fund is missing or the repository
/// fails.
pub async fn list_alerts(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<AlertListQuery>,
) -> Result<Json<Vec<AlertResponse>>, ApiErrorResponse> {
    let fund = load_fund(&state, &id).await?;
    let alerts = state
        .variance_repository
        .list_alerts(&fund.fund_id, query.acknowledged)
        .await?;

    Ok(Json(alerts.iter().map(AlertResponse::from).collect()))
}

/// Acknowledges an alert. Acknowledging twice is a no-op.
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] when the fund or alert is missing, or the
/// alert belongs to a different fund.
pub async fn acknowledge_alert(
    State(state): State<AppState>,
    Path((id, alert_id)): Path<(String, String)>,
) -> Result<Json<AlertResponse>, ApiErrorResponse> {
    let fund = load_fund(&state, &id).await?;
    let alert_id = AlertId::from_uuid(parse_uuid("alert_id", &alert_id)?);

    let mut alert = state
        .variance_repository
        .find_alert(&alert_id)
        .await?
        .filter(|alert| alert.fund_id == fund.fund_id)
        .ok_or_else(|| ApiErrorResponse::not_found("Alert not found"))?;

    if !alert.acknowledged {
        alert.acknowledged = true;
        state.variance_repository.save_alert(&alert).await?;
    }

    Ok(Json(AlertResponse::from(&alert)))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_alert_list_query_deserializes() {
        let query: AlertListQuery = serde_json::from_str(r#"{"acknowledged":false}"#).unwrap();
        assert_eq!(query.acknowledged, Some(false));

        let query: AlertListQuery = serde_json::from_str("{}").unwrap();
        assert!(query.acknowledged.is_none());
    }
}
