//! Integration tests for the fund, deal, scenario, and variance handlers.
//!
//! Handlers are exercised directly with extractor values against in-memory
//! repositories, mirroring how the router invokes them.

mod common;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use rstest::rstest;
use rust_decimal::Decimal;

use common::{create_and_save_fund, create_test_app_state};
use fund_modeling_api::api::PaginationQuery;
use fund_modeling_api::api::deals::{create_deal, update_deal_stage};
use fund_modeling_api::api::dto::{
    CreateAlertRuleRequest, CreateBaselineRequest, CreateDealRequest, CreateFundRequest,
    CreateScenarioRequest, CreateVarianceReportRequest, MetricKindDto, PipelineStageDto,
    ThresholdOperatorDto, UpdateDealStageRequest, UpdateFundRequest,
};
use fund_modeling_api::api::handlers::{
    calculate_fund, create_fund, delete_fund, get_fund, list_funds, update_fund,
};
use fund_modeling_api::api::portfolio::{create_scenario, run_scenario};
use fund_modeling_api::api::variance::{
    AlertListQuery, acknowledge_alert, create_alert_rule, create_baseline,
    create_variance_report, list_alerts,
};
use fund_modeling_api::domain::PipelineStage;

fn sample_create_fund_request(name: &str) -> CreateFundRequest {
    CreateFundRequest {
        name: name.to_string(),
        vintage_year: 2024,
        fund_size: Decimal::new(100_000_000, 0),
        management_fee_bps: None,
        carried_interest_bps: None,
        expenses: vec![],
        waterfall: vec![],
        allocations: vec![],
        stages: vec![],
    }
}

// =============================================================================
// Fund CRUD Tests
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_create_and_get_fund() {
    let state = create_test_app_state();

    let (status, Json(created)) = create_fund(
        State(state.clone()),
        Json(sample_create_fund_request("Growth Fund I")),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created.name, "Growth Fund I");
    assert_eq!(created.version, 1);

    let Json(fetched) = get_fund(State(state), Path(created.id.clone())).await.unwrap();
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.name, "Growth Fund I");
}

#[rstest]
#[tokio::test]
async fn test_get_fund_not_found() {
    let state = create_test_app_state();
    let error = get_fund(
        State(state),
        Path("00000000-0000-0000-0000-000000000000".to_string()),
    )
    .await
    .unwrap_err();
    assert_eq!(error.status, StatusCode::NOT_FOUND);
}

#[rstest]
#[tokio::test]
async fn test_get_fund_malformed_id() {
    let state = create_test_app_state();
    let error = get_fund(State(state), Path("not-a-uuid".to_string()))
        .await
        .unwrap_err();
    assert_eq!(error.status, StatusCode::BAD_REQUEST);
}

#[rstest]
#[tokio::test]
async fn test_create_fund_validation_failure() {
    let state = create_test_app_state();
    let mut request = sample_create_fund_request("");
    request.vintage_year = 1900;

    let error = create_fund(State(state), Json(request)).await.unwrap_err();
    assert_eq!(error.status, StatusCode::BAD_REQUEST);
    assert_eq!(error.error.code, "VALIDATION_ERROR");
}

#[rstest]
#[tokio::test]
async fn test_update_fund_version_flow() {
    let state = create_test_app_state();
    let fund = create_and_save_fund(&state, "Growth Fund I").await;

    let update = UpdateFundRequest {
        name: Some("Growth Fund I (amended)".to_string()),
        vintage_year: None,
        fund_size: None,
        management_fee_bps: None,
        carried_interest_bps: None,
        expenses: None,
        waterfall: None,
        allocations: None,
        stages: None,
        version: 1,
    };

    let Json(updated) = update_fund(
        State(state.clone()),
        Path(fund.fund_id.to_string()),
        Json(update.clone()),
    )
    .await
    .unwrap();
    assert_eq!(updated.version, 2);
    assert_eq!(updated.name, "Growth Fund I (amended)");

    // Replaying the same stale version conflicts.
    let error = update_fund(
        State(state),
        Path(fund.fund_id.to_string()),
        Json(update),
    )
    .await
    .unwrap_err();
    assert_eq!(error.status, StatusCode::CONFLICT);
    assert_eq!(error.error.code, "VERSION_CONFLICT");
}

#[rstest]
#[tokio::test]
async fn test_delete_fund() {
    let state = create_test_app_state();
    let fund = create_and_save_fund(&state, "Growth Fund I").await;

    let status = delete_fund(State(state.clone()), Path(fund.fund_id.to_string()))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);

    let error = delete_fund(State(state), Path(fund.fund_id.to_string()))
        .await
        .unwrap_err();
    assert_eq!(error.status, StatusCode::NOT_FOUND);
}

#[rstest]
#[tokio::test]
async fn test_list_funds_pagination() {
    let state = create_test_app_state();
    for index in 0..3 {
        create_and_save_fund(&state, &format!("Fund {index}")).await;
    }

    let Json(page) = list_funds(
        State(state),
        Query(PaginationQuery {
            page: Some(0),
            page_size: Some(2),
        }),
    )
    .await
    .unwrap();

    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total, 3);
}

// =============================================================================
// Calculate Tests
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_calculate_fund_returns_projection() {
    let state = create_test_app_state();
    let fund = create_and_save_fund(&state, "Growth Fund I").await;

    let Json(projection) = calculate_fund(
        State(state),
        Json(fund_modeling_api::api::dto::CalculateRequest {
            fund_id: fund.fund_id.to_string(),
            assumptions: None,
        }),
    )
    .await
    .unwrap();

    assert_eq!(projection.fund_id, fund.fund_id.to_string());
    // Default assumptions reserve 40% of a 100M fund.
    assert_eq!(projection.deployable_capital, Decimal::new(60_000_000, 0));
}

#[rstest]
#[tokio::test]
async fn test_calculate_fund_unknown_fund() {
    let state = create_test_app_state();
    let error = calculate_fund(
        State(state),
        Json(fund_modeling_api::api::dto::CalculateRequest {
            fund_id: "00000000-0000-0000-0000-000000000000".to_string(),
            assumptions: None,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(error.status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Deal Pipeline Tests
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_deal_lifecycle() {
    let state = create_test_app_state();
    let fund = create_and_save_fund(&state, "Growth Fund I").await;

    let (status, Json(deal)) = create_deal(
        State(state.clone()),
        Json(CreateDealRequest {
            company_name: "Acme Robotics".to_string(),
            sector: Some("robotics".to_string()),
            fund_id: Some(fund.fund_id.to_string()),
            round_size: Some(Decimal::new(5_000_000, 0)),
            valuation: Some(Decimal::new(25_000_000, 0)),
        }),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(deal.stage, PipelineStageDto::Sourced);

    let Json(moved) = update_deal_stage(
        State(state.clone()),
        Path(deal.id.clone()),
        Json(UpdateDealStageRequest {
            stage: PipelineStageDto::Screening,
            version: 1,
        }),
    )
    .await
    .unwrap();
    assert_eq!(moved.stage, PipelineStageDto::Screening);
    assert_eq!(moved.version, 2);

    // Skipping stages is rejected with a validation error.
    let error = update_deal_stage(
        State(state),
        Path(deal.id),
        Json(UpdateDealStageRequest {
            stage: PipelineStageDto::Closed,
            version: 2,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(error.status, StatusCode::BAD_REQUEST);
}

#[rstest]
#[tokio::test]
async fn test_create_deal_unknown_fund_rejected() {
    let state = create_test_app_state();

    let error = create_deal(
        State(state),
        Json(CreateDealRequest {
            company_name: "Acme Robotics".to_string(),
            sector: None,
            fund_id: Some("00000000-0000-0000-0000-000000000000".to_string()),
            round_size: None,
            valuation: None,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(error.status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Scenario Tests
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_scenario_create_and_run() {
    let state = create_test_app_state();
    let fund = create_and_save_fund(&state, "Growth Fund I").await;

    let (status, Json(scenario)) = create_scenario(
        State(state.clone()),
        Json(CreateScenarioRequest {
            fund_id: fund.fund_id.to_string(),
            name: "Base Case".to_string(),
            assumptions: None,
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);

    let Json(projection) = run_scenario(State(state), Path(scenario.id))
        .await
        .unwrap();
    assert_eq!(projection.fund_id, fund.fund_id.to_string());
}

// =============================================================================
// Variance Tests
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_variance_report_raises_alert() {
    let state = create_test_app_state();
    let fund = create_and_save_fund(&state, "Growth Fund I").await;
    let fund_path = fund.fund_id.to_string();

    // Capture a baseline before any deals close.
    let (status, Json(baseline)) = create_baseline(
        State(state.clone()),
        Path(fund_path.clone()),
        Json(CreateBaselineRequest {
            name: "Initial".to_string(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(baseline.metrics.deployed, Decimal::ZERO);

    // A rule that fires as soon as any capital is deployed.
    let (_, Json(_rule)) = create_alert_rule(
        State(state.clone()),
        Path(fund_path.clone()),
        Json(CreateAlertRuleRequest {
            metric: MetricKindDto::Deployed,
            operator: ThresholdOperatorDto::Above,
            threshold: Decimal::ZERO,
            severity: fund_modeling_api::api::dto::AlertSeverityDto::Warning,
            enabled: true,
        }),
    )
    .await
    .unwrap();

    // Close a deal so deployed capital becomes positive.
    let (_, Json(deal)) = create_deal(
        State(state.clone()),
        Json(CreateDealRequest {
            company_name: "Acme Robotics".to_string(),
            sector: None,
            fund_id: Some(fund_path.clone()),
            round_size: Some(Decimal::new(5_000_000, 0)),
            valuation: None,
        }),
    )
    .await
    .unwrap();

    let mut version = 1;
    for stage in [
        PipelineStageDto::Screening,
        PipelineStageDto::DueDiligence,
        PipelineStageDto::TermSheet,
        PipelineStageDto::Closed,
    ] {
        update_deal_stage(
            State(state.clone()),
            Path(deal.id.clone()),
            Json(UpdateDealStageRequest { stage, version }),
        )
        .await
        .unwrap();
        version += 1;
    }

    // Generate the report: deployed delta is positive and the rule fires.
    let (status, Json(report)) = create_variance_report(
        State(state.clone()),
        Path(fund_path.clone()),
        Json(CreateVarianceReportRequest {
            baseline_id: baseline.id,
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(report.alerts_raised, Some(1));

    let deployed_delta = report
        .deltas
        .iter()
        .find(|delta| delta.metric == MetricKindDto::Deployed)
        .unwrap();
    assert_eq!(deployed_delta.delta, Decimal::new(5_000_000, 0));

    // The alert is listed as unacknowledged, then acknowledged.
    let Json(alerts) = list_alerts(
        State(state.clone()),
        Path(fund_path.clone()),
        Query(AlertListQuery {
            acknowledged: Some(false),
        }),
    )
    .await
    .unwrap();
    assert_eq!(alerts.len(), 1);

    let Json(acknowledged) = acknowledge_alert(
        State(state.clone()),
        Path((fund_path.clone(), alerts[0].id.clone())),
    )
    .await
    .unwrap();
    assert!(acknowledged.acknowledged);

    let Json(open) = list_alerts(
        State(state),
        Path(fund_path),
        Query(AlertListQuery {
            acknowledged: Some(false),
        }),
    )
    .await
    .unwrap();
    assert!(open.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_variance_report_rejects_foreign_baseline() {
    let state = create_test_app_state();
    let fund_a = create_and_save_fund(&state, "Fund A").await;
    let fund_b = create_and_save_fund(&state, "Fund B").await;

    let (_, Json(baseline)) = create_baseline(
        State(state.clone()),
        Path(fund_a.fund_id.to_string()),
        Json(CreateBaselineRequest {
            name: "A initial".to_string(),
        }),
    )
    .await
    .unwrap();

    let error = create_variance_report(
        State(state),
        Path(fund_b.fund_id.to_string()),
        Json(CreateVarianceReportRequest {
            baseline_id: baseline.id,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(error.status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Stage Transition Matrix
// =============================================================================

#[rstest]
#[case(PipelineStage::Sourced, PipelineStage::Screening, true)]
#[case(PipelineStage::Sourced, PipelineStage::Passed, true)]
#[case(PipelineStage::Sourced, PipelineStage::TermSheet, false)]
#[case(PipelineStage::Closed, PipelineStage::Passed, false)]
fn test_transition_matrix(
    #[case] from: PipelineStage,
    #[case] to: PipelineStage,
    #[case] allowed: bool,
) {
    assert_eq!(from.validate_transition(to).is_ok(), allowed);
}
