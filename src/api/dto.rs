//! Data Transfer Objects for API requests and responses.
//!
//! DTOs are separate from domain models, providing a clean API contract.
//! Validation happens here, at the boundary, returning field-level errors
//! that flatten into the 400 response body.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::{FieldError, ValidationError};
use crate::domain::{
    Alert, AlertRule, AlertSeverity, Baseline, CapitalAllocation, DealOpportunity, Fund,
    FundExpense, InvestmentStage, MetricDelta, MetricKind, MetricSet, PipelineStage,
    ProjectionResult, Scenario, ScenarioAssumptions, ThresholdOperator, VarianceReport,
    WaterfallTier, WaterfallTierKind, fund::BPS_SCALE,
};

// =============================================================================
// Enum Mirrors
// =============================================================================

/// API mirror of `PipelineStage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStageDto {
    /// Sourced.
    Sourced,
    /// Screening.
    Screening,
    /// Due diligence.
    DueDiligence,
    /// Term sheet.
    TermSheet,
    /// Closed.
    Closed,
    /// Passed.
    Passed,
}

impl From<PipelineStageDto> for PipelineStage {
    fn from(dto: PipelineStageDto) -> Self {
        match dto {
            PipelineStageDto::Sourced => Self::Sourced,
            PipelineStageDto::Screening => Self::Screening,
            PipelineStageDto::DueDiligence => Self::DueDiligence,
            PipelineStageDto::TermSheet => Self::TermSheet,
            PipelineStageDto::Closed => Self::Closed,
            PipelineStageDto::Passed => Self::Passed,
        }
    }
}

impl From<PipelineStage> for PipelineStageDto {
    fn from(stage: PipelineStage) -> Self {
        match stage {
            PipelineStage::Sourced => Self::Sourced,
            PipelineStage::Screening => Self::Screening,
            PipelineStage::DueDiligence => Self::DueDiligence,
            PipelineStage::TermSheet => Self::TermSheet,
            PipelineStage::Closed => Self::Closed,
            PipelineStage::Passed => Self::Passed,
        }
    }
}

/// API mirror of `WaterfallTierKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaterfallTierKindDto {
    /// Return of capital.
    ReturnOfCapital,
    /// Preferred return.
    PreferredReturn,
    /// GP catch-up.
    GpCatchUp,
    /// Carried interest.
    CarriedInterest,
}

impl From<WaterfallTierKindDto> for WaterfallTierKind {
    fn from(dto: WaterfallTierKindDto) -> Self {
        match dto {
            WaterfallTierKindDto::ReturnOfCapital => Self::ReturnOfCapital,
            WaterfallTierKindDto::PreferredReturn => Self::PreferredReturn,
            WaterfallTierKindDto::GpCatchUp => Self::GpCatchUp,
            WaterfallTierKindDto::CarriedInterest => Self::CarriedInterest,
        }
    }
}

impl From<WaterfallTierKind> for WaterfallTierKindDto {
    fn from(kind: WaterfallTierKind) -> Self {
        match kind {
            WaterfallTierKind::ReturnOfCapital => Self::ReturnOfCapital,
            WaterfallTierKind::PreferredReturn => Self::PreferredReturn,
            WaterfallTierKind::GpCatchUp => Self::GpCatchUp,
            WaterfallTierKind::CarriedInterest => Self::CarriedInterest,
        }
    }
}

/// API mirror of `MetricKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKindDto {
    /// Committed capital.
    Committed,
    /// Deployed capital.
    Deployed,
    /// MOIC.
    Moic,
    /// IRR in basis points.
    IrrBps,
}

impl From<MetricKindDto> for MetricKind {
    fn from(dto: MetricKindDto) -> Self {
        match dto {
            MetricKindDto::Committed => Self::Committed,
            MetricKindDto::Deployed => Self::Deployed,
            MetricKindDto::Moic => Self::Moic,
            MetricKindDto::IrrBps => Self::IrrBps,
        }
    }
}

impl From<MetricKind> for MetricKindDto {
    fn from(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Committed => Self::Committed,
            MetricKind::Deployed => Self::Deployed,
            MetricKind::Moic => Self::Moic,
            MetricKind::IrrBps => Self::IrrBps,
        }
    }
}

/// API mirror of `ThresholdOperator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdOperatorDto {
    /// Trigger above the threshold.
    Above,
    /// Trigger below the threshold.
    Below,
}

impl From<ThresholdOperatorDto> for ThresholdOperator {
    fn from(dto: ThresholdOperatorDto) -> Self {
        match dto {
            ThresholdOperatorDto::Above => Self::Above,
            ThresholdOperatorDto::Below => Self::Below,
        }
    }
}

impl From<ThresholdOperator> for ThresholdOperatorDto {
    fn from(operator: ThresholdOperator) -> Self {
        match operator {
            ThresholdOperator::Above => Self::Above,
            ThresholdOperator::Below => Self::Below,
        }
    }
}

/// API mirror of `AlertSeverity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverityDto {
    /// Informational.
    Info,
    /// Needs attention.
    Warning,
    /// Requires action.
    Critical,
}

impl From<AlertSeverityDto> for AlertSeverity {
    fn from(dto: AlertSeverityDto) -> Self {
        match dto {
            AlertSeverityDto::Info => Self::Info,
            AlertSeverityDto::Warning => Self::Warning,
            AlertSeverityDto::Critical => Self::Critical,
        }
    }
}

impl From<AlertSeverity> for AlertSeverityDto {
    fn from(severity: AlertSeverity) -> Self {
        match severity {
            AlertSeverity::Info => Self::Info,
            AlertSeverity::Warning => Self::Warning,
            AlertSeverity::Critical => Self::Critical,
        }
    }
}

// =============================================================================
// Fund DTOs
// =============================================================================

/// A fund expense in API form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundExpenseDto {
    /// Expense category.
    pub category: String,
    /// Annual amount.
    pub annual_amount: Decimal,
    /// First applicable fund-life year.
    pub start_year: u16,
    /// Last applicable fund-life year.
    pub end_year: u16,
}

impl From<&FundExpense> for FundExpenseDto {
    fn from(expense: &FundExpense) -> Self {
        Self {
            category: expense.category.clone(),
            annual_amount: expense.annual_amount,
            start_year: expense.start_year,
            end_year: expense.end_year,
        }
    }
}

/// A waterfall tier in API form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WaterfallTierDto {
    /// Tier kind.
    pub tier: WaterfallTierKindDto,
    /// Rate in basis points.
    pub rate_bps: u32,
}

impl From<&WaterfallTier> for WaterfallTierDto {
    fn from(tier: &WaterfallTier) -> Self {
        Self {
            tier: tier.tier.into(),
            rate_bps: tier.rate_bps,
        }
    }
}

/// A capital allocation in API form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalAllocationDto {
    /// Target stage name.
    pub stage_name: String,
    /// Share in basis points.
    pub percentage_bps: u32,
}

impl From<&CapitalAllocation> for CapitalAllocationDto {
    fn from(allocation: &CapitalAllocation) -> Self {
        Self {
            stage_name: allocation.stage_name.clone(),
            percentage_bps: allocation.percentage_bps,
        }
    }
}

/// An investment stage in API form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentStageDto {
    /// Stage name.
    pub name: String,
    /// Graduation rate in basis points.
    pub graduation_rate_bps: u32,
    /// Exit rate in basis points.
    pub exit_rate_bps: u32,
}

impl From<&InvestmentStage> for InvestmentStageDto {
    fn from(stage: &InvestmentStage) -> Self {
        Self {
            name: stage.name.clone(),
            graduation_rate_bps: stage.graduation_rate_bps,
            exit_rate_bps: stage.exit_rate_bps,
        }
    }
}

/// Request DTO for creating a fund.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateFundRequest {
    /// Fund name.
    pub name: String,
    /// Vintage year.
    pub vintage_year: u16,
    /// Committed capital.
    pub fund_size: Decimal,
    /// Management fee in basis points (defaults to 200).
    #[serde(default)]
    pub management_fee_bps: Option<u32>,
    /// Carried interest in basis points (defaults to 2000).
    #[serde(default)]
    pub carried_interest_bps: Option<u32>,
    /// Fund expenses.
    #[serde(default)]
    pub expenses: Vec<FundExpenseDto>,
    /// Waterfall tiers.
    #[serde(default)]
    pub waterfall: Vec<WaterfallTierDto>,
    /// Capital allocations.
    #[serde(default)]
    pub allocations: Vec<CapitalAllocationDto>,
    /// Investment stages.
    #[serde(default)]
    pub stages: Vec<InvestmentStageDto>,
}

/// Request DTO for updating a fund.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateFundRequest {
    /// New name.
    #[serde(default)]
    pub name: Option<String>,
    /// New vintage year.
    #[serde(default)]
    pub vintage_year: Option<u16>,
    /// New fund size.
    #[serde(default)]
    pub fund_size: Option<Decimal>,
    /// New management fee.
    #[serde(default)]
    pub management_fee_bps: Option<u32>,
    /// New carried interest.
    #[serde(default)]
    pub carried_interest_bps: Option<u32>,
    /// Replacement expenses.
    #[serde(default)]
    pub expenses: Option<Vec<FundExpenseDto>>,
    /// Replacement waterfall.
    #[serde(default)]
    pub waterfall: Option<Vec<WaterfallTierDto>>,
    /// Replacement allocations.
    #[serde(default)]
    pub allocations: Option<Vec<CapitalAllocationDto>>,
    /// Replacement stages.
    #[serde(default)]
    pub stages: Option<Vec<InvestmentStageDto>>,
    /// Expected version for optimistic locking.
    pub version: u64,
}

/// Response DTO for a fund.
#[derive(Debug, Clone, Serialize)]
pub struct FundResponse {
    /// Fund ID.
    pub id: String,
    /// Fund name.
    pub name: String,
    /// Vintage year.
    pub vintage_year: u16,
    /// Committed capital.
    pub fund_size: Decimal,
    /// Management fee in basis points.
    pub management_fee_bps: u32,
    /// Carried interest in basis points.
    pub carried_interest_bps: u32,
    /// Fund expenses.
    pub expenses: Vec<FundExpenseDto>,
    /// Waterfall tiers.
    pub waterfall: Vec<WaterfallTierDto>,
    /// Capital allocations.
    pub allocations: Vec<CapitalAllocationDto>,
    /// Investment stages.
    pub stages: Vec<InvestmentStageDto>,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
    /// Current version.
    pub version: u64,
}

impl From<&Fund> for FundResponse {
    fn from(fund: &Fund) -> Self {
        Self {
            id: fund.fund_id.to_string(),
            name: fund.name.clone(),
            vintage_year: fund.vintage_year,
            fund_size: fund.fund_size,
            management_fee_bps: fund.management_fee_bps,
            carried_interest_bps: fund.carried_interest_bps,
            expenses: fund.expenses.iter().map(FundExpenseDto::from).collect(),
            waterfall: fund.waterfall.iter().map(WaterfallTierDto::from).collect(),
            allocations: fund
                .allocations
                .iter()
                .map(CapitalAllocationDto::from)
                .collect(),
            stages: fund.stages.iter().map(InvestmentStageDto::from).collect(),
            created_at: fund.created_at.to_string(),
            updated_at: fund.updated_at.to_string(),
            version: fund.version,
        }
    }
}

// =============================================================================
// Deal DTOs
// =============================================================================

/// Request DTO for creating a deal.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDealRequest {
    /// Target company name.
    pub company_name: String,
    /// Sector label.
    #[serde(default)]
    pub sector: Option<String>,
    /// Fund association.
    #[serde(default)]
    pub fund_id: Option<String>,
    /// Round size.
    #[serde(default)]
    pub round_size: Option<Decimal>,
    /// Pre-money valuation.
    #[serde(default)]
    pub valuation: Option<Decimal>,
}

/// Request DTO for transitioning a deal's pipeline stage.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateDealStageRequest {
    /// Target stage.
    pub stage: PipelineStageDto,
    /// Expected version for optimistic locking.
    pub version: u64,
}

/// Response DTO for a deal.
#[derive(Debug, Clone, Serialize)]
pub struct DealResponse {
    /// Deal ID.
    pub id: String,
    /// Fund ID, if associated.
    pub fund_id: Option<String>,
    /// Company name.
    pub company_name: String,
    /// Sector label.
    pub sector: Option<String>,
    /// Current stage.
    pub stage: PipelineStageDto,
    /// Round size.
    pub round_size: Option<Decimal>,
    /// Pre-money valuation.
    pub valuation: Option<Decimal>,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
    /// Current version.
    pub version: u64,
}

impl From<&DealOpportunity> for DealResponse {
    fn from(deal: &DealOpportunity) -> Self {
        Self {
            id: deal.deal_id.to_string(),
            fund_id: deal.fund_id.map(|id| id.to_string()),
            company_name: deal.company_name.clone(),
            sector: deal.sector.clone(),
            stage: deal.stage.into(),
            round_size: deal.round_size,
            valuation: deal.valuation,
            created_at: deal.created_at.to_string(),
            updated_at: deal.updated_at.to_string(),
            version: deal.version,
        }
    }
}

// =============================================================================
// Scenario DTOs
// =============================================================================

/// Scenario assumptions in API form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScenarioAssumptionsDto {
    /// Deployment years.
    pub deployment_years: u8,
    /// Reserve ratio in basis points.
    pub reserve_ratio_bps: u32,
    /// Follow-on multiple.
    pub follow_on_multiple: Decimal,
}

impl From<&ScenarioAssumptions> for ScenarioAssumptionsDto {
    fn from(assumptions: &ScenarioAssumptions) -> Self {
        Self {
            deployment_years: assumptions.deployment_years,
            reserve_ratio_bps: assumptions.reserve_ratio_bps,
            follow_on_multiple: assumptions.follow_on_multiple,
        }
    }
}

/// Request DTO for creating a scenario.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateScenarioRequest {
    /// Fund the scenario models.
    pub fund_id: String,
    /// Display name.
    pub name: String,
    /// Assumptions (defaults apply when omitted).
    #[serde(default)]
    pub assumptions: Option<ScenarioAssumptionsDto>,
}

/// Request DTO for updating a scenario.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateScenarioRequest {
    /// New name.
    #[serde(default)]
    pub name: Option<String>,
    /// New assumptions.
    #[serde(default)]
    pub assumptions: Option<ScenarioAssumptionsDto>,
    /// Expected version for optimistic locking.
    pub version: u64,
}

/// Response DTO for a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResponse {
    /// Scenario ID.
    pub id: String,
    /// Fund ID.
    pub fund_id: String,
    /// Display name.
    pub name: String,
    /// Assumptions.
    pub assumptions: ScenarioAssumptionsDto,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
    /// Current version.
    pub version: u64,
}

impl From<&Scenario> for ScenarioResponse {
    fn from(scenario: &Scenario) -> Self {
        Self {
            id: scenario.scenario_id.to_string(),
            fund_id: scenario.fund_id.to_string(),
            name: scenario.name.clone(),
            assumptions: (&scenario.assumptions).into(),
            created_at: scenario.created_at.to_string(),
            updated_at: scenario.updated_at.to_string(),
            version: scenario.version,
        }
    }
}

/// Request DTO for `/api/funds/calculate`.
#[derive(Debug, Clone, Deserialize)]
pub struct CalculateRequest {
    /// Fund to project.
    pub fund_id: String,
    /// Assumptions (defaults apply when omitted).
    #[serde(default)]
    pub assumptions: Option<ScenarioAssumptionsDto>,
}

/// Response DTO for a projection run.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectionResponse {
    /// Fund ID.
    pub fund_id: String,
    /// Projected MOIC.
    pub projected_moic: Decimal,
    /// Projected IRR in basis points.
    pub projected_irr_bps: i32,
    /// Projected total value.
    pub projected_total_value: Decimal,
    /// Deployable capital under the assumptions.
    pub deployable_capital: Decimal,
    /// Computation timestamp.
    pub computed_at: String,
}

impl From<&ProjectionResult> for ProjectionResponse {
    fn from(result: &ProjectionResult) -> Self {
        Self {
            fund_id: result.fund_id.to_string(),
            projected_moic: result.projected_moic,
            projected_irr_bps: result.projected_irr_bps,
            projected_total_value: result.projected_total_value,
            deployable_capital: result.deployable_capital,
            computed_at: result.computed_at.to_string(),
        }
    }
}

// =============================================================================
// Variance DTOs
// =============================================================================

/// Metric values in API form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricSetDto {
    /// Committed capital.
    pub committed: Decimal,
    /// Deployed capital.
    pub deployed: Decimal,
    /// MOIC.
    pub moic: Decimal,
    /// IRR in basis points.
    pub irr_bps: i32,
}

impl From<&MetricSet> for MetricSetDto {
    fn from(metrics: &MetricSet) -> Self {
        Self {
            committed: metrics.committed,
            deployed: metrics.deployed,
            moic: metrics.moic,
            irr_bps: metrics.irr_bps,
        }
    }
}

/// Request DTO for capturing a baseline.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBaselineRequest {
    /// Baseline name.
    pub name: String,
}

/// Response DTO for a baseline.
#[derive(Debug, Clone, Serialize)]
pub struct BaselineResponse {
    /// Baseline ID.
    pub id: String,
    /// Fund ID.
    pub fund_id: String,
    /// Baseline name.
    pub name: String,
    /// Captured metrics.
    pub metrics: MetricSetDto,
    /// Capture timestamp.
    pub captured_at: String,
}

impl From<&Baseline> for BaselineResponse {
    fn from(baseline: &Baseline) -> Self {
        Self {
            id: baseline.baseline_id.to_string(),
            fund_id: baseline.fund_id.to_string(),
            name: baseline.name.clone(),
            metrics: (&baseline.metrics).into(),
            captured_at: baseline.captured_at.to_string(),
        }
    }
}

/// Request DTO for generating a variance report.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateVarianceReportRequest {
    /// Baseline to compare against.
    pub baseline_id: String,
}

/// Per-metric delta in API form.
#[derive(Debug, Clone, Serialize)]
pub struct MetricDeltaDto {
    /// Metric.
    pub metric: MetricKindDto,
    /// Baseline value.
    pub baseline_value: Decimal,
    /// Current value.
    pub current_value: Decimal,
    /// Delta.
    pub delta: Decimal,
}

impl From<&MetricDelta> for MetricDeltaDto {
    fn from(delta: &MetricDelta) -> Self {
        Self {
            metric: delta.metric.into(),
            baseline_value: delta.baseline_value,
            current_value: delta.current_value,
            delta: delta.delta,
        }
    }
}

/// Response DTO for a variance report.
#[derive(Debug, Clone, Serialize)]
pub struct VarianceReportResponse {
    /// Report ID.
    pub id: String,
    /// Fund ID.
    pub fund_id: String,
    /// Baseline ID.
    pub baseline_id: String,
    /// Per-metric deltas.
    pub deltas: Vec<MetricDeltaDto>,
    /// Alerts raised during generation; absent when listing stored reports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alerts_raised: Option<usize>,
    /// Generation timestamp.
    pub generated_at: String,
}

impl VarianceReportResponse {
    /// Builds a response from a report and the count of alerts it raised.
    #[must_use]
    pub fn from_report(report: &VarianceReport, alerts_raised: Option<usize>) -> Self {
        Self {
            id: report.report_id.to_string(),
            fund_id: report.fund_id.to_string(),
            baseline_id: report.baseline_id.to_string(),
            deltas: report.deltas.iter().map(MetricDeltaDto::from).collect(),
            alerts_raised,
            generated_at: report.generated_at.to_string(),
        }
    }
}

/// Request DTO for creating an alert rule.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAlertRuleRequest {
    /// Metric to watch.
    pub metric: MetricKindDto,
    /// Comparison direction.
    pub operator: ThresholdOperatorDto,
    /// Threshold value.
    pub threshold: Decimal,
    /// Alert severity.
    pub severity: AlertSeverityDto,
    /// Whether the rule is active (defaults to true).
    #[serde(default = "default_true")]
    pub enabled: bool,
}

const fn default_true() -> bool {
    true
}

/// Response DTO for an alert rule.
#[derive(Debug, Clone, Serialize)]
pub struct AlertRuleResponse {
    /// Rule ID.
    pub id: String,
    /// Fund ID.
    pub fund_id: String,
    /// Watched metric.
    pub metric: MetricKindDto,
    /// Comparison direction.
    pub operator: ThresholdOperatorDto,
    /// Threshold value.
    pub threshold: Decimal,
    /// Severity.
    pub severity: AlertSeverityDto,
    /// Whether the rule is active.
    pub enabled: bool,
    /// Creation timestamp.
    pub created_at: String,
}

impl From<&AlertRule> for AlertRuleResponse {
    fn from(rule: &AlertRule) -> Self {
        Self {
            id: rule.rule_id.to_string(),
            fund_id: rule.fund_id.to_string(),
            metric: rule.metric.into(),
            operator: rule.operator.into(),
            threshold: rule.threshold,
            severity: rule.severity.into(),
            enabled: rule.enabled,
            created_at: rule.created_at.to_string(),
        }
    }
}

/// Response DTO for an alert.
#[derive(Debug, Clone, Serialize)]
pub struct AlertResponse {
    /// Alert ID.
    pub id: String,
    /// Rule ID.
    pub rule_id: String,
    /// Fund ID.
    pub fund_id: String,
    /// Triggering metric.
    pub metric: MetricKindDto,
    /// Observed value.
    pub metric_value: Decimal,
    /// Severity.
    pub severity: AlertSeverityDto,
    /// Trigger timestamp.
    pub triggered_at: String,
    /// Whether the alert was acknowledged.
    pub acknowledged: bool,
}

impl From<&Alert> for AlertResponse {
    fn from(alert: &Alert) -> Self {
        Self {
            id: alert.alert_id.to_string(),
            rule_id: alert.rule_id.to_string(),
            fund_id: alert.fund_id.to_string(),
            metric: alert.metric.into(),
            metric_value: alert.metric_value,
            severity: alert.severity.into(),
            triggered_at: alert.triggered_at.to_string(),
            acknowledged: alert.acknowledged,
        }
    }
}

// =============================================================================
// List Response
// =============================================================================

/// Generic paginated list response.
#[derive(Debug, Clone, Serialize)]
pub struct ListResponse<T> {
    /// Items in the current page.
    pub items: Vec<T>,
    /// Total item count.
    pub total: u64,
    /// Current page (0-indexed).
    pub page: u32,
    /// Page size.
    pub page_size: u32,
}

// =============================================================================
// Validation
// =============================================================================

/// Validates a display name: trimmed, non-empty, at most 200 characters.
pub fn validate_name(field: &str, name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::single(field, "must not be empty"));
    }
    if trimmed.chars().count() > 200 {
        return Err(ValidationError::single(
            field,
            "must be at most 200 characters",
        ));
    }
    Ok(trimmed.to_string())
}

/// Validates a vintage year.
pub fn validate_vintage_year(year: u16) -> Result<u16, ValidationError> {
    if !(1980..=2100).contains(&year) {
        return Err(ValidationError::single(
            "vintage_year",
            "must be between 1980 and 2100",
        ));
    }
    Ok(year)
}

/// Validates a fund size.
pub fn validate_fund_size(size: Decimal) -> Result<Decimal, ValidationError> {
    if size <= Decimal::ZERO {
        return Err(ValidationError::single("fund_size", "must be positive"));
    }
    Ok(size)
}

/// Validates a basis-point ratio (0..=10000).
pub fn validate_bps(field: &str, value: u32) -> Result<u32, ValidationError> {
    if value > BPS_SCALE {
        return Err(ValidationError::single(
            field,
            "must be at most 10000 basis points",
        ));
    }
    Ok(value)
}

/// Validates fund expenses.
pub fn validate_expenses(
    expenses: &[FundExpenseDto],
) -> Result<Vec<FundExpense>, ValidationError> {
    let mut errors = Vec::new();
    let mut validated = Vec::with_capacity(expenses.len());

    for (index, dto) in expenses.iter().enumerate() {
        let field = format!("expenses[{index}]");
        if dto.category.trim().is_empty() {
            errors.push(FieldError::new(
                format!("{field}.category"),
                "must not be empty",
            ));
        }
        if dto.annual_amount < Decimal::ZERO {
            errors.push(FieldError::new(
                format!("{field}.annual_amount"),
                "must not be negative",
            ));
        }
        let expense = FundExpense {
            category: dto.category.trim().to_string(),
            annual_amount: dto.annual_amount,
            start_year: dto.start_year,
            end_year: dto.end_year,
        };
        if !expense.span_is_valid() {
            errors.push(FieldError::new(
                format!("{field}.start_year"),
                "year span must satisfy 1 <= start_year <= end_year <= 30",
            ));
        }
        validated.push(expense);
    }

    if errors.is_empty() {
        Ok(validated)
    } else {
        Err(ValidationError::new(errors))
    }
}

/// Validates waterfall tiers: rates in range, at most one tier per kind.
pub fn validate_waterfall(
    tiers: &[WaterfallTierDto],
) -> Result<Vec<WaterfallTier>, ValidationError> {
    let mut errors = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut validated = Vec::with_capacity(tiers.len());

    for (index, dto) in tiers.iter().enumerate() {
        let field = format!("waterfall[{index}]");
        if dto.rate_bps > BPS_SCALE {
            errors.push(FieldError::new(
                format!("{field}.rate_bps"),
                "must be at most 10000 basis points",
            ));
        }
        if !seen.insert(dto.tier) {
            errors.push(FieldError::new(
                format!("{field}.tier"),
                "duplicate waterfall tier",
            ));
        }
        validated.push(WaterfallTier {
            tier: dto.tier.into(),
            rate_bps: dto.rate_bps,
        });
    }

    if errors.is_empty() {
        Ok(validated)
    } else {
        Err(ValidationError::new(errors))
    }
}

/// Validates capital allocations: each share in range, total at most 100%.
pub fn validate_allocations(
    allocations: &[CapitalAllocationDto],
) -> Result<Vec<CapitalAllocation>, ValidationError> {
    let mut errors = Vec::new();
    let mut validated = Vec::with_capacity(allocations.len());
    let mut total: u64 = 0;

    for (index, dto) in allocations.iter().enumerate() {
        let field = format!("allocations[{index}]");
        if dto.stage_name.trim().is_empty() {
            errors.push(FieldError::new(
                format!("{field}.stage_name"),
                "must not be empty",
            ));
        }
        if dto.percentage_bps > BPS_SCALE {
            errors.push(FieldError::new(
                format!("{field}.percentage_bps"),
                "must be at most 10000 basis points",
            ));
        }
        total += u64::from(dto.percentage_bps);
        validated.push(CapitalAllocation {
            stage_name: dto.stage_name.trim().to_string(),
            percentage_bps: dto.percentage_bps,
        });
    }

    if total > u64::from(BPS_SCALE) {
        errors.push(FieldError::new(
            "allocations",
            "total allocation must not exceed 10000 basis points",
        ));
    }

    if errors.is_empty() {
        Ok(validated)
    } else {
        Err(ValidationError::new(errors))
    }
}

/// Validates investment stages.
pub fn validate_stages(
    stages: &[InvestmentStageDto],
) -> Result<Vec<InvestmentStage>, ValidationError> {
    let mut errors = Vec::new();
    let mut validated = Vec::with_capacity(stages.len());

    for (index, dto) in stages.iter().enumerate() {
        let field = format!("stages[{index}]");
        if dto.name.trim().is_empty() {
            errors.push(FieldError::new(
                format!("{field}.name"),
                "must not be empty",
            ));
        }
        let stage = InvestmentStage {
            name: dto.name.trim().to_string(),
            graduation_rate_bps: dto.graduation_rate_bps,
            exit_rate_bps: dto.exit_rate_bps,
        };
        if !stage.rates_are_valid() {
            errors.push(FieldError::new(
                format!("{field}.graduation_rate_bps"),
                "graduation and exit rates must each be at most 10000 and sum to at most 10000",
            ));
        }
        validated.push(stage);
    }

    if errors.is_empty() {
        Ok(validated)
    } else {
        Err(ValidationError::new(errors))
    }
}

/// Validates scenario assumptions.
pub fn validate_assumptions(
    dto: &ScenarioAssumptionsDto,
) -> Result<ScenarioAssumptions, ValidationError> {
    let mut errors = Vec::new();

    if !(1..=15).contains(&dto.deployment_years) {
        errors.push(FieldError::new(
            "assumptions.deployment_years",
            "must be between 1 and 15",
        ));
    }
    if dto.reserve_ratio_bps > BPS_SCALE {
        errors.push(FieldError::new(
            "assumptions.reserve_ratio_bps",
            "must be at most 10000 basis points",
        ));
    }
    if dto.follow_on_multiple < Decimal::ZERO {
        errors.push(FieldError::new(
            "assumptions.follow_on_multiple",
            "must not be negative",
        ));
    }

    if errors.is_empty() {
        Ok(ScenarioAssumptions {
            deployment_years: dto.deployment_years,
            reserve_ratio_bps: dto.reserve_ratio_bps,
            follow_on_multiple: dto.follow_on_multiple,
        })
    } else {
        Err(ValidationError::new(errors))
    }
}

/// Validates an optional non-negative monetary amount.
pub fn validate_optional_amount(
    field: &str,
    amount: Option<Decimal>,
) -> Result<Option<Decimal>, ValidationError> {
    match amount {
        Some(value) if value < Decimal::ZERO => {
            Err(ValidationError::single(field, "must not be negative"))
        }
        other => Ok(other),
    }
}

/// Parses a UUID path or body parameter.
pub fn parse_uuid(field: &str, raw: &str) -> Result<uuid::Uuid, ValidationError> {
    raw.parse()
        .map_err(|_| ValidationError::single(field, "must be a valid UUID"))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // -------------------------------------------------------------------------
    // Name / Scalar Validation Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_validate_name_trims() {
        let result = validate_name("name", "  Growth Fund I  ");
        assert_eq!(result.unwrap(), "Growth Fund I");
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn test_validate_name_rejects_empty(#[case] input: &str) {
        assert!(validate_name("name", input).is_err());
    }

    #[rstest]
    fn test_validate_name_rejects_oversized() {
        let oversized = "x".repeat(201);
        assert!(validate_name("name", &oversized).is_err());
    }

    #[rstest]
    #[case(1980, true)]
    #[case(2024, true)]
    #[case(2100, true)]
    #[case(1979, false)]
    #[case(2101, false)]
    fn test_validate_vintage_year(#[case] year: u16, #[case] valid: bool) {
        assert_eq!(validate_vintage_year(year).is_ok(), valid);
    }

    #[rstest]
    fn test_validate_fund_size() {
        assert!(validate_fund_size(Decimal::new(1, 0)).is_ok());
        assert!(validate_fund_size(Decimal::ZERO).is_err());
        assert!(validate_fund_size(Decimal::new(-1, 0)).is_err());
    }

    #[rstest]
    #[case(0, true)]
    #[case(10_000, true)]
    #[case(10_001, false)]
    fn test_validate_bps(#[case] value: u32, #[case] valid: bool) {
        assert_eq!(validate_bps("management_fee_bps", value).is_ok(), valid);
    }

    // -------------------------------------------------------------------------
    // Collection Validation Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_validate_expenses_valid() {
        let dtos = vec![FundExpenseDto {
            category: " legal ".to_string(),
            annual_amount: Decimal::new(50_000, 0),
            start_year: 1,
            end_year: 10,
        }];
        let expenses = validate_expenses(&dtos).unwrap();
        assert_eq!(expenses[0].category, "legal");
    }

    #[rstest]
    fn test_validate_expenses_collects_all_errors() {
        let dtos = vec![FundExpenseDto {
            category: String::new(),
            annual_amount: Decimal::new(-1, 0),
            start_year: 10,
            end_year: 5,
        }];
        let error = validate_expenses(&dtos).unwrap_err();
        assert_eq!(error.errors.len(), 3);
    }

    #[rstest]
    fn test_validate_waterfall_rejects_duplicate_tier() {
        let dtos = vec![
            WaterfallTierDto {
                tier: WaterfallTierKindDto::PreferredReturn,
                rate_bps: 800,
            },
            WaterfallTierDto {
                tier: WaterfallTierKindDto::PreferredReturn,
                rate_bps: 900,
            },
        ];
        let error = validate_waterfall(&dtos).unwrap_err();
        assert!(error.errors.iter().any(|e| e.message.contains("duplicate")));
    }

    #[rstest]
    fn test_validate_allocations_sum_cap() {
        let dtos = vec![
            CapitalAllocationDto {
                stage_name: "seed".to_string(),
                percentage_bps: 6_000,
            },
            CapitalAllocationDto {
                stage_name: "series_a".to_string(),
                percentage_bps: 5_000,
            },
        ];
        let error = validate_allocations(&dtos).unwrap_err();
        assert!(
            error
                .errors
                .iter()
                .any(|e| e.field == "allocations" && e.message.contains("total"))
        );
    }

    #[rstest]
    fn test_validate_allocations_exact_full_allocation_ok() {
        let dtos = vec![
            CapitalAllocationDto {
                stage_name: "seed".to_string(),
                percentage_bps: 6_000,
            },
            CapitalAllocationDto {
                stage_name: "series_a".to_string(),
                percentage_bps: 4_000,
            },
        ];
        assert!(validate_allocations(&dtos).is_ok());
    }

    #[rstest]
    fn test_validate_stages_rate_sum() {
        let dtos = vec![InvestmentStageDto {
            name: "seed".to_string(),
            graduation_rate_bps: 6_000,
            exit_rate_bps: 5_000,
        }];
        assert!(validate_stages(&dtos).is_err());
    }

    #[rstest]
    fn test_validate_assumptions() {
        let valid = ScenarioAssumptionsDto {
            deployment_years: 4,
            reserve_ratio_bps: 4_000,
            follow_on_multiple: Decimal::ONE,
        };
        assert!(validate_assumptions(&valid).is_ok());

        let invalid = ScenarioAssumptionsDto {
            deployment_years: 0,
            reserve_ratio_bps: 20_000,
            follow_on_multiple: Decimal::new(-1, 0),
        };
        let error = validate_assumptions(&invalid).unwrap_err();
        assert_eq!(error.errors.len(), 3);
    }

    #[rstest]
    fn test_parse_uuid() {
        assert!(parse_uuid("fund_id", "00000000-0000-0000-0000-000000000000").is_ok());
        assert!(parse_uuid("fund_id", "not-a-uuid").is_err());
    }

    #[rstest]
    fn test_validate_optional_amount() {
        assert!(validate_optional_amount("round_size", None).is_ok());
        assert!(validate_optional_amount("round_size", Some(Decimal::ZERO)).is_ok());
        assert!(validate_optional_amount("round_size", Some(Decimal::new(-5, 0))).is_err());
    }

    // -------------------------------------------------------------------------
    // Conversion Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_fund_response_from_domain() {
        use crate::domain::{FundId, Timestamp};

        let mut fund = Fund::new(
            FundId::generate(),
            "Growth Fund I",
            2024,
            Decimal::new(100, 0),
            Timestamp::now(),
        );
        fund.waterfall.push(WaterfallTier {
            tier: WaterfallTierKind::CarriedInterest,
            rate_bps: 2_000,
        });

        let response = FundResponse::from(&fund);
        assert_eq!(response.name, "Growth Fund I");
        assert_eq!(response.version, 1);
        assert_eq!(
            response.waterfall[0].tier,
            WaterfallTierKindDto::CarriedInterest
        );
    }

    #[rstest]
    fn test_pipeline_stage_dto_roundtrip() {
        for stage in [
            PipelineStage::Sourced,
            PipelineStage::Screening,
            PipelineStage::DueDiligence,
            PipelineStage::TermSheet,
            PipelineStage::Closed,
            PipelineStage::Passed,
        ] {
            let dto: PipelineStageDto = stage.into();
            let back: PipelineStage = dto.into();
            assert_eq!(back, stage);
        }
    }
}
