//! Domain model for the fund modeling service.

pub mod deal;
pub mod fund;
pub mod scenario;
pub mod variance;

pub use deal::{DealId, DealOpportunity, PipelineStage, StageTransitionError};
pub use fund::{
    CapitalAllocation, Fund, FundExpense, FundId, InvestmentStage, Timestamp, WaterfallTier,
    WaterfallTierKind,
};
pub use scenario::{ProjectionResult, Scenario, ScenarioAssumptions, ScenarioId};
pub use variance::{
    Alert, AlertId, AlertRule, AlertRuleId, AlertSeverity, Baseline, BaselineId, MetricDelta,
    MetricKind, MetricSet, ThresholdOperator, VarianceReport, VarianceReportId,
};
