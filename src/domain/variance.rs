//! Variance tracking and alerting model.
//!
//! Baselines snapshot fund metrics at a point in time. Variance reports
//! compare a baseline against current metrics, and alert rules turn metric
//! thresholds into alerts during report generation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fund::{FundId, Timestamp};

// =============================================================================
// Identifiers
// =============================================================================

macro_rules! uuid_id {
    ($(#[$docs:meta])* $name:ident) => {
        $(#[$docs])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(Uuid);

        impl $name {
            /// Creates an identifier from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Generates a new identifier with a time-ordered UUID (v7).
            #[must_use]
            pub fn generate_v7() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }
    };
}

uuid_id! {
    /// Unique identifier for a baseline.
    BaselineId
}
uuid_id! {
    /// Unique identifier for a variance report.
    VarianceReportId
}
uuid_id! {
    /// Unique identifier for an alert rule.
    AlertRuleId
}
uuid_id! {
    /// Unique identifier for an alert.
    AlertId
}

// =============================================================================
// Metrics
// =============================================================================

/// The metrics tracked for variance purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Committed capital.
    Committed,
    /// Deployed capital.
    Deployed,
    /// Multiple on invested capital.
    Moic,
    /// Internal rate of return, in basis points.
    IrrBps,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Committed => write!(formatter, "committed"),
            Self::Deployed => write!(formatter, "deployed"),
            Self::Moic => write!(formatter, "moic"),
            Self::IrrBps => write!(formatter, "irr_bps"),
        }
    }
}

/// A snapshot of fund metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSet {
    /// Committed capital.
    pub committed: Decimal,
    /// Deployed capital.
    pub deployed: Decimal,
    /// Multiple on invested capital.
    pub moic: Decimal,
    /// IRR in basis points.
    pub irr_bps: i32,
}

impl MetricSet {
    /// Returns the value of one metric as a `Decimal`.
    #[must_use]
    pub fn value_of(&self, metric: MetricKind) -> Decimal {
        match metric {
            MetricKind::Committed => self.committed,
            MetricKind::Deployed => self.deployed,
            MetricKind::Moic => self.moic,
            MetricKind::IrrBps => Decimal::from(self.irr_bps),
        }
    }
}

// =============================================================================
// Baseline
// =============================================================================

/// A named snapshot of fund metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    /// Unique identifier.
    pub baseline_id: BaselineId,
    /// Fund the baseline belongs to.
    pub fund_id: FundId,
    /// Display name.
    pub name: String,
    /// Captured metric values.
    pub metrics: MetricSet,
    /// When the snapshot was taken.
    pub captured_at: Timestamp,
}

// =============================================================================
// Variance Report
// =============================================================================

/// Per-metric delta between a baseline and current metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDelta {
    /// Which metric the delta describes.
    pub metric: MetricKind,
    /// Baseline value.
    pub baseline_value: Decimal,
    /// Current value.
    pub current_value: Decimal,
    /// `current_value - baseline_value`.
    pub delta: Decimal,
}

/// A comparison of current metrics against a baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarianceReport {
    /// Unique identifier.
    pub report_id: VarianceReportId,
    /// Fund the report covers.
    pub fund_id: FundId,
    /// Baseline the report compares against.
    pub baseline_id: BaselineId,
    /// Per-metric deltas.
    pub deltas: Vec<MetricDelta>,
    /// When the report was generated.
    pub generated_at: Timestamp,
}

impl VarianceReport {
    /// Computes deltas for all metrics between `baseline` and `current`.
    #[must_use]
    pub fn compute(
        report_id: VarianceReportId,
        baseline: &Baseline,
        current: &MetricSet,
        generated_at: Timestamp,
    ) -> Self {
        const METRICS: [MetricKind; 4] = [
            MetricKind::Committed,
            MetricKind::Deployed,
            MetricKind::Moic,
            MetricKind::IrrBps,
        ];

        let deltas = METRICS
            .into_iter()
            .map(|metric| {
                let baseline_value = baseline.metrics.value_of(metric);
                let current_value = current.value_of(metric);
                MetricDelta {
                    metric,
                    baseline_value,
                    current_value,
                    delta: current_value - baseline_value,
                }
            })
            .collect();

        Self {
            report_id,
            fund_id: baseline.fund_id,
            baseline_id: baseline.baseline_id,
            deltas,
            generated_at,
        }
    }
}

// =============================================================================
// Alert Rules and Alerts
// =============================================================================

/// Direction of a threshold comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdOperator {
    /// Trigger when the metric rises above the threshold.
    Above,
    /// Trigger when the metric falls below the threshold.
    Below,
}

/// Alert severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    /// Informational.
    Info,
    /// Needs attention.
    Warning,
    /// Requires action.
    Critical,
}

/// A threshold rule evaluated during variance-report generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Unique identifier.
    pub rule_id: AlertRuleId,
    /// Fund the rule watches.
    pub fund_id: FundId,
    /// Metric the rule watches.
    pub metric: MetricKind,
    /// Comparison direction.
    pub operator: ThresholdOperator,
    /// Threshold value.
    pub threshold: Decimal,
    /// Severity of alerts the rule raises.
    pub severity: AlertSeverity,
    /// Disabled rules are skipped during evaluation.
    pub enabled: bool,
    /// Creation timestamp.
    pub created_at: Timestamp,
}

impl AlertRule {
    /// Returns `true` if `value` crosses the rule's threshold.
    #[must_use]
    pub fn is_triggered_by(&self, value: Decimal) -> bool {
        if !self.enabled {
            return false;
        }
        match self.operator {
            ThresholdOperator::Above => value > self.threshold,
            ThresholdOperator::Below => value < self.threshold,
        }
    }
}

/// An alert raised by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique identifier.
    pub alert_id: AlertId,
    /// Rule that raised the alert.
    pub rule_id: AlertRuleId,
    /// Fund the alert concerns.
    pub fund_id: FundId,
    /// Metric that triggered.
    pub metric: MetricKind,
    /// Observed metric value at trigger time.
    pub metric_value: Decimal,
    /// Severity inherited from the rule.
    pub severity: AlertSeverity,
    /// When the alert was raised.
    pub triggered_at: Timestamp,
    /// Whether a user has acknowledged the alert.
    pub acknowledged: bool,
}

impl Alert {
    /// Raises an alert from a triggered rule.
    #[must_use]
    pub fn from_rule(
        alert_id: AlertId,
        rule: &AlertRule,
        metric_value: Decimal,
        triggered_at: Timestamp,
    ) -> Self {
        Self {
            alert_id,
            rule_id: rule.rule_id,
            fund_id: rule.fund_id,
            metric: rule.metric,
            metric_value,
            severity: rule.severity,
            triggered_at,
            acknowledged: false,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
