//! Projection engine seam.
//!
//! MOIC/IRR/waterfall mathematics lives in an external engine that this
//! service only calls. The trait below is that boundary; the stub
//! implementation produces deterministic placeholder figures derived from
//! fund terms so the API surface (and its idempotency semantics) can be
//! exercised end to end without the real engine.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::{
    Fund, MetricSet, ProjectionResult, ScenarioAssumptions, Timestamp, fund::BPS_SCALE,
};

// =============================================================================
// Engine Error
// =============================================================================

/// Error type for projection-engine operations.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The engine rejected the inputs.
    #[error("Engine rejected inputs: {0}")]
    InvalidInputs(String),

    /// The engine is unavailable.
    #[error("Engine unavailable: {0}")]
    Unavailable(String),
}

// =============================================================================
// Projection Engine Trait
// =============================================================================

/// Boundary to the financial projection engine.
#[async_trait]
pub trait ProjectionEngine: Send + Sync {
    /// Projects fund performance under the given assumptions.
    async fn project(
        &self,
        fund: &Fund,
        assumptions: &ScenarioAssumptions,
    ) -> Result<ProjectionResult, EngineError>;

    /// Computes current fund metrics given deployed capital.
    ///
    /// Used by variance-report generation; `deployed` is derived from closed
    /// deals by the caller.
    async fn current_metrics(
        &self,
        fund: &Fund,
        deployed: Decimal,
    ) -> Result<MetricSet, EngineError>;
}

// =============================================================================
// Stub Projection Engine
// =============================================================================

/// Deterministic stand-in for the real projection engine.
///
/// Figures are simple arithmetic over fund terms: deployable capital is the
/// fund size net of the reserve ratio, projected value applies a flat gross
/// multiple scaled by the follow-on multiple. The numbers are plausible but
/// carry no financial meaning.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubProjectionEngine;

impl StubProjectionEngine {
    /// Creates a new stub engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Flat gross multiple the stub applies before assumptions.
    const BASE_GROSS_MULTIPLE: Decimal = Decimal::from_parts(25, 0, 0, false, 1); // 2.5

    /// Flat IRR the stub reports, in basis points.
    const BASE_IRR_BPS: i32 = 1_800;
}

#[async_trait]
impl ProjectionEngine for StubProjectionEngine {
    async fn project(
        &self,
        fund: &Fund,
        assumptions: &ScenarioAssumptions,
    ) -> Result<ProjectionResult, EngineError> {
        if fund.fund_size <= Decimal::ZERO {
            return Err(EngineError::InvalidInputs(
                "fund_size must be positive".to_string(),
            ));
        }

        let reserve_share =
            Decimal::from(assumptions.reserve_ratio_bps) / Decimal::from(BPS_SCALE);
        // Normalized so arithmetic scale does not leak into responses
        // ("60000000.0" vs "60000000").
        let deployable_capital = (fund.fund_size * (Decimal::ONE - reserve_share)).normalize();

        let projected_moic = (Self::BASE_GROSS_MULTIPLE
            * assumptions.follow_on_multiple.max(Decimal::ONE))
        .normalize();
        let projected_total_value = (deployable_capital * projected_moic).normalize();

        Ok(ProjectionResult {
            fund_id: fund.fund_id,
            projected_moic,
            projected_irr_bps: Self::BASE_IRR_BPS,
            projected_total_value,
            deployable_capital,
            computed_at: Timestamp::now(),
        })
    }

    async fn current_metrics(
        &self,
        fund: &Fund,
        deployed: Decimal,
    ) -> Result<MetricSet, EngineError> {
        if deployed < Decimal::ZERO {
            return Err(EngineError::InvalidInputs(
                "deployed capital cannot be negative".to_string(),
            ));
        }

        Ok(MetricSet {
            committed: fund.fund_size,
            deployed,
            moic: Self::BASE_GROSS_MULTIPLE,
            irr_bps: Self::BASE_IRR_BPS,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    use crate::domain::FundId;

    fn sample_fund(size: i64) -> Fund {
        Fund::new(
            FundId::generate_v7(),
            "Growth Fund I",
            2024,
            Decimal::new(size, 0),
            Timestamp::now(),
        )
    }

    #[rstest]
    #[tokio::test]
    async fn test_project_nets_out_reserves() {
        let engine = StubProjectionEngine::new();
        let fund = sample_fund(100_000_000);
        let assumptions = ScenarioAssumptions {
            deployment_years: 4,
            reserve_ratio_bps: 4_000,
            follow_on_multiple: Decimal::ONE,
        };

        let result = engine.project(&fund, &assumptions).await.unwrap();
        assert_eq!(result.deployable_capital, Decimal::new(60_000_000, 0));
        assert_eq!(result.projected_moic, Decimal::new(25, 1));
        assert_eq!(
            result.projected_total_value,
            Decimal::new(150_000_000, 0)
        );
    }

    #[rstest]
    #[tokio::test]
    async fn test_project_is_deterministic() {
        let engine = StubProjectionEngine::new();
        let fund = sample_fund(50_000_000);
        let assumptions = ScenarioAssumptions::default();

        let first = engine.project(&fund, &assumptions).await.unwrap();
        let second = engine.project(&fund, &assumptions).await.unwrap();
        assert_eq!(first.projected_moic, second.projected_moic);
        assert_eq!(first.projected_total_value, second.projected_total_value);
        assert_eq!(first.deployable_capital, second.deployable_capital);
    }

    #[rstest]
    #[tokio::test]
    async fn test_project_rejects_nonpositive_fund_size() {
        let engine = StubProjectionEngine::new();
        let fund = sample_fund(0);
        let result = engine.project(&fund, &ScenarioAssumptions::default()).await;
        assert!(matches!(result, Err(EngineError::InvalidInputs(_))));
    }

    #[rstest]
    #[tokio::test]
    async fn test_current_metrics() {
        let engine = StubProjectionEngine::new();
        let fund = sample_fund(100);
        let metrics = engine
            .current_metrics(&fund, Decimal::new(40, 0))
            .await
            .unwrap();
        assert_eq!(metrics.committed, Decimal::new(100, 0));
        assert_eq!(metrics.deployed, Decimal::new(40, 0));

        let result = engine.current_metrics(&fund, Decimal::new(-1, 0)).await;
        assert!(matches!(result, Err(EngineError::InvalidInputs(_))));
    }
}
