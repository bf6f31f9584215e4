//! Deal pipeline domain model.
//!
//! Deal opportunities move through a fixed pipeline. Transitions are
//! validated: a deal advances one stage at a time, may be passed on from any
//! active stage, and terminal stages accept no further moves.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::fund::{FundId, Timestamp};

// =============================================================================
// Value Objects
// =============================================================================

/// Unique identifier for a deal opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DealId(Uuid);

impl DealId {
    /// Creates a `DealId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Generates a new `DealId` with a randomly generated UUID (v4).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Generates a new `DealId` with a time-ordered UUID (v7).
    #[must_use]
    pub fn generate_v7() -> Self {
        Self(Uuid::now_v7())
    }
}

impl std::fmt::Display for DealId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

// =============================================================================
// Pipeline Stage
// =============================================================================

/// The stage of a deal in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Deal has been sourced but not yet reviewed.
    #[default]
    Sourced,
    /// Initial screening in progress.
    Screening,
    /// Deep diligence underway.
    DueDiligence,
    /// Term sheet issued.
    TermSheet,
    /// Investment closed.
    Closed,
    /// Deal was passed on.
    Passed,
}

impl PipelineStage {
    /// Returns `true` if the stage accepts no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Passed)
    }

    /// The next stage in forward order, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Sourced => Some(Self::Screening),
            Self::Screening => Some(Self::DueDiligence),
            Self::DueDiligence => Some(Self::TermSheet),
            Self::TermSheet => Some(Self::Closed),
            Self::Closed | Self::Passed => None,
        }
    }

    /// Validates a transition from `self` to `target`.
    ///
    /// Allowed moves: one step forward, or to `Passed` from any
    /// non-terminal stage.
    ///
    /// # Errors
    ///
    /// Returns [`StageTransitionError`] when the move is not allowed.
    pub fn validate_transition(self, target: Self) -> Result<(), StageTransitionError> {
        if self.is_terminal() {
            return Err(StageTransitionError::TerminalStage { from: self });
        }
        if target == Self::Passed || self.next() == Some(target) {
            return Ok(());
        }
        Err(StageTransitionError::InvalidMove {
            from: self,
            to: target,
        })
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sourced => write!(formatter, "sourced"),
            Self::Screening => write!(formatter, "screening"),
            Self::DueDiligence => write!(formatter, "due_diligence"),
            Self::TermSheet => write!(formatter, "term_sheet"),
            Self::Closed => write!(formatter, "closed"),
            Self::Passed => write!(formatter, "passed"),
        }
    }
}

/// Errors raised by pipeline stage transitions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StageTransitionError {
    /// The deal is in a terminal stage.
    #[error("Deal is in terminal stage {from} and cannot move")]
    TerminalStage {
        /// Current terminal stage.
        from: PipelineStage,
    },

    /// The requested move skips stages or goes backwards.
    #[error("Cannot move deal from {from} to {to}")]
    InvalidMove {
        /// Current stage.
        from: PipelineStage,
        /// Requested stage.
        to: PipelineStage,
    },
}

// =============================================================================
// Deal Entity
// =============================================================================

/// A deal opportunity tracked through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealOpportunity {
    /// Unique identifier.
    pub deal_id: DealId,
    /// Fund the deal is associated with, if any.
    pub fund_id: Option<FundId>,
    /// Target company name.
    pub company_name: String,
    /// Sector label.
    pub sector: Option<String>,
    /// Current pipeline stage.
    pub stage: PipelineStage,
    /// Round size being raised.
    pub round_size: Option<Decimal>,
    /// Pre-money valuation.
    pub valuation: Option<Decimal>,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last update timestamp.
    pub updated_at: Timestamp,
    /// Optimistic-locking version.
    pub version: u64,
}

impl DealOpportunity {
    /// Creates a new deal at the `Sourced` stage with version 1.
    #[must_use]
    pub fn new(deal_id: DealId, company_name: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            deal_id,
            fund_id: None,
            company_name: company_name.into(),
            sector: None,
            stage: PipelineStage::Sourced,
            round_size: None,
            valuation: None,
            created_at: timestamp,
            updated_at: timestamp,
            version: 1,
        }
    }

    /// Moves the deal to `target`, bumping version and timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`StageTransitionError`] when the move is not allowed.
    pub fn transition_to(
        &mut self,
        target: PipelineStage,
        timestamp: Timestamp,
    ) -> Result<(), StageTransitionError> {
        self.stage.validate_transition(target)?;
        self.stage = target;
        self.version += 1;
        self.updated_at = timestamp;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(PipelineStage::Sourced, PipelineStage::Screening, true)]
    #[case(PipelineStage::Screening, PipelineStage::DueDiligence, true)]
    #[case(PipelineStage::DueDiligence, PipelineStage::TermSheet, true)]
    #[case(PipelineStage::TermSheet, PipelineStage::Closed, true)]
    #[case(PipelineStage::Sourced, PipelineStage::Passed, true)]
    #[case(PipelineStage::TermSheet, PipelineStage::Passed, true)]
    #[case(PipelineStage::Sourced, PipelineStage::DueDiligence, false)]
    #[case(PipelineStage::Screening, PipelineStage::Sourced, false)]
    #[case(PipelineStage::Sourced, PipelineStage::Closed, false)]
    fn test_validate_transition(
        #[case] from: PipelineStage,
        #[case] to: PipelineStage,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.validate_transition(to).is_ok(), allowed);
    }

    #[rstest]
    #[case(PipelineStage::Closed)]
    #[case(PipelineStage::Passed)]
    fn test_terminal_stages_reject_moves(#[case] from: PipelineStage) {
        assert!(from.is_terminal());
        let result = from.validate_transition(PipelineStage::Screening);
        assert_eq!(result, Err(StageTransitionError::TerminalStage { from }));
    }

    #[rstest]
    fn test_deal_new_defaults() {
        let deal = DealOpportunity::new(DealId::generate(), "Acme Robotics", Timestamp::now());
        assert_eq!(deal.stage, PipelineStage::Sourced);
        assert_eq!(deal.version, 1);
        assert!(deal.fund_id.is_none());
    }

    #[rstest]
    fn test_transition_bumps_version() {
        let mut deal = DealOpportunity::new(DealId::generate(), "Acme Robotics", Timestamp::now());
        deal.transition_to(PipelineStage::Screening, Timestamp::now())
            .unwrap();
        assert_eq!(deal.stage, PipelineStage::Screening);
        assert_eq!(deal.version, 2);
    }

    #[rstest]
    fn test_transition_rejected_leaves_deal_unchanged() {
        let mut deal = DealOpportunity::new(DealId::generate(), "Acme Robotics", Timestamp::now());
        let result = deal.transition_to(PipelineStage::Closed, Timestamp::now());
        assert!(result.is_err());
        assert_eq!(deal.stage, PipelineStage::Sourced);
        assert_eq!(deal.version, 1);
    }

    #[rstest]
    fn test_pipeline_stage_serde() {
        let json = serde_json::to_string(&PipelineStage::DueDiligence).unwrap();
        assert_eq!(json, "\"due_diligence\"");
        let stage: PipelineStage = serde_json::from_str("\"term_sheet\"").unwrap();
        assert_eq!(stage, PipelineStage::TermSheet);
    }
}
