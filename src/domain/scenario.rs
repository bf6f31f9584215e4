//! Portfolio-intelligence scenario model.
//!
//! A scenario attaches deployment assumptions to a fund. Running a scenario
//! delegates the actual portfolio math to the projection engine; the domain
//! only carries assumptions and results.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fund::{FundId, Timestamp};

// =============================================================================
// Value Objects
// =============================================================================

/// Unique identifier for a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScenarioId(Uuid);

impl ScenarioId {
    /// Creates a `ScenarioId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Generates a new `ScenarioId` with a randomly generated UUID (v4).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Generates a new `ScenarioId` with a time-ordered UUID (v7).
    #[must_use]
    pub fn generate_v7() -> Self {
        Self(Uuid::now_v7())
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

// =============================================================================
// Assumptions
// =============================================================================

/// Deployment assumptions for a scenario run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioAssumptions {
    /// Years over which capital is deployed (1..=15).
    pub deployment_years: u8,
    /// Share of the fund reserved for follow-ons, in basis points.
    pub reserve_ratio_bps: u32,
    /// Average follow-on check as a multiple of the initial check.
    pub follow_on_multiple: Decimal,
}

impl Default for ScenarioAssumptions {
    fn default() -> Self {
        Self {
            deployment_years: 4,
            reserve_ratio_bps: 4_000,
            follow_on_multiple: Decimal::ONE,
        }
    }
}

// =============================================================================
// Scenario Entity
// =============================================================================

/// A named scenario attached to a fund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique identifier.
    pub scenario_id: ScenarioId,
    /// Fund the scenario models.
    pub fund_id: FundId,
    /// Display name.
    pub name: String,
    /// Deployment assumptions.
    pub assumptions: ScenarioAssumptions,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last update timestamp.
    pub updated_at: Timestamp,
    /// Optimistic-locking version.
    pub version: u64,
}

impl Scenario {
    /// Creates a new scenario with default assumptions and version 1.
    #[must_use]
    pub fn new(
        scenario_id: ScenarioId,
        fund_id: FundId,
        name: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            scenario_id,
            fund_id,
            name: name.into(),
            assumptions: ScenarioAssumptions::default(),
            created_at: timestamp,
            updated_at: timestamp,
            version: 1,
        }
    }

    /// Advances the version and update timestamp for a modification.
    pub fn touch(&mut self, timestamp: Timestamp) {
        self.version += 1;
        self.updated_at = timestamp;
    }
}

// =============================================================================
// Projection Result
// =============================================================================

/// Output of a projection-engine run.
///
/// The engine itself is an external collaborator; this type is the contract
/// the API returns to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionResult {
    /// Fund the projection was computed for.
    pub fund_id: FundId,
    /// Projected multiple on invested capital.
    pub projected_moic: Decimal,
    /// Projected IRR in basis points.
    pub projected_irr_bps: i32,
    /// Projected total value at end of fund life.
    pub projected_total_value: Decimal,
    /// Capital expected to be deployed under the assumptions.
    pub deployable_capital: Decimal,
    /// When the projection was computed.
    pub computed_at: Timestamp,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_scenario_new_defaults() {
        let scenario = Scenario::new(
            ScenarioId::generate(),
            FundId::generate(),
            "Base Case",
            Timestamp::now(),
        );
        assert_eq!(scenario.version, 1);
        assert_eq!(scenario.assumptions.deployment_years, 4);
        assert_eq!(scenario.assumptions.reserve_ratio_bps, 4_000);
    }

    #[rstest]
    fn test_scenario_touch_advances_version() {
        let mut scenario = Scenario::new(
            ScenarioId::generate(),
            FundId::generate(),
            "Base Case",
            Timestamp::now(),
        );
        scenario.touch(Timestamp::now());
        assert_eq!(scenario.version, 2);
    }

    #[rstest]
    fn test_assumptions_serde_roundtrip() {
        let assumptions = ScenarioAssumptions {
            deployment_years: 5,
            reserve_ratio_bps: 3_500,
            follow_on_multiple: Decimal::new(15, 1),
        };
        let json = serde_json::to_string(&assumptions).unwrap();
        let parsed: ScenarioAssumptions = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, assumptions);
    }
}
