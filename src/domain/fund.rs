//! Fund domain model.
//!
//! A fund aggregates the terms captured during fund setup: expenses,
//! waterfall tiers, capital allocations, and investment stages. Ratios are
//! expressed in basis points (0..=10_000) and monetary values as `Decimal`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Full scale for basis-point ratios (100%).
pub const BPS_SCALE: u32 = 10_000;

// =============================================================================
// Value Objects - Newtypes
// =============================================================================

/// Unique identifier for a fund.
///
/// This is a newtype wrapper around UUID to provide type safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FundId(Uuid);

impl FundId {
    /// Creates a `FundId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Generates a new `FundId` with a randomly generated UUID (v4).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Generates a new `FundId` with a time-ordered UUID (v7).
    #[must_use]
    pub fn generate_v7() -> Self {
        Self(Uuid::now_v7())
    }
}

impl std::fmt::Display for FundId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// A timestamp wrapper for `DateTime<Utc>`.
///
/// This provides a consistent timestamp type throughout the domain model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a `Timestamp` from a `DateTime<Utc>`.
    #[must_use]
    pub const fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Returns the inner `DateTime<Utc>`.
    #[must_use]
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Returns the current time as a `Timestamp`.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0.to_rfc3339())
    }
}

// =============================================================================
// Fund Term Components
// =============================================================================

/// A recurring fund-level expense over a span of fund-life years.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundExpense {
    /// Expense category label (e.g. "legal", "audit").
    pub category: String,
    /// Annual amount charged while the expense is active.
    pub annual_amount: Decimal,
    /// First fund-life year the expense applies (1-indexed).
    pub start_year: u16,
    /// Last fund-life year the expense applies (inclusive).
    pub end_year: u16,
}

impl FundExpense {
    /// Returns `true` if the year span is ordered and within fund life.
    #[must_use]
    pub const fn span_is_valid(&self) -> bool {
        self.start_year >= 1 && self.end_year <= 30 && self.start_year <= self.end_year
    }
}

/// Kinds of distribution-waterfall tiers, in conventional priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaterfallTierKind {
    /// Return of contributed capital to LPs.
    ReturnOfCapital,
    /// Preferred return (hurdle) accruing to LPs.
    PreferredReturn,
    /// GP catch-up tier.
    GpCatchUp,
    /// Carried interest split.
    CarriedInterest,
}

impl std::fmt::Display for WaterfallTierKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReturnOfCapital => write!(formatter, "return_of_capital"),
            Self::PreferredReturn => write!(formatter, "preferred_return"),
            Self::GpCatchUp => write!(formatter, "gp_catch_up"),
            Self::CarriedInterest => write!(formatter, "carried_interest"),
        }
    }
}

/// A single tier in the distribution waterfall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterfallTier {
    /// Which tier this entry configures.
    pub tier: WaterfallTierKind,
    /// Tier rate in basis points (0..=10_000).
    pub rate_bps: u32,
}

/// Planned capital allocation to a named investment stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapitalAllocation {
    /// Stage the allocation targets (e.g. "seed", "series_a").
    pub stage_name: String,
    /// Share of the fund in basis points.
    pub percentage_bps: u32,
}

/// Investment-stage assumptions used by the projection engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestmentStage {
    /// Stage label.
    pub name: String,
    /// Share of companies graduating to the next stage, in basis points.
    pub graduation_rate_bps: u32,
    /// Share of companies exiting at this stage, in basis points.
    pub exit_rate_bps: u32,
}

impl InvestmentStage {
    /// Graduation and exit shares cannot jointly exceed 100%.
    #[must_use]
    pub const fn rates_are_valid(&self) -> bool {
        self.graduation_rate_bps <= BPS_SCALE
            && self.exit_rate_bps <= BPS_SCALE
            && self.graduation_rate_bps + self.exit_rate_bps <= BPS_SCALE
    }
}

// =============================================================================
// Fund Entity
// =============================================================================

/// A venture fund and the terms captured during setup.
///
/// The `version` field implements optimistic locking: a newly created fund
/// has version 1, and every update must present exactly `version + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fund {
    /// Unique identifier.
    pub fund_id: FundId,
    /// Display name.
    pub name: String,
    /// Vintage year of the fund.
    pub vintage_year: u16,
    /// Committed capital.
    pub fund_size: Decimal,
    /// Annual management fee in basis points.
    pub management_fee_bps: u32,
    /// Carried interest in basis points.
    pub carried_interest_bps: u32,
    /// Fund-level expenses.
    pub expenses: Vec<FundExpense>,
    /// Distribution waterfall tiers.
    pub waterfall: Vec<WaterfallTier>,
    /// Capital allocations by stage.
    pub allocations: Vec<CapitalAllocation>,
    /// Investment-stage assumptions.
    pub stages: Vec<InvestmentStage>,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last update timestamp.
    pub updated_at: Timestamp,
    /// Optimistic-locking version.
    pub version: u64,
}

impl Fund {
    /// Creates a new fund with version 1 and empty term collections.
    #[must_use]
    pub fn new(
        fund_id: FundId,
        name: impl Into<String>,
        vintage_year: u16,
        fund_size: Decimal,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            fund_id,
            name: name.into(),
            vintage_year,
            fund_size,
            management_fee_bps: 200,
            carried_interest_bps: 2_000,
            expenses: Vec::new(),
            waterfall: Vec::new(),
            allocations: Vec::new(),
            stages: Vec::new(),
            created_at: timestamp,
            updated_at: timestamp,
            version: 1,
        }
    }

    /// Total allocated share across all capital allocations, in basis points.
    ///
    /// Saturates rather than wrapping so oversized inputs still compare
    /// correctly against [`BPS_SCALE`].
    #[must_use]
    pub fn allocation_total_bps(&self) -> u32 {
        self.allocations
            .iter()
            .fold(0u32, |total, allocation| {
                total.saturating_add(allocation.percentage_bps)
            })
    }

    /// Advances the version and update timestamp for a modification.
    pub fn touch(&mut self, timestamp: Timestamp) {
        self.version += 1;
        self.updated_at = timestamp;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sample_fund() -> Fund {
        Fund::new(
            FundId::generate(),
            "Growth Fund I",
            2024,
            Decimal::new(100_000_000, 0),
            Timestamp::now(),
        )
    }

    #[rstest]
    fn test_fund_id_display_roundtrip() {
        let id = FundId::from_uuid(Uuid::nil());
        assert_eq!(id.to_string(), "00000000-0000-0000-0000-000000000000");
        assert_eq!(id.as_uuid(), &Uuid::nil());
    }

    #[rstest]
    fn test_fund_new_defaults() {
        let fund = sample_fund();
        assert_eq!(fund.version, 1);
        assert_eq!(fund.management_fee_bps, 200);
        assert_eq!(fund.carried_interest_bps, 2_000);
        assert!(fund.expenses.is_empty());
        assert!(fund.waterfall.is_empty());
    }

    #[rstest]
    fn test_fund_touch_advances_version() {
        let mut fund = sample_fund();
        let before = fund.version;
        fund.touch(Timestamp::now());
        assert_eq!(fund.version, before + 1);
    }

    #[rstest]
    #[case(vec![], 0)]
    #[case(vec![3_000, 4_000], 7_000)]
    #[case(vec![6_000, 6_000], 12_000)]
    fn test_allocation_total_bps(#[case] shares: Vec<u32>, #[case] expected: u32) {
        let mut fund = sample_fund();
        fund.allocations = shares
            .into_iter()
            .map(|percentage_bps| CapitalAllocation {
                stage_name: "seed".to_string(),
                percentage_bps,
            })
            .collect();
        assert_eq!(fund.allocation_total_bps(), expected);
    }

    #[rstest]
    fn test_allocation_total_bps_saturates() {
        let mut fund = sample_fund();
        fund.allocations = vec![
            CapitalAllocation {
                stage_name: "seed".to_string(),
                percentage_bps: u32::MAX,
            },
            CapitalAllocation {
                stage_name: "series_a".to_string(),
                percentage_bps: 1,
            },
        ];
        assert_eq!(fund.allocation_total_bps(), u32::MAX);
    }

    #[rstest]
    #[case(1, 10, true)]
    #[case(5, 5, true)]
    #[case(0, 10, false)]
    #[case(10, 5, false)]
    #[case(1, 31, false)]
    fn test_expense_span_validation(
        #[case] start_year: u16,
        #[case] end_year: u16,
        #[case] expected: bool,
    ) {
        let expense = FundExpense {
            category: "legal".to_string(),
            annual_amount: Decimal::new(50_000, 0),
            start_year,
            end_year,
        };
        assert_eq!(expense.span_is_valid(), expected);
    }

    #[rstest]
    #[case(4_000, 3_000, true)]
    #[case(10_000, 0, true)]
    #[case(6_000, 5_000, false)]
    #[case(10_001, 0, false)]
    fn test_investment_stage_rates(
        #[case] graduation_rate_bps: u32,
        #[case] exit_rate_bps: u32,
        #[case] expected: bool,
    ) {
        let stage = InvestmentStage {
            name: "seed".to_string(),
            graduation_rate_bps,
            exit_rate_bps,
        };
        assert_eq!(stage.rates_are_valid(), expected);
    }

    #[rstest]
    fn test_waterfall_tier_kind_serde() {
        let json = serde_json::to_string(&WaterfallTierKind::GpCatchUp).unwrap();
        assert_eq!(json, "\"gp_catch_up\"");
        let kind: WaterfallTierKind = serde_json::from_str("\"carried_interest\"").unwrap();
        assert_eq!(kind, WaterfallTierKind::CarriedInterest);
    }
}
