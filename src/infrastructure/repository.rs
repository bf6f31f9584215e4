//! Repository traits for domain entities.
//!
//! Repositories are object-safe async traits so the factory can hand out
//! trait objects selected at runtime (in-memory or `PostgreSQL`).

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{
    Alert, AlertId, AlertRule, AlertRuleId, Baseline, BaselineId, DealId, DealOpportunity, Fund,
    FundId, PipelineStage, Scenario, ScenarioId, VarianceReport,
};

// =============================================================================
// Repository Error
// =============================================================================

/// Errors that can occur during repository operations.
#[derive(Debug, Error, Clone)]
pub enum RepositoryError {
    /// Entity was not found.
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Optimistic locking conflict.
    #[error("Version conflict: expected {expected}, found {found}")]
    VersionConflict {
        /// Version the repository expected.
        expected: u64,
        /// Version the caller presented.
        found: u64,
    },

    /// Database connection error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

// =============================================================================
// Pagination
// =============================================================================

/// Pagination parameters for list queries.
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    /// Page number (0-indexed).
    pub page: u32,
    /// Number of items per page.
    pub page_size: u32,
}

impl Pagination {
    /// Creates new pagination parameters.
    ///
    /// # Panics
    ///
    /// Panics if `page_size` is 0.
    #[must_use]
    pub const fn new(page: u32, page_size: u32) -> Self {
        assert!(page_size > 0, "page_size must be greater than 0");
        Self { page, page_size }
    }

    /// Creates pagination that fetches all records.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            page: 0,
            page_size: u32::MAX,
        }
    }

    /// Creates new pagination parameters without validation.
    ///
    /// Useful for constructing pagination from untrusted input where invalid
    /// values are handled by the caller.
    #[must_use]
    pub const fn new_unchecked(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    /// Returns the offset for database queries.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page as u64) * (self.page_size as u64)
    }

    /// Returns the limit for database queries.
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.page_size
    }

    /// Returns true if the pagination parameters are valid.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.page_size > 0
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 0,
            page_size: 20,
        }
    }
}

/// Paginated result containing items and total count.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    /// The items in the current page.
    pub items: Vec<T>,
    /// Total number of items across all pages.
    pub total: u64,
    /// Current page (0-indexed).
    pub page: u32,
    /// Number of items per page.
    pub page_size: u32,
}

impl<T> PaginatedResult<T> {
    /// Creates a new paginated result.
    #[must_use]
    pub const fn new(items: Vec<T>, total: u64, page: u32, page_size: u32) -> Self {
        Self {
            items,
            total,
            page,
            page_size,
        }
    }

    /// Returns the total number of pages.
    #[must_use]
    pub const fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(self.page_size as u64)
    }

    /// Returns true if there is a next page.
    #[must_use]
    pub const fn has_next(&self) -> bool {
        (self.page as u64 + 1) < self.total_pages()
    }

    /// Returns true if there is a previous page.
    #[must_use]
    pub const fn has_previous(&self) -> bool {
        self.page > 0
    }
}

// =============================================================================
// Fund Repository
// =============================================================================

/// Repository trait for `Fund` entities.
#[async_trait]
pub trait FundRepository: Send + Sync {
    /// Finds a fund by its ID.
    async fn find_by_id(&self, id: &FundId) -> Result<Option<Fund>, RepositoryError>;

    /// Saves a fund (insert or update).
    ///
    /// The version field is used for optimistic locking: inserts must carry
    /// version 1 and updates exactly `current + 1`.
    async fn save(&self, fund: &Fund) -> Result<(), RepositoryError>;

    /// Deletes a fund by its ID.
    ///
    /// Returns `Ok(true)` if the fund was deleted, `Ok(false)` if it didn't exist.
    async fn delete(&self, id: &FundId) -> Result<bool, RepositoryError>;

    /// Lists all funds with pagination.
    async fn list(&self, pagination: Pagination)
        -> Result<PaginatedResult<Fund>, RepositoryError>;

    /// Counts all funds.
    async fn count(&self) -> Result<u64, RepositoryError>;
}

// =============================================================================
// Deal Repository
// =============================================================================

/// Repository trait for `DealOpportunity` entities.
#[async_trait]
pub trait DealRepository: Send + Sync {
    /// Finds a deal by its ID.
    async fn find_by_id(&self, id: &DealId) -> Result<Option<DealOpportunity>, RepositoryError>;

    /// Saves a deal (insert or update) with optimistic locking.
    async fn save(&self, deal: &DealOpportunity) -> Result<(), RepositoryError>;

    /// Deletes a deal by its ID.
    async fn delete(&self, id: &DealId) -> Result<bool, RepositoryError>;

    /// Lists deals, optionally filtered by pipeline stage.
    async fn list(
        &self,
        stage: Option<PipelineStage>,
        pagination: Pagination,
    ) -> Result<PaginatedResult<DealOpportunity>, RepositoryError>;

    /// Lists all deals for a fund (used for metric derivation).
    async fn list_by_fund(&self, fund_id: &FundId)
        -> Result<Vec<DealOpportunity>, RepositoryError>;
}

// =============================================================================
// Scenario Repository
// =============================================================================

/// Repository trait for `Scenario` entities.
#[async_trait]
pub trait ScenarioRepository: Send + Sync {
    /// Finds a scenario by its ID.
    async fn find_by_id(&self, id: &ScenarioId) -> Result<Option<Scenario>, RepositoryError>;

    /// Saves a scenario (insert or update) with optimistic locking.
    async fn save(&self, scenario: &Scenario) -> Result<(), RepositoryError>;

    /// Deletes a scenario by its ID.
    async fn delete(&self, id: &ScenarioId) -> Result<bool, RepositoryError>;

    /// Lists scenarios, optionally filtered by fund.
    async fn list(
        &self,
        fund_id: Option<FundId>,
        pagination: Pagination,
    ) -> Result<PaginatedResult<Scenario>, RepositoryError>;
}

// =============================================================================
// Variance Repository
// =============================================================================

/// Repository trait for variance artifacts: baselines, reports, alert rules
/// and alerts.
///
/// Grouped into one store because the four collections are only ever read
/// and written together during report generation.
#[async_trait]
pub trait VarianceRepository: Send + Sync {
    /// Saves a baseline snapshot.
    async fn save_baseline(&self, baseline: &Baseline) -> Result<(), RepositoryError>;

    /// Finds a baseline by its ID.
    async fn find_baseline(&self, id: &BaselineId) -> Result<Option<Baseline>, RepositoryError>;

    /// Lists baselines for a fund, newest first.
    async fn list_baselines(&self, fund_id: &FundId) -> Result<Vec<Baseline>, RepositoryError>;

    /// Saves a variance report.
    async fn save_report(&self, report: &VarianceReport) -> Result<(), RepositoryError>;

    /// Lists variance reports for a fund, newest first.
    async fn list_reports(&self, fund_id: &FundId)
        -> Result<Vec<VarianceReport>, RepositoryError>;

    /// Saves an alert rule.
    async fn save_rule(&self, rule: &AlertRule) -> Result<(), RepositoryError>;

    /// Lists alert rules for a fund.
    async fn list_rules(&self, fund_id: &FundId) -> Result<Vec<AlertRule>, RepositoryError>;

    /// Deletes an alert rule.
    async fn delete_rule(&self, id: &AlertRuleId) -> Result<bool, RepositoryError>;

    /// Saves an alert (insert or acknowledge update).
    async fn save_alert(&self, alert: &Alert) -> Result<(), RepositoryError>;

    /// Finds an alert by its ID.
    async fn find_alert(&self, id: &AlertId) -> Result<Option<Alert>, RepositoryError>;

    /// Lists alerts for a fund, optionally only unacknowledged ones.
    async fn list_alerts(
        &self,
        fund_id: &FundId,
        acknowledged: Option<bool>,
    ) -> Result<Vec<Alert>, RepositoryError>;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // -------------------------------------------------------------------------
    // Pagination Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_pagination_new() {
        let pagination = Pagination::new(2, 10);
        assert_eq!(pagination.page, 2);
        assert_eq!(pagination.page_size, 10);
    }

    #[rstest]
    fn test_pagination_offset() {
        let pagination = Pagination::new(3, 20);
        assert_eq!(pagination.offset(), 60);
    }

    #[rstest]
    fn test_pagination_default() {
        let pagination = Pagination::default();
        assert_eq!(pagination.page, 0);
        assert_eq!(pagination.page_size, 20);
    }

    #[rstest]
    fn test_pagination_all() {
        let pagination = Pagination::all();
        assert_eq!(pagination.page, 0);
        assert_eq!(pagination.page_size, u32::MAX);
    }

    // -------------------------------------------------------------------------
    // PaginatedResult Tests
    // -------------------------------------------------------------------------

    #[rstest]
    #[case(100, 10, 10)]
    #[case(101, 10, 11)]
    #[case(0, 10, 0)]
    fn test_paginated_result_total_pages(
        #[case] total: u64,
        #[case] page_size: u32,
        #[case] expected: u64,
    ) {
        let result: PaginatedResult<i32> = PaginatedResult::new(vec![], total, 0, page_size);
        assert_eq!(result.total_pages(), expected);
    }

    #[rstest]
    fn test_paginated_result_has_next_and_previous() {
        let result: PaginatedResult<i32> = PaginatedResult::new(vec![], 100, 0, 10);
        assert!(result.has_next());
        assert!(!result.has_previous());

        let result: PaginatedResult<i32> = PaginatedResult::new(vec![], 100, 9, 10);
        assert!(!result.has_next());
        assert!(result.has_previous());
    }

    // -------------------------------------------------------------------------
    // RepositoryError Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_repository_error_display() {
        let error = RepositoryError::NotFound("fund-123".to_string());
        assert_eq!(format!("{error}"), "Entity not found: fund-123");

        let error = RepositoryError::VersionConflict {
            expected: 2,
            found: 5,
        };
        assert_eq!(format!("{error}"), "Version conflict: expected 2, found 5");
    }
}
