//! `PostgreSQL` repository implementations.
//!
//! Entities are stored as JSONB documents with a version column for
//! optimistic locking, using `sqlx` runtime queries over a connection pool.
//!
//! # Table Schema
//!
//! ```sql
//! -- funds / deals / scenarios share the same document shape
//! CREATE TABLE funds (
//!     id UUID PRIMARY KEY,
//!     data JSONB NOT NULL,
//!     version BIGINT NOT NULL DEFAULT 1,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! CREATE TABLE deals (LIKE funds INCLUDING ALL);
//! CREATE TABLE scenarios (LIKE funds INCLUDING ALL);
//!
//! -- variance artifacts are append-mostly documents keyed by fund
//! CREATE TABLE baselines (
//!     id UUID PRIMARY KEY,
//!     fund_id UUID NOT NULL,
//!     data JSONB NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! CREATE TABLE variance_reports (LIKE baselines INCLUDING ALL);
//! CREATE TABLE alert_rules (LIKE baselines INCLUDING ALL);
//! CREATE TABLE alerts (LIKE baselines INCLUDING ALL);
//! CREATE INDEX idx_baselines_fund_id ON baselines(fund_id);
//! CREATE INDEX idx_variance_reports_fund_id ON variance_reports(fund_id);
//! CREATE INDEX idx_alert_rules_fund_id ON alert_rules(fund_id);
//! CREATE INDEX idx_alerts_fund_id ON alerts(fund_id);
//! ```

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    Alert, AlertId, AlertRule, AlertRuleId, Baseline, BaselineId, DealId, DealOpportunity, Fund,
    FundId, PipelineStage, Scenario, ScenarioId, VarianceReport,
};
use crate::infrastructure::{
    DealRepository, FundRepository, PaginatedResult, Pagination, RepositoryError,
    ScenarioRepository, VarianceRepository,
};

// =============================================================================
// Shared Helpers
// =============================================================================

fn database_error(error: sqlx::Error) -> RepositoryError {
    RepositoryError::DatabaseError(error.to_string())
}

fn serialization_error(error: serde_json::Error) -> RepositoryError {
    RepositoryError::SerializationError(error.to_string())
}

/// Converts `PipelineStage` to its database string representation.
///
/// This ensures consistency with serde's `#[serde(rename_all = "snake_case")]`
/// attribute used in the `PipelineStage` enum, so JSONB filters compare the
/// same strings serde wrote.
const fn stage_to_database_string(stage: PipelineStage) -> &'static str {
    match stage {
        PipelineStage::Sourced => "sourced",
        PipelineStage::Screening => "screening",
        PipelineStage::DueDiligence => "due_diligence",
        PipelineStage::TermSheet => "term_sheet",
        PipelineStage::Closed => "closed",
        PipelineStage::Passed => "passed",
    }
}

/// Fetches a JSONB document by primary key.
async fn fetch_document<T: DeserializeOwned>(
    pool: &PgPool,
    sql: &str,
    id: &Uuid,
) -> Result<Option<T>, RepositoryError> {
    let row: Option<(serde_json::Value,)> = sqlx::query_as(sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(database_error)?;

    row.map(|(data,)| serde_json::from_value(data))
        .transpose()
        .map_err(serialization_error)
}

/// Inserts or updates a versioned JSONB document with optimistic locking.
///
/// The version row is locked (`FOR UPDATE`) inside a transaction so
/// concurrent writers serialize on the same entity. Inserts must carry
/// version 1; updates exactly `existing + 1`.
async fn upsert_versioned<T: Serialize>(
    pool: &PgPool,
    table: &str,
    id: &Uuid,
    entity: &T,
    version: u64,
) -> Result<(), RepositoryError> {
    let data = serde_json::to_value(entity).map_err(serialization_error)?;

    let mut transaction = pool.begin().await.map_err(database_error)?;

    let select_sql = format!("SELECT version FROM {table} WHERE id = $1 FOR UPDATE");
    let existing_row: Option<(i64,)> = sqlx::query_as(&select_sql)
        .bind(id)
        .fetch_optional(&mut *transaction)
        .await
        .map_err(database_error)?;

    #[allow(clippy::cast_possible_wrap)]
    let new_version = version as i64;

    if let Some((existing_version,)) = existing_row {
        // Update case: version must be existing + 1
        let expected_version = existing_version + 1;
        if new_version != expected_version {
            return Err(RepositoryError::VersionConflict {
                #[allow(clippy::cast_sign_loss)]
                expected: expected_version as u64,
                found: version,
            });
        }

        let update_sql = format!(
            "UPDATE {table} SET data = $1, version = $2, updated_at = NOW() WHERE id = $3"
        );
        sqlx::query(&update_sql)
            .bind(&data)
            .bind(new_version)
            .bind(id)
            .execute(&mut *transaction)
            .await
            .map_err(database_error)?;
    } else {
        // New entity case: version must be 1
        if version != 1 {
            return Err(RepositoryError::VersionConflict {
                expected: 1,
                found: version,
            });
        }

        let insert_sql = format!(
            "INSERT INTO {table} (id, data, version, created_at, updated_at) \
             VALUES ($1, $2, $3, NOW(), NOW())"
        );
        sqlx::query(&insert_sql)
            .bind(id)
            .bind(&data)
            .bind(new_version)
            .execute(&mut *transaction)
            .await
            .map_err(database_error)?;
    }

    transaction.commit().await.map_err(database_error)?;
    Ok(())
}

/// Deletes a row by primary key, returning whether it existed.
async fn delete_by_id(pool: &PgPool, sql: &str, id: &Uuid) -> Result<bool, RepositoryError> {
    let result = sqlx::query(sql)
        .bind(id)
        .execute(pool)
        .await
        .map_err(database_error)?;
    Ok(result.rows_affected() > 0)
}

/// Deserializes a list of JSONB rows.
fn decode_rows<T: DeserializeOwned>(
    rows: Vec<(serde_json::Value,)>,
) -> Result<Vec<T>, RepositoryError> {
    rows.into_iter()
        .map(|(data,)| serde_json::from_value(data).map_err(serialization_error))
        .collect()
}

// =============================================================================
// PostgreSQL Fund Repository
// =============================================================================

/// `PostgreSQL` implementation of `FundRepository`.
#[derive(Debug, Clone)]
pub struct PostgresFundRepository {
    pool: PgPool,
}

impl PostgresFundRepository {
    /// Creates a new `PostgreSQL` fund repository with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FundRepository for PostgresFundRepository {
    async fn find_by_id(&self, id: &FundId) -> Result<Option<Fund>, RepositoryError> {
        fetch_document(&self.pool, "SELECT data FROM funds WHERE id = $1", id.as_uuid()).await
    }

    async fn save(&self, fund: &Fund) -> Result<(), RepositoryError> {
        upsert_versioned(
            &self.pool,
            "funds",
            fund.fund_id.as_uuid(),
            fund,
            fund.version,
        )
        .await
    }

    async fn delete(&self, id: &FundId) -> Result<bool, RepositoryError> {
        delete_by_id(&self.pool, "DELETE FROM funds WHERE id = $1", id.as_uuid()).await
    }

    async fn list(
        &self,
        pagination: Pagination,
    ) -> Result<PaginatedResult<Fund>, RepositoryError> {
        let count_row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM funds")
            .fetch_one(&self.pool)
            .await
            .map_err(database_error)?;

        #[allow(clippy::cast_sign_loss)]
        let total = count_row.0 as u64;

        if total == 0 {
            return Ok(PaginatedResult::new(
                vec![],
                0,
                pagination.page,
                pagination.page_size,
            ));
        }

        #[allow(clippy::cast_possible_wrap)]
        let offset = pagination.offset() as i64;
        let limit = i64::from(pagination.limit());

        let rows: Vec<(serde_json::Value,)> =
            sqlx::query_as("SELECT data FROM funds ORDER BY created_at ASC LIMIT $1 OFFSET $2")
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
                .map_err(database_error)?;

        Ok(PaginatedResult::new(
            decode_rows(rows)?,
            total,
            pagination.page,
            pagination.page_size,
        ))
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count_row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM funds")
            .fetch_one(&self.pool)
            .await
            .map_err(database_error)?;
        #[allow(clippy::cast_sign_loss)]
        Ok(count_row.0 as u64)
    }
}

// =============================================================================
// PostgreSQL Deal Repository
// =============================================================================

/// `PostgreSQL` implementation of `DealRepository`.
#[derive(Debug, Clone)]
pub struct PostgresDealRepository {
    pool: PgPool,
}

impl PostgresDealRepository {
    /// Creates a new `PostgreSQL` deal repository with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DealRepository for PostgresDealRepository {
    async fn find_by_id(&self, id: &DealId) -> Result<Option<DealOpportunity>, RepositoryError> {
        fetch_document(&self.pool, "SELECT data FROM deals WHERE id = $1", id.as_uuid()).await
    }

    async fn save(&self, deal: &DealOpportunity) -> Result<(), RepositoryError> {
        upsert_versioned(
            &self.pool,
            "deals",
            deal.deal_id.as_uuid(),
            deal,
            deal.version,
        )
        .await
    }

    async fn delete(&self, id: &DealId) -> Result<bool, RepositoryError> {
        delete_by_id(&self.pool, "DELETE FROM deals WHERE id = $1", id.as_uuid()).await
    }

    async fn list(
        &self,
        stage: Option<PipelineStage>,
        pagination: Pagination,
    ) -> Result<PaginatedResult<DealOpportunity>, RepositoryError> {
        // Filter through the JSONB document so stored and queried values
        // share serde's snake_case representation.
        let (count_sql, list_sql) = if stage.is_some() {
            (
                "SELECT COUNT(*) FROM deals WHERE data->>'stage' = $1",
                "SELECT data FROM deals WHERE data->>'stage' = $1 \
                 ORDER BY created_at ASC LIMIT $2 OFFSET $3",
            )
        } else {
            (
                "SELECT COUNT(*) FROM deals",
                "SELECT data FROM deals ORDER BY created_at ASC LIMIT $1 OFFSET $2",
            )
        };

        let mut count_query = sqlx::query_as::<_, (i64,)>(count_sql);
        if let Some(stage_value) = stage {
            count_query = count_query.bind(stage_to_database_string(stage_value));
        }
        let count_row = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(database_error)?;

        #[allow(clippy::cast_sign_loss)]
        let total = count_row.0 as u64;

        if total == 0 {
            return Ok(PaginatedResult::new(
                vec![],
                0,
                pagination.page,
                pagination.page_size,
            ));
        }

        #[allow(clippy::cast_possible_wrap)]
        let offset = pagination.offset() as i64;
        let limit = i64::from(pagination.limit());

        let mut list_query = sqlx::query_as::<_, (serde_json::Value,)>(list_sql);
        if let Some(stage_value) = stage {
            list_query = list_query.bind(stage_to_database_string(stage_value));
        }
        let rows = list_query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

        Ok(PaginatedResult::new(
            decode_rows(rows)?,
            total,
            pagination.page,
            pagination.page_size,
        ))
    }

    async fn list_by_fund(
        &self,
        fund_id: &FundId,
    ) -> Result<Vec<DealOpportunity>, RepositoryError> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            "SELECT data FROM deals WHERE data->>'fund_id' = $1 ORDER BY created_at ASC",
        )
        .bind(fund_id.as_uuid().to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)?;

        decode_rows(rows)
    }
}

// =============================================================================
// PostgreSQL Scenario Repository
// =============================================================================

/// `PostgreSQL` implementation of `ScenarioRepository`.
#[derive(Debug, Clone)]
pub struct PostgresScenarioRepository {
    pool: PgPool,
}

impl PostgresScenarioRepository {
    /// Creates a new `PostgreSQL` scenario repository with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScenarioRepository for PostgresScenarioRepository {
    async fn find_by_id(&self, id: &ScenarioId) -> Result<Option<Scenario>, RepositoryError> {
        fetch_document(
            &self.pool,
            "SELECT data FROM scenarios WHERE id = $1",
            id.as_uuid(),
        )
        .await
    }

    async fn save(&self, scenario: &Scenario) -> Result<(), RepositoryError> {
        upsert_versioned(
            &self.pool,
            "scenarios",
            scenario.scenario_id.as_uuid(),
            scenario,
            scenario.version,
        )
        .await
    }

    async fn delete(&self, id: &ScenarioId) -> Result<bool, RepositoryError> {
        delete_by_id(
            &self.pool,
            "DELETE FROM scenarios WHERE id = $1",
            id.as_uuid(),
        )
        .await
    }

    async fn list(
        &self,
        fund_id: Option<FundId>,
        pagination: Pagination,
    ) -> Result<PaginatedResult<Scenario>, RepositoryError> {
        let (count_sql, list_sql) = if fund_id.is_some() {
            (
                "SELECT COUNT(*) FROM scenarios WHERE data->>'fund_id' = $1",
                "SELECT data FROM scenarios WHERE data->>'fund_id' = $1 \
                 ORDER BY created_at ASC LIMIT $2 OFFSET $3",
            )
        } else {
            (
                "SELECT COUNT(*) FROM scenarios",
                "SELECT data FROM scenarios ORDER BY created_at ASC LIMIT $1 OFFSET $2",
            )
        };

        let mut count_query = sqlx::query_as::<_, (i64,)>(count_sql);
        if let Some(fund) = fund_id {
            count_query = count_query.bind(fund.as_uuid().to_string());
        }
        let count_row = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(database_error)?;

        #[allow(clippy::cast_sign_loss)]
        let total = count_row.0 as u64;

        if total == 0 {
            return Ok(PaginatedResult::new(
                vec![],
                0,
                pagination.page,
                pagination.page_size,
            ));
        }

        #[allow(clippy::cast_possible_wrap)]
        let offset = pagination.offset() as i64;
        let limit = i64::from(pagination.limit());

        let mut list_query = sqlx::query_as::<_, (serde_json::Value,)>(list_sql);
        if let Some(fund) = fund_id {
            list_query = list_query.bind(fund.as_uuid().to_string());
        }
        let rows = list_query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

        Ok(PaginatedResult::new(
            decode_rows(rows)?,
            total,
            pagination.page,
            pagination.page_size,
        ))
    }
}

// =============================================================================
// PostgreSQL Variance Repository
// =============================================================================

/// `PostgreSQL` implementation of `VarianceRepository`.
///
/// Variance artifacts are append-mostly documents; rows carry a denormalized
/// `fund_id` column so listing by fund avoids JSONB scans.
#[derive(Debug, Clone)]
pub struct PostgresVarianceRepository {
    pool: PgPool,
}

impl PostgresVarianceRepository {
    /// Creates a new `PostgreSQL` variance repository with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_artifact<T: Serialize>(
        &self,
        table: &str,
        id: &Uuid,
        fund_id: &Uuid,
        entity: &T,
    ) -> Result<(), RepositoryError> {
        let data = serde_json::to_value(entity).map_err(serialization_error)?;
        let sql = format!(
            "INSERT INTO {table} (id, fund_id, data, created_at) VALUES ($1, $2, $3, NOW()) \
             ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data"
        );
        sqlx::query(&sql)
            .bind(id)
            .bind(fund_id)
            .bind(&data)
            .execute(&self.pool)
            .await
            .map_err(database_error)?;
        Ok(())
    }

    async fn list_artifacts<T: DeserializeOwned>(
        &self,
        sql: &str,
        fund_id: &Uuid,
    ) -> Result<Vec<T>, RepositoryError> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(sql)
            .bind(fund_id)
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;
        decode_rows(rows)
    }
}

#[async_trait]
impl VarianceRepository for PostgresVarianceRepository {
    async fn save_baseline(&self, baseline: &Baseline) -> Result<(), RepositoryError> {
        self.insert_artifact(
            "baselines",
            baseline.baseline_id.as_uuid(),
            baseline.fund_id.as_uuid(),
            baseline,
        )
        .await
    }

    async fn find_baseline(&self, id: &BaselineId) -> Result<Option<Baseline>, RepositoryError> {
        fetch_document(
            &self.pool,
            "SELECT data FROM baselines WHERE id = $1",
            id.as_uuid(),
        )
        .await
    }

    async fn list_baselines(&self, fund_id: &FundId) -> Result<Vec<Baseline>, RepositoryError> {
        self.list_artifacts(
            "SELECT data FROM baselines WHERE fund_id = $1 ORDER BY created_at DESC",
            fund_id.as_uuid(),
        )
        .await
    }

    async fn save_report(&self, report: &VarianceReport) -> Result<(), RepositoryError> {
        self.insert_artifact(
            "variance_reports",
            report.report_id.as_uuid(),
            report.fund_id.as_uuid(),
            report,
        )
        .await
    }

    async fn list_reports(
        &self,
        fund_id: &FundId,
    ) -> Result<Vec<VarianceReport>, RepositoryError> {
        self.list_artifacts(
            "SELECT data FROM variance_reports WHERE fund_id = $1 ORDER BY created_at DESC",
            fund_id.as_uuid(),
        )
        .await
    }

    async fn save_rule(&self, rule: &AlertRule) -> Result<(), RepositoryError> {
        self.insert_artifact(
            "alert_rules",
            rule.rule_id.as_uuid(),
            rule.fund_id.as_uuid(),
            rule,
        )
        .await
    }

    async fn list_rules(&self, fund_id: &FundId) -> Result<Vec<AlertRule>, RepositoryError> {
        self.list_artifacts(
            "SELECT data FROM alert_rules WHERE fund_id = $1 ORDER BY created_at ASC",
            fund_id.as_uuid(),
        )
        .await
    }

    async fn delete_rule(&self, id: &AlertRuleId) -> Result<bool, RepositoryError> {
        delete_by_id(
            &self.pool,
            "DELETE FROM alert_rules WHERE id = $1",
            id.as_uuid(),
        )
        .await
    }

    async fn save_alert(&self, alert: &Alert) -> Result<(), RepositoryError> {
        self.insert_artifact(
            "alerts",
            alert.alert_id.as_uuid(),
            alert.fund_id.as_uuid(),
            alert,
        )
        .await
    }

    async fn find_alert(&self, id: &AlertId) -> Result<Option<Alert>, RepositoryError> {
        fetch_document(
            &self.pool,
            "SELECT data FROM alerts WHERE id = $1",
            id.as_uuid(),
        )
        .await
    }

    async fn list_alerts(
        &self,
        fund_id: &FundId,
        acknowledged: Option<bool>,
    ) -> Result<Vec<Alert>, RepositoryError> {
        match acknowledged {
            None => {
                self.list_artifacts(
                    "SELECT data FROM alerts WHERE fund_id = $1 ORDER BY created_at DESC",
                    fund_id.as_uuid(),
                )
                .await
            }
            Some(wanted) => {
                let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
                    "SELECT data FROM alerts WHERE fund_id = $1 \
                     AND (data->>'acknowledged')::boolean = $2 \
                     ORDER BY created_at DESC",
                )
                .bind(fund_id.as_uuid())
                .bind(wanted)
                .fetch_all(&self.pool)
                .await
                .map_err(database_error)?;
                decode_rows(rows)
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
