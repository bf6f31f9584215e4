//! In-memory repository implementations.
//!
//! HashMap-backed implementations of the repository traits, wrapped in
//! `Arc<RwLock<...>>` for thread safety. Suitable for testing, development,
//! and the tables the persistent backend has not grown yet.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{
    Alert, AlertId, AlertRule, AlertRuleId, Baseline, BaselineId, DealId, DealOpportunity, Fund,
    FundId, PipelineStage, Scenario, ScenarioId, VarianceReport, VarianceReportId,
};
use crate::infrastructure::{
    DealRepository, FundRepository, PaginatedResult, Pagination, RepositoryError,
    ScenarioRepository, VarianceRepository,
};

/// Checks the strict version sequencing rule shared by all entities:
/// inserts carry version 1, updates exactly `existing + 1`.
fn check_version(existing: Option<u64>, incoming: u64) -> Result<(), RepositoryError> {
    match existing {
        Some(current) => {
            if incoming != current + 1 {
                return Err(RepositoryError::VersionConflict {
                    expected: current + 1,
                    found: incoming,
                });
            }
        }
        None => {
            if incoming != 1 {
                return Err(RepositoryError::VersionConflict {
                    expected: 1,
                    found: incoming,
                });
            }
        }
    }
    Ok(())
}

/// Applies pagination to an already-sorted vector of items.
fn paginate<T>(mut items: Vec<T>, pagination: Pagination) -> PaginatedResult<T> {
    let total = items.len() as u64;
    let offset = usize::try_from(pagination.offset()).unwrap_or(usize::MAX);
    let limit = pagination.limit() as usize;

    let page_items = if offset >= items.len() {
        Vec::new()
    } else {
        items.drain(..offset);
        items.truncate(limit);
        items
    };

    PaginatedResult::new(page_items, total, pagination.page, pagination.page_size)
}

// =============================================================================
// In-Memory Fund Repository
// =============================================================================

/// In-memory implementation of `FundRepository`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFundRepository {
    funds: Arc<RwLock<HashMap<FundId, Fund>>>,
}

impl InMemoryFundRepository {
    /// Creates a new empty in-memory fund repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FundRepository for InMemoryFundRepository {
    async fn find_by_id(&self, id: &FundId) -> Result<Option<Fund>, RepositoryError> {
        let guard = self.funds.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn save(&self, fund: &Fund) -> Result<(), RepositoryError> {
        let mut guard = self.funds.write().await;
        check_version(
            guard.get(&fund.fund_id).map(|existing| existing.version),
            fund.version,
        )?;
        guard.insert(fund.fund_id, fund.clone());
        Ok(())
    }

    async fn delete(&self, id: &FundId) -> Result<bool, RepositoryError> {
        let mut guard = self.funds.write().await;
        Ok(guard.remove(id).is_some())
    }

    async fn list(
        &self,
        pagination: Pagination,
    ) -> Result<PaginatedResult<Fund>, RepositoryError> {
        let guard = self.funds.read().await;
        let mut items: Vec<Fund> = guard.values().cloned().collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.fund_id.cmp(&b.fund_id)));
        Ok(paginate(items, pagination))
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let guard = self.funds.read().await;
        Ok(guard.len() as u64)
    }
}

// =============================================================================
// In-Memory Deal Repository
// =============================================================================

/// In-memory implementation of `DealRepository`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDealRepository {
    deals: Arc<RwLock<HashMap<DealId, DealOpportunity>>>,
}

impl InMemoryDealRepository {
    /// Creates a new empty in-memory deal repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DealRepository for InMemoryDealRepository {
    async fn find_by_id(&self, id: &DealId) -> Result<Option<DealOpportunity>, RepositoryError> {
        let guard = self.deals.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn save(&self, deal: &DealOpportunity) -> Result<(), RepositoryError> {
        let mut guard = self.deals.write().await;
        check_version(
            guard.get(&deal.deal_id).map(|existing| existing.version),
            deal.version,
        )?;
        guard.insert(deal.deal_id, deal.clone());
        Ok(())
    }

    async fn delete(&self, id: &DealId) -> Result<bool, RepositoryError> {
        let mut guard = self.deals.write().await;
        Ok(guard.remove(id).is_some())
    }

    async fn list(
        &self,
        stage: Option<PipelineStage>,
        pagination: Pagination,
    ) -> Result<PaginatedResult<DealOpportunity>, RepositoryError> {
        let guard = self.deals.read().await;
        let mut items: Vec<DealOpportunity> = guard
            .values()
            .filter(|deal| stage.is_none_or(|wanted| deal.stage == wanted))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.deal_id.cmp(&b.deal_id)));
        Ok(paginate(items, pagination))
    }

    async fn list_by_fund(
        &self,
        fund_id: &FundId,
    ) -> Result<Vec<DealOpportunity>, RepositoryError> {
        let guard = self.deals.read().await;
        let mut items: Vec<DealOpportunity> = guard
            .values()
            .filter(|deal| deal.fund_id.as_ref() == Some(fund_id))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.deal_id.cmp(&b.deal_id)));
        Ok(items)
    }
}

// =============================================================================
// In-Memory Scenario Repository
// =============================================================================

/// In-memory implementation of `ScenarioRepository`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryScenarioRepository {
    scenarios: Arc<RwLock<HashMap<ScenarioId, Scenario>>>,
}

impl InMemoryScenarioRepository {
    /// Creates a new empty in-memory scenario repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScenarioRepository for InMemoryScenarioRepository {
    async fn find_by_id(&self, id: &ScenarioId) -> Result<Option<Scenario>, RepositoryError> {
        let guard = self.scenarios.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn save(&self, scenario: &Scenario) -> Result<(), RepositoryError> {
        let mut guard = self.scenarios.write().await;
        check_version(
            guard
                .get(&scenario.scenario_id)
                .map(|existing| existing.version),
            scenario.version,
        )?;
        guard.insert(scenario.scenario_id, scenario.clone());
        Ok(())
    }

    async fn delete(&self, id: &ScenarioId) -> Result<bool, RepositoryError> {
        let mut guard = self.scenarios.write().await;
        Ok(guard.remove(id).is_some())
    }

    async fn list(
        &self,
        fund_id: Option<FundId>,
        pagination: Pagination,
    ) -> Result<PaginatedResult<Scenario>, RepositoryError> {
        let guard = self.scenarios.read().await;
        let mut items: Vec<Scenario> = guard
            .values()
            .filter(|scenario| fund_id.is_none_or(|wanted| scenario.fund_id == wanted))
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.scenario_id.cmp(&b.scenario_id))
        });
        Ok(paginate(items, pagination))
    }
}

// =============================================================================
// In-Memory Variance Repository
// =============================================================================

/// In-memory implementation of `VarianceRepository`.
///
/// Baselines, reports, rules, and alerts are append-mostly, so plain maps
/// without version sequencing suffice (alert acknowledgement is a last-write
/// upsert).
#[derive(Debug, Clone, Default)]
pub struct InMemoryVarianceRepository {
    baselines: Arc<RwLock<HashMap<BaselineId, Baseline>>>,
    reports: Arc<RwLock<HashMap<VarianceReportId, VarianceReport>>>,
    rules: Arc<RwLock<HashMap<AlertRuleId, AlertRule>>>,
    alerts: Arc<RwLock<HashMap<AlertId, Alert>>>,
}

impl InMemoryVarianceRepository {
    /// Creates a new empty in-memory variance repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VarianceRepository for InMemoryVarianceRepository {
    async fn save_baseline(&self, baseline: &Baseline) -> Result<(), RepositoryError> {
        let mut guard = self.baselines.write().await;
        guard.insert(baseline.baseline_id, baseline.clone());
        Ok(())
    }

    async fn find_baseline(&self, id: &BaselineId) -> Result<Option<Baseline>, RepositoryError> {
        let guard = self.baselines.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn list_baselines(&self, fund_id: &FundId) -> Result<Vec<Baseline>, RepositoryError> {
        let guard = self.baselines.read().await;
        let mut items: Vec<Baseline> = guard
            .values()
            .filter(|baseline| baseline.fund_id == *fund_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
        Ok(items)
    }

    async fn save_report(&self, report: &VarianceReport) -> Result<(), RepositoryError> {
        let mut guard = self.reports.write().await;
        guard.insert(report.report_id, report.clone());
        Ok(())
    }

    async fn list_reports(
        &self,
        fund_id: &FundId,
    ) -> Result<Vec<VarianceReport>, RepositoryError> {
        let guard = self.reports.read().await;
        let mut items: Vec<VarianceReport> = guard
            .values()
            .filter(|report| report.fund_id == *fund_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        Ok(items)
    }

    async fn save_rule(&self, rule: &AlertRule) -> Result<(), RepositoryError> {
        let mut guard = self.rules.write().await;
        guard.insert(rule.rule_id, rule.clone());
        Ok(())
    }

    async fn list_rules(&self, fund_id: &FundId) -> Result<Vec<AlertRule>, RepositoryError> {
        let guard = self.rules.read().await;
        let mut items: Vec<AlertRule> = guard
            .values()
            .filter(|rule| rule.fund_id == *fund_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.rule_id.cmp(&b.rule_id)));
        Ok(items)
    }

    async fn delete_rule(&self, id: &AlertRuleId) -> Result<bool, RepositoryError> {
        let mut guard = self.rules.write().await;
        Ok(guard.remove(id).is_some())
    }

    async fn save_alert(&self, alert: &Alert) -> Result<(), RepositoryError> {
        let mut guard = self.alerts.write().await;
        guard.insert(alert.alert_id, alert.clone());
        Ok(())
    }

    async fn find_alert(&self, id: &AlertId) -> Result<Option<Alert>, RepositoryError> {
        let guard = self.alerts.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn list_alerts(
        &self,
        fund_id: &FundId,
        acknowledged: Option<bool>,
    ) -> Result<Vec<Alert>, RepositoryError> {
        let guard = self.alerts.read().await;
        let mut items: Vec<Alert> = guard
            .values()
            .filter(|alert| alert.fund_id == *fund_id)
            .filter(|alert| acknowledged.is_none_or(|wanted| alert.acknowledged == wanted))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at));
        Ok(items)
    }
}

// =============================================================================
// Tests
// =============================================================================
