//! Common test helpers for integration tests.
//!
//! # Note
//!
//! The `#![allow(dead_code)]` attribute is necessary because Rust compiles
//! each integration test file as a separate crate; helpers used by only one
//! test file would otherwise warn during compilation of the others.

#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;

use fund_modeling_api::api::{AppConfig, AppState};
use fund_modeling_api::domain::{Fund, FundId, Timestamp};
use fund_modeling_api::infrastructure::{
    InMemoryDealRepository, InMemoryFundRepository, InMemoryIdempotencyStore,
    InMemoryScenarioRepository, InMemoryVarianceRepository, InflightRegistry,
    StubProjectionEngine,
};

// =============================================================================
// AppState Creation Helpers
// =============================================================================

/// Creates a test `AppState` with in-memory repositories and the stub
/// projection engine.
pub fn create_test_app_state() -> AppState {
    AppState {
        fund_repository: Arc::new(InMemoryFundRepository::new()),
        deal_repository: Arc::new(InMemoryDealRepository::new()),
        scenario_repository: Arc::new(InMemoryScenarioRepository::new()),
        variance_repository: Arc::new(InMemoryVarianceRepository::new()),
        engine: Arc::new(StubProjectionEngine::new()),
        idempotency_store: Arc::new(InMemoryIdempotencyStore::default()),
        inflight: InflightRegistry::new(),
        config: AppConfig::default(),
    }
}

// =============================================================================
// Fixture Helpers
// =============================================================================

/// Creates and persists a fund, returning the stored entity.
pub async fn create_and_save_fund(state: &AppState, name: &str) -> Fund {
    let fund = Fund::new(
        FundId::generate_v7(),
        name,
        2024,
        Decimal::new(100_000_000, 0),
        Timestamp::now(),
    );
    state
        .fund_repository
        .save(&fund)
        .await
        .expect("fund save should succeed");
    fund
}
