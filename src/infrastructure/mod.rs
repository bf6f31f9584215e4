//! Infrastructure layer: persistence, idempotency records, single-flight
//! tracking, and the projection-engine seam.

pub mod engine;
pub mod factory;
pub mod idempotency_store;
pub mod in_memory;
pub mod inflight;
pub mod postgres;
pub mod repository;

pub use engine::{EngineError, ProjectionEngine, StubProjectionEngine};
pub use factory::{
    CacheMode, ConfigurationError, FactoryError, Repositories, RepositoryConfig,
    RepositoryConfigBuilder, RepositoryFactory, StorageMode,
};
pub use idempotency_store::{
    ClaimOutcome, IdempotencyRecord, IdempotencyStore, IdempotencyStoreConfig,
    IdempotencyStoreError, InMemoryIdempotencyStore, RecordState, RedisIdempotencyStore,
    StoredResponse,
};
pub use in_memory::{
    InMemoryDealRepository, InMemoryFundRepository, InMemoryScenarioRepository,
    InMemoryVarianceRepository,
};
pub use inflight::{InflightGuard, InflightRegistry};
pub use postgres::{
    PostgresDealRepository, PostgresFundRepository, PostgresScenarioRepository,
    PostgresVarianceRepository,
};
pub use repository::{
    DealRepository, FundRepository, PaginatedResult, Pagination, RepositoryError,
    ScenarioRepository, VarianceRepository,
};
