//! Repository factory for runtime backend selection.
//!
//! Creates repository and idempotency-store instances based on environment
//! configuration, switching between in-memory and `PostgreSQL` storage and
//! between in-memory and Redis idempotency caching at startup.
//!
//! # Environment Variables
//!
//! - `STORAGE_MODE`: `in_memory` (default) | `postgres`
//! - `CACHE_MODE`: `in_memory` (default) | `redis`
//! - `DATABASE_URL`: `PostgreSQL` connection URL (required when `STORAGE_MODE=postgres`)
//! - `REDIS_URL`: Redis connection URL (required when `CACHE_MODE=redis`)
//! - `IDEMPOTENCY_TTL_SECS`: TTL for completed idempotency records (default: 86400)
//! - `IDEMPOTENCY_PENDING_TTL_SECS`: TTL for pending claims (default: 120)

use std::env;
use std::str::FromStr;
use std::sync::Arc;

use deadpool_redis::Runtime;
use sqlx::PgPool;
use thiserror::Error;

use super::{
    DealRepository, FundRepository, IdempotencyStore, IdempotencyStoreConfig,
    InMemoryDealRepository, InMemoryFundRepository, InMemoryIdempotencyStore,
    InMemoryScenarioRepository, InMemoryVarianceRepository, PostgresDealRepository,
    PostgresFundRepository, PostgresScenarioRepository, PostgresVarianceRepository,
    RedisIdempotencyStore, ScenarioRepository, VarianceRepository,
};

// =============================================================================
// Configuration Types
// =============================================================================

/// Storage mode for persistent data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// In-memory storage. Suitable for testing and development.
    #[default]
    InMemory,
    /// `PostgreSQL` storage for production use.
    Postgres,
}

impl FromStr for StorageMode {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "in_memory" | "inmemory" | "memory" => Ok(Self::InMemory),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            _ => Err(ConfigurationError::InvalidStorageMode(value.to_string())),
        }
    }
}

/// Cache mode for idempotency records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Process-local in-memory store. Suitable for testing and development.
    #[default]
    InMemory,
    /// Redis store for production use (cross-instance dedup).
    Redis,
}

impl FromStr for CacheMode {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "in_memory" | "inmemory" | "memory" => Ok(Self::InMemory),
            "redis" => Ok(Self::Redis),
            _ => Err(ConfigurationError::InvalidCacheMode(value.to_string())),
        }
    }
}

/// Configuration for the repository factory.
#[derive(Debug, Clone, Default)]
pub struct RepositoryConfig {
    /// Storage mode for persistent data.
    pub storage_mode: StorageMode,
    /// Cache mode for idempotency records.
    pub cache_mode: CacheMode,
    /// `PostgreSQL` connection URL (required when `storage_mode` is `Postgres`).
    pub database_url: Option<String>,
    /// Redis connection URL (required when `cache_mode` is `Redis`).
    pub redis_url: Option<String>,
    /// TTL configuration for idempotency records.
    pub idempotency: IdempotencyStoreConfig,
}

impl RepositoryConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> RepositoryConfigBuilder {
        RepositoryConfigBuilder::default()
    }

    /// Creates a configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if:
    /// - `STORAGE_MODE` or `CACHE_MODE` contains an invalid value
    /// - `DATABASE_URL` is missing when `STORAGE_MODE=postgres`
    /// - `REDIS_URL` is missing when `CACHE_MODE=redis`
    pub fn from_env() -> Result<Self, ConfigurationError> {
        let storage_mode = match env::var("STORAGE_MODE") {
            Ok(value) => value.parse()?,
            Err(env::VarError::NotPresent) => StorageMode::default(),
            Err(env::VarError::NotUnicode(_)) => {
                return Err(ConfigurationError::InvalidStorageMode(
                    "<non-UTF-8 value>".to_string(),
                ));
            }
        };

        let cache_mode = match env::var("CACHE_MODE") {
            Ok(value) => value.parse()?,
            Err(env::VarError::NotPresent) => CacheMode::default(),
            Err(env::VarError::NotUnicode(_)) => {
                return Err(ConfigurationError::InvalidCacheMode(
                    "<non-UTF-8 value>".to_string(),
                ));
            }
        };

        // Parse URLs, treating empty/whitespace-only as None
        let database_url = env::var("DATABASE_URL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let redis_url = env::var("REDIS_URL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let ttl_seconds = env::var("IDEMPOTENCY_TTL_SECS")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(86_400);
        let pending_ttl_seconds = env::var("IDEMPOTENCY_PENDING_TTL_SECS")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(120);

        let config = Self {
            storage_mode,
            cache_mode,
            database_url,
            redis_url,
            idempotency: IdempotencyStoreConfig::new(ttl_seconds, pending_ttl_seconds),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if required URLs are missing for the
    /// selected modes.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.storage_mode == StorageMode::Postgres && self.database_url.is_none() {
            return Err(ConfigurationError::MissingDatabaseUrl);
        }

        if self.cache_mode == CacheMode::Redis && self.redis_url.is_none() {
            return Err(ConfigurationError::MissingRedisUrl);
        }

        Ok(())
    }
}

/// Builder for `RepositoryConfig`.
#[derive(Debug, Clone, Default)]
pub struct RepositoryConfigBuilder {
    storage_mode: StorageMode,
    cache_mode: CacheMode,
    database_url: Option<String>,
    redis_url: Option<String>,
    idempotency: Option<IdempotencyStoreConfig>,
}

impl RepositoryConfigBuilder {
    /// Sets the storage mode.
    #[must_use]
    pub const fn storage_mode(mut self, mode: StorageMode) -> Self {
        self.storage_mode = mode;
        self
    }

    /// Sets the cache mode.
    #[must_use]
    pub const fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    /// Sets the `PostgreSQL` database URL.
    #[must_use]
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Sets the Redis URL.
    #[must_use]
    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    /// Sets the idempotency TTL configuration.
    #[must_use]
    pub const fn idempotency(mut self, config: IdempotencyStoreConfig) -> Self {
        self.idempotency = Some(config);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the configuration is invalid.
    pub fn build(self) -> Result<RepositoryConfig, ConfigurationError> {
        let config = RepositoryConfig {
            storage_mode: self.storage_mode,
            cache_mode: self.cache_mode,
            database_url: self.database_url,
            redis_url: self.redis_url,
            idempotency: self.idempotency.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during factory configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Invalid storage mode value.
    #[error("Invalid storage mode: '{0}'. Expected 'in_memory' or 'postgres'")]
    InvalidStorageMode(String),

    /// Invalid cache mode value.
    #[error("Invalid cache mode: '{0}'. Expected 'in_memory' or 'redis'")]
    InvalidCacheMode(String),

    /// Missing `DATABASE_URL` when storage mode is Postgres.
    #[error("DATABASE_URL environment variable is required when STORAGE_MODE=postgres")]
    MissingDatabaseUrl,

    /// Missing `REDIS_URL` when cache mode is Redis.
    #[error("REDIS_URL environment variable is required when CACHE_MODE=redis")]
    MissingRedisUrl,
}

/// Errors that can occur during factory initialization.
#[derive(Debug, Error)]
pub enum FactoryError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    DatabaseConnection(String),

    /// Redis connection error.
    #[error("Redis connection error: {0}")]
    RedisConnection(String),
}

// =============================================================================
// Repository Factory
// =============================================================================

/// Collection of initialized repositories and stores.
///
/// All members are trait objects wrapped in `Arc` so the application state
/// can be cloned across handlers regardless of backend.
#[derive(Clone)]
pub struct Repositories {
    /// Fund repository.
    pub fund_repository: Arc<dyn FundRepository>,
    /// Deal repository.
    pub deal_repository: Arc<dyn DealRepository>,
    /// Scenario repository.
    pub scenario_repository: Arc<dyn ScenarioRepository>,
    /// Variance repository.
    pub variance_repository: Arc<dyn VarianceRepository>,
    /// Idempotency record store.
    pub idempotency_store: Arc<dyn IdempotencyStore>,
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Repositories")
            .field("fund_repository", &"Arc<dyn FundRepository>")
            .field("deal_repository", &"Arc<dyn DealRepository>")
            .field("scenario_repository", &"Arc<dyn ScenarioRepository>")
            .field("variance_repository", &"Arc<dyn VarianceRepository>")
            .field("idempotency_store", &"Arc<dyn IdempotencyStore>")
            .finish()
    }
}

/// Factory for creating repositories based on configuration.
#[derive(Debug, Clone)]
pub struct RepositoryFactory {
    config: RepositoryConfig,
}

impl RepositoryFactory {
    /// Creates a new repository factory with the given configuration.
    #[must_use]
    pub const fn new(config: RepositoryConfig) -> Self {
        Self { config }
    }

    /// Creates a new repository factory from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `FactoryError::Configuration` if environment configuration is
    /// invalid.
    pub fn from_env() -> Result<Self, FactoryError> {
        let config = RepositoryConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Returns the configuration used by this factory.
    #[must_use]
    pub const fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Creates all repositories based on the configuration.
    ///
    /// # Errors
    ///
    /// Returns `FactoryError` if:
    /// - Database connection fails (when `storage_mode` is `Postgres`)
    /// - Redis pool creation fails (when `cache_mode` is `Redis`)
    pub async fn create(&self) -> Result<Repositories, FactoryError> {
        let idempotency_store = self.create_idempotency_store()?;

        match self.config.storage_mode {
            StorageMode::InMemory => Ok(Repositories {
                fund_repository: Arc::new(InMemoryFundRepository::new()),
                deal_repository: Arc::new(InMemoryDealRepository::new()),
                scenario_repository: Arc::new(InMemoryScenarioRepository::new()),
                variance_repository: Arc::new(InMemoryVarianceRepository::new()),
                idempotency_store,
            }),
            StorageMode::Postgres => {
                let pool = self.create_postgres_pool().await?;
                Ok(Repositories {
                    fund_repository: Arc::new(PostgresFundRepository::new(pool.clone())),
                    deal_repository: Arc::new(PostgresDealRepository::new(pool.clone())),
                    scenario_repository: Arc::new(PostgresScenarioRepository::new(pool.clone())),
                    variance_repository: Arc::new(PostgresVarianceRepository::new(pool)),
                    idempotency_store,
                })
            }
        }
    }

    /// Creates a `PostgreSQL` connection pool.
    async fn create_postgres_pool(&self) -> Result<PgPool, FactoryError> {
        let database_url = self
            .config
            .database_url
            .as_ref()
            .ok_or(ConfigurationError::MissingDatabaseUrl)?;

        PgPool::connect(database_url)
            .await
            .map_err(|error| FactoryError::DatabaseConnection(error.to_string()))
    }

    /// Creates the idempotency store for the configured cache mode.
    fn create_idempotency_store(&self) -> Result<Arc<dyn IdempotencyStore>, FactoryError> {
        match self.config.cache_mode {
            CacheMode::InMemory => Ok(Arc::new(InMemoryIdempotencyStore::new(
                self.config.idempotency,
            ))),
            CacheMode::Redis => {
                let redis_url = self
                    .config
                    .redis_url
                    .as_ref()
                    .ok_or(ConfigurationError::MissingRedisUrl)?;

                let pool = deadpool_redis::Config::from_url(redis_url)
                    .create_pool(Some(Runtime::Tokio1))
                    .map_err(|error| FactoryError::RedisConnection(error.to_string()))?;

                Ok(Arc::new(RedisIdempotencyStore::new(
                    pool,
                    self.config.idempotency,
                )))
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
