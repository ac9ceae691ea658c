use crate::config::AppConfig;
use crate::errors::ServiceError;
use metrics::{counter, gauge, histogram};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use utoipa::ToSchema;

pub type DbPool = DatabaseConnection;

/// The two independently owned stores a transfer spans.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Store {
    Warehouse,
    Pos,
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl DbConfig {
    pub fn for_store(cfg: &AppConfig, store: Store) -> Self {
        let url = match store {
            Store::Warehouse => cfg.warehouse_database_url.clone(),
            Store::Pos => cfg.pos_database_url.clone(),
        };
        Self {
            url,
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

pub async fn establish_connection_with_config(
    store: Store,
    config: &DbConfig,
) -> Result<DbPool, ServiceError> {
    debug!(%store, "Configuring database connection with: {:?}", config);

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    gauge!(
        "stock_transfer_db.max_connections",
        config.max_connections as f64,
        "store" => store.to_string()
    );

    let pool = Database::connect(opt).await.map_err(|e| {
        error!(%store, "Database connection failed: {}", e);
        ServiceError::DatabaseError(e)
    })?;

    info!(%store, "Database connection pool established");
    Ok(pool)
}

/// Connection pools for both stores.
///
/// There is no transaction spanning the two; every cross-store step is
/// written to be re-applied safely by the reconciliation loop.
#[derive(Debug, Clone)]
pub struct Stores {
    pub warehouse: DbPool,
    pub pos: DbPool,
}

impl Stores {
    pub fn new(warehouse: DbPool, pos: DbPool) -> Self {
        Self { warehouse, pos }
    }

    pub async fn connect(cfg: &AppConfig) -> Result<Self, ServiceError> {
        let warehouse = establish_connection_with_config(
            Store::Warehouse,
            &DbConfig::for_store(cfg, Store::Warehouse),
        )
        .await?;
        let pos =
            establish_connection_with_config(Store::Pos, &DbConfig::for_store(cfg, Store::Pos))
                .await?;
        Ok(Self { warehouse, pos })
    }

    pub fn get(&self, store: Store) -> &DbPool {
        match store {
            Store::Warehouse => &self.warehouse,
            Store::Pos => &self.pos,
        }
    }

    pub async fn run_migrations(&self) -> Result<(), ServiceError> {
        let start = Instant::now();
        let result = crate::migrator::run_all(&self.warehouse, &self.pos)
            .await
            .map_err(ServiceError::DatabaseError);
        histogram!("stock_transfer_db.migration.duration", start.elapsed());
        result
    }

    /// Pings one store, recording latency.
    pub async fn check_connection(&self, store: Store) -> Result<Duration, ServiceError> {
        let start = Instant::now();
        match self.get(store).ping().await {
            Ok(()) => {
                let elapsed = start.elapsed();
                debug!(%store, "Database connection check successful in {:?}", elapsed);
                gauge!(
                    "stock_transfer_db.connection_latency",
                    elapsed.as_millis() as f64,
                    "store" => store.to_string()
                );
                Ok(elapsed)
            }
            Err(e) => {
                error!(%store, "Database connection check failed: {}", e);
                counter!("stock_transfer_db.connection_failures", 1, "store" => store.to_string());
                Err(ServiceError::DatabaseError(e))
            }
        }
    }

    pub async fn close(self) {
        for (store, pool) in [(Store::Warehouse, self.warehouse), (Store::Pos, self.pos)] {
            if let Err(e) = pool.close().await {
                error!(%store, "Error closing database pool: {}", e);
            }
        }
    }
}
