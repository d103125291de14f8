//! PostgreSQL storage backend.
//!
//! Connects with `sqlx::PgPool`, runs idempotent migrations at startup and
//! exposes the same repository semantics as the in-memory backend. All
//! queries are built at runtime in the style of the rest of the workspace;
//! there is no compile-time query checking to keep the build independent of
//! a live database.

pub mod alert;
pub mod catalog;
pub mod config;
pub mod event;
pub mod log;
pub mod migrations;
mod rows;

use std::sync::Arc;

use sqlx::PgPool;

use metahub_store::{StoreError, Stores};

pub use alert::PostgresAlertStore;
pub use catalog::{
    PostgresDestinationStore, PostgresIntegrationStore, PostgresMappingStore, PostgresRouteStore,
};
pub use config::PostgresConfig;
pub use event::PostgresEventStore;
pub use log::PostgresLogStore;

/// Connect to Postgres, run migrations and build the [`Stores`] bundle.
pub async fn connect(config: &PostgresConfig) -> Result<Stores, StoreError> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.pool_size)
        .connect(&config.url)
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))?;

    migrations::run_migrations(&pool).await?;
    tracing::info!(pool_size = config.pool_size, "postgres store initialized");
    Ok(stores_from_pool(pool))
}

/// Build the [`Stores`] bundle over an existing pool. Does not run
/// migrations; use [`connect`] for the full startup path.
#[must_use]
pub fn stores_from_pool(pool: PgPool) -> Stores {
    Stores {
        events: Arc::new(PostgresEventStore::new(pool.clone())),
        destinations: Arc::new(PostgresDestinationStore::new(pool.clone())),
        mappings: Arc::new(PostgresMappingStore::new(pool.clone())),
        routes: Arc::new(PostgresRouteStore::new(pool.clone())),
        integrations: Arc::new(PostgresIntegrationStore::new(pool.clone())),
        logs: Arc::new(PostgresLogStore::new(pool.clone())),
        alerts: Arc::new(PostgresAlertStore::new(pool)),
    }
}
