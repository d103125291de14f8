use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use metahub_core::{LogEntry, TenantId};
use metahub_store::log::LogQuery;
use metahub_store::{LogStore, StoreError};

use crate::rows::{db_err, enum_str, parse_enum};

/// Postgres-backed [`LogStore`].
pub struct PostgresLogStore {
    pool: PgPool,
}

impl PostgresLogStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct LogRow {
    id: String,
    tenant: String,
    level: String,
    category: String,
    action: String,
    message: String,
    resource: Option<String>,
    metadata: serde_json::Value,
    duration_ms: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<LogRow> for LogEntry {
    type Error = StoreError;

    fn try_from(row: LogRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.id,
            tenant: TenantId::new(row.tenant),
            level: parse_enum(&row.level)?,
            category: parse_enum(&row.category)?,
            action: row.action,
            message: row.message,
            resource: row.resource,
            metadata: row.metadata,
            duration_ms: row.duration_ms.and_then(|d| u64::try_from(d).ok()),
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl LogStore for PostgresLogStore {
    async fn append(&self, entry: LogEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO mh_event_logs \
             (id, tenant, level, category, action, message, resource, metadata, duration_ms, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&entry.id)
        .bind(entry.tenant.as_str())
        .bind(enum_str(&entry.level)?)
        .bind(enum_str(&entry.category)?)
        .bind(&entry.action)
        .bind(&entry.message)
        .bind(&entry.resource)
        .bind(&entry.metadata)
        .bind(entry.duration_ms.and_then(|d| i64::try_from(d).ok()))
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn query(&self, query: &LogQuery) -> Result<Vec<LogEntry>, StoreError> {
        let level = query.level.as_ref().map(enum_str).transpose()?;
        let category = query.category.as_ref().map(enum_str).transpose()?;
        let search = query.search.as_ref().map(|s| format!("%{s}%"));

        let rows: Vec<LogRow> = sqlx::query_as(
            "SELECT id, tenant, level, category, action, message, resource, metadata, \
             duration_ms, created_at \
             FROM mh_event_logs \
             WHERE ($1::text IS NULL OR tenant = $1) \
               AND ($2::text IS NULL OR level = $2) \
               AND ($3::text IS NULL OR category = $3) \
               AND ($4::text IS NULL OR message ILIKE $4) \
             ORDER BY created_at DESC LIMIT $5",
        )
        .bind(query.tenant.as_ref().map(TenantId::as_str))
        .bind(level)
        .bind(category)
        .bind(search)
        .bind(i64::try_from(query.effective_limit()).unwrap_or(50))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(LogEntry::try_from).collect()
    }
}
