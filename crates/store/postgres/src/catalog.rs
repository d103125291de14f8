use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use metahub_core::{
    Destination, DestinationId, Integration, IntegrationId, Mapping, MappingId, Route, RouteId,
    SourceType, TenantId,
};
use metahub_store::{DestinationStore, IntegrationStore, MappingStore, RouteStore, StoreError};

use crate::rows::{db_err, enum_str, from_json, parse_enum, to_json};

/// Postgres-backed [`DestinationStore`].
pub struct PostgresDestinationStore {
    pool: PgPool,
}

impl PostgresDestinationStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DestinationRow {
    id: String,
    tenant: String,
    name: String,
    url: String,
    method: String,
    headers: serde_json::Value,
    auth: serde_json::Value,
    timeout_ms: i64,
    is_active: bool,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<DestinationRow> for Destination {
    type Error = StoreError;

    fn try_from(row: DestinationRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: DestinationId::new(row.id),
            tenant: TenantId::new(row.tenant),
            name: row.name,
            url: row.url,
            method: parse_enum(&row.method)?,
            headers: from_json(row.headers)?,
            auth: from_json(row.auth)?,
            timeout_ms: u64::try_from(row.timeout_ms.max(0)).unwrap_or(0),
            is_active: row.is_active,
            deleted_at: row.deleted_at,
            created_at: row.created_at,
        })
    }
}

const DESTINATION_COLUMNS: &str =
    "id, tenant, name, url, method, headers, auth, timeout_ms, is_active, deleted_at, created_at";

#[async_trait]
impl DestinationStore for PostgresDestinationStore {
    async fn create(&self, destination: Destination) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO mh_destinations \
             (id, tenant, name, url, method, headers, auth, timeout_ms, is_active, deleted_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(destination.id.as_str())
        .bind(destination.tenant.as_str())
        .bind(&destination.name)
        .bind(&destination.url)
        .bind(enum_str(&destination.method)?)
        .bind(to_json(&destination.headers)?)
        .bind(to_json(&destination.auth)?)
        .bind(i64::try_from(destination.timeout_ms).unwrap_or(i64::MAX))
        .bind(destination.is_active)
        .bind(destination.deleted_at)
        .bind(destination.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, id: &DestinationId) -> Result<Option<Destination>, StoreError> {
        let row: Option<DestinationRow> = sqlx::query_as(&format!(
            "SELECT {DESTINATION_COLUMNS} FROM mh_destinations WHERE id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(Destination::try_from).transpose()
    }

    async fn list_by_tenant(&self, tenant: &TenantId) -> Result<Vec<Destination>, StoreError> {
        let rows: Vec<DestinationRow> = sqlx::query_as(&format!(
            "SELECT {DESTINATION_COLUMNS} FROM mh_destinations \
             WHERE tenant = $1 AND deleted_at IS NULL ORDER BY created_at ASC"
        ))
        .bind(tenant.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(Destination::try_from).collect()
    }

    async fn soft_delete(&self, id: &DestinationId) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE mh_destinations SET deleted_at = $2, is_active = FALSE WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("destination {id}")));
        }
        Ok(())
    }
}

/// Postgres-backed [`MappingStore`].
pub struct PostgresMappingStore {
    pool: PgPool,
}

impl PostgresMappingStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct MappingRow {
    id: String,
    tenant: String,
    name: String,
    mode: String,
    rules: serde_json::Value,
    template: Option<String>,
    static_fields: serde_json::Value,
    pass_through: bool,
    source_type: String,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MappingRow> for Mapping {
    type Error = StoreError;

    fn try_from(row: MappingRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: MappingId::new(row.id),
            tenant: TenantId::new(row.tenant),
            name: row.name,
            mode: parse_enum(&row.mode)?,
            rules: from_json(row.rules)?,
            template: row.template,
            static_fields: from_json(row.static_fields)?,
            pass_through: row.pass_through,
            source_type: parse_enum(&row.source_type)?,
            deleted_at: row.deleted_at,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl MappingStore for PostgresMappingStore {
    async fn create(&self, mapping: Mapping) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO mh_mappings \
             (id, tenant, name, mode, rules, template, static_fields, pass_through, source_type, deleted_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(mapping.id.as_str())
        .bind(mapping.tenant.as_str())
        .bind(&mapping.name)
        .bind(enum_str(&mapping.mode)?)
        .bind(to_json(&mapping.rules)?)
        .bind(&mapping.template)
        .bind(to_json(&mapping.static_fields)?)
        .bind(mapping.pass_through)
        .bind(enum_str(&mapping.source_type)?)
        .bind(mapping.deleted_at)
        .bind(mapping.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, id: &MappingId) -> Result<Option<Mapping>, StoreError> {
        let row: Option<MappingRow> = sqlx::query_as(
            "SELECT id, tenant, name, mode, rules, template, static_fields, pass_through, \
             source_type, deleted_at, created_at \
             FROM mh_mappings WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(Mapping::try_from).transpose()
    }

    async fn soft_delete(&self, id: &MappingId) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE mh_mappings SET deleted_at = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("mapping {id}")));
        }
        Ok(())
    }
}

/// Postgres-backed [`RouteStore`].
pub struct PostgresRouteStore {
    pool: PgPool,
}

impl PostgresRouteStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RouteRow {
    id: String,
    tenant: String,
    source_type: String,
    source_id: Option<String>,
    destination_id: String,
    mapping_id: Option<String>,
    filter_rules: Option<serde_json::Value>,
    priority: i32,
    is_active: bool,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<RouteRow> for Route {
    type Error = StoreError;

    fn try_from(row: RouteRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: RouteId::new(row.id),
            tenant: TenantId::new(row.tenant),
            source_type: parse_enum(&row.source_type)?,
            source_id: row.source_id,
            destination_id: row.destination_id.into(),
            mapping_id: row.mapping_id.map(MappingId::new),
            filter_rules: row.filter_rules.map(from_json).transpose()?,
            priority: u8::try_from(row.priority.clamp(0, 100)).unwrap_or(0),
            is_active: row.is_active,
            deleted_at: row.deleted_at,
            created_at: row.created_at,
        })
    }
}

const ROUTE_COLUMNS: &str = "id, tenant, source_type, source_id, destination_id, mapping_id, \
     filter_rules, priority, is_active, deleted_at, created_at";

#[async_trait]
impl RouteStore for PostgresRouteStore {
    async fn create(&self, route: Route) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO mh_routes \
             (id, tenant, source_type, source_id, destination_id, mapping_id, filter_rules, \
              priority, is_active, deleted_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(route.id.as_str())
        .bind(route.tenant.as_str())
        .bind(enum_str(&route.source_type)?)
        .bind(&route.source_id)
        .bind(route.destination_id.as_str())
        .bind(route.mapping_id.as_ref().map(MappingId::as_str))
        .bind(route.filter_rules.as_ref().map(to_json).transpose()?)
        .bind(i32::from(route.priority))
        .bind(route.is_active)
        .bind(route.deleted_at)
        .bind(route.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, id: &RouteId) -> Result<Option<Route>, StoreError> {
        let row: Option<RouteRow> =
            sqlx::query_as(&format!("SELECT {ROUTE_COLUMNS} FROM mh_routes WHERE id = $1"))
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        row.map(Route::try_from).transpose()
    }

    async fn list_for_source(
        &self,
        tenant: &TenantId,
        source_type: SourceType,
    ) -> Result<Vec<Route>, StoreError> {
        let rows: Vec<RouteRow> = sqlx::query_as(&format!(
            "SELECT {ROUTE_COLUMNS} FROM mh_routes WHERE tenant = $1 AND source_type = $2"
        ))
        .bind(tenant.as_str())
        .bind(enum_str(&source_type)?)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(Route::try_from).collect()
    }

    async fn list_for_source_all(&self, source_type: SourceType) -> Result<Vec<Route>, StoreError> {
        let rows: Vec<RouteRow> = sqlx::query_as(&format!(
            "SELECT {ROUTE_COLUMNS} FROM mh_routes WHERE source_type = $1"
        ))
        .bind(enum_str(&source_type)?)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(Route::try_from).collect()
    }

    async fn deactivate_for_destination(
        &self,
        destination_id: &DestinationId,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE mh_routes SET is_active = FALSE WHERE destination_id = $1 AND is_active",
        )
        .bind(destination_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn detach_mapping(&self, mapping_id: &MappingId) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE mh_routes SET mapping_id = NULL WHERE mapping_id = $1")
            .bind(mapping_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}

/// Postgres-backed [`IntegrationStore`].
pub struct PostgresIntegrationStore {
    pool: PgPool,
}

impl PostgresIntegrationStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IntegrationStore for PostgresIntegrationStore {
    async fn upsert(&self, integration: Integration) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO mh_integrations \
             (tenant, id, access_token, scopes, resources, last_synced_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (tenant) DO UPDATE SET \
                 id = EXCLUDED.id, \
                 access_token = EXCLUDED.access_token, \
                 scopes = EXCLUDED.scopes, \
                 resources = EXCLUDED.resources, \
                 last_synced_at = EXCLUDED.last_synced_at",
        )
        .bind(integration.tenant.as_str())
        .bind(integration.id.as_str())
        .bind(&integration.access_token)
        .bind(to_json(&integration.scopes)?)
        .bind(to_json(&integration.resources)?)
        .bind(integration.last_synced_at)
        .bind(integration.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_by_tenant(&self, tenant: &TenantId) -> Result<Option<Integration>, StoreError> {
        let row: Option<(String, String, serde_json::Value, serde_json::Value, Option<DateTime<Utc>>, DateTime<Utc>)> =
            sqlx::query_as(
                "SELECT id, access_token, scopes, resources, last_synced_at, created_at \
                 FROM mh_integrations WHERE tenant = $1",
            )
            .bind(tenant.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(|(id, access_token, scopes, resources, last_synced_at, created_at)| {
            Ok(Integration {
                id: IntegrationId::new(id),
                tenant: tenant.clone(),
                access_token,
                scopes: from_json(scopes)?,
                resources: from_json(resources)?,
                last_synced_at,
                created_at,
            })
        })
        .transpose()
    }
}
