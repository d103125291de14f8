use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use metahub_core::{
    Destination, DestinationId, Integration, Mapping, MappingId, Route, RouteId, SourceType,
    TenantId,
};
use metahub_store::{DestinationStore, IntegrationStore, MappingStore, RouteStore, StoreError};

/// In-memory [`DestinationStore`].
#[derive(Default)]
pub struct MemoryDestinationStore {
    rows: RwLock<HashMap<DestinationId, Destination>>,
}

impl MemoryDestinationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DestinationStore for MemoryDestinationStore {
    async fn create(&self, destination: Destination) -> Result<(), StoreError> {
        self.rows
            .write()
            .expect("destination map poisoned")
            .insert(destination.id.clone(), destination);
        Ok(())
    }

    async fn get(&self, id: &DestinationId) -> Result<Option<Destination>, StoreError> {
        Ok(self.rows.read().expect("destination map poisoned").get(id).cloned())
    }

    async fn list_by_tenant(&self, tenant: &TenantId) -> Result<Vec<Destination>, StoreError> {
        let rows = self.rows.read().expect("destination map poisoned");
        let mut out: Vec<Destination> = rows
            .values()
            .filter(|d| d.tenant == *tenant && d.deleted_at.is_none())
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn soft_delete(&self, id: &DestinationId) -> Result<(), StoreError> {
        let mut rows = self.rows.write().expect("destination map poisoned");
        let row = rows
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("destination {id}")))?;
        row.deleted_at = Some(Utc::now());
        row.is_active = false;
        Ok(())
    }
}

/// In-memory [`MappingStore`].
#[derive(Default)]
pub struct MemoryMappingStore {
    rows: RwLock<HashMap<MappingId, Mapping>>,
}

impl MemoryMappingStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MappingStore for MemoryMappingStore {
    async fn create(&self, mapping: Mapping) -> Result<(), StoreError> {
        self.rows
            .write()
            .expect("mapping map poisoned")
            .insert(mapping.id.clone(), mapping);
        Ok(())
    }

    async fn get(&self, id: &MappingId) -> Result<Option<Mapping>, StoreError> {
        Ok(self
            .rows
            .read()
            .expect("mapping map poisoned")
            .get(id)
            .filter(|m| m.deleted_at.is_none())
            .cloned())
    }

    async fn soft_delete(&self, id: &MappingId) -> Result<(), StoreError> {
        let mut rows = self.rows.write().expect("mapping map poisoned");
        let row = rows
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("mapping {id}")))?;
        row.deleted_at = Some(Utc::now());
        Ok(())
    }
}

/// In-memory [`RouteStore`].
#[derive(Default)]
pub struct MemoryRouteStore {
    rows: RwLock<HashMap<RouteId, Route>>,
}

impl MemoryRouteStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RouteStore for MemoryRouteStore {
    async fn create(&self, route: Route) -> Result<(), StoreError> {
        self.rows
            .write()
            .expect("route map poisoned")
            .insert(route.id.clone(), route);
        Ok(())
    }

    async fn get(&self, id: &RouteId) -> Result<Option<Route>, StoreError> {
        Ok(self.rows.read().expect("route map poisoned").get(id).cloned())
    }

    async fn list_for_source(
        &self,
        tenant: &TenantId,
        source_type: SourceType,
    ) -> Result<Vec<Route>, StoreError> {
        let rows = self.rows.read().expect("route map poisoned");
        Ok(rows
            .values()
            .filter(|r| r.tenant == *tenant && r.source_type == source_type)
            .cloned()
            .collect())
    }

    async fn list_for_source_all(&self, source_type: SourceType) -> Result<Vec<Route>, StoreError> {
        let rows = self.rows.read().expect("route map poisoned");
        Ok(rows
            .values()
            .filter(|r| r.source_type == source_type)
            .cloned()
            .collect())
    }

    async fn deactivate_for_destination(
        &self,
        destination_id: &DestinationId,
    ) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().expect("route map poisoned");
        let mut touched = 0;
        for route in rows.values_mut() {
            if route.destination_id == *destination_id && route.is_active {
                route.is_active = false;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn detach_mapping(&self, mapping_id: &MappingId) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().expect("route map poisoned");
        let mut touched = 0;
        for route in rows.values_mut() {
            if route.mapping_id.as_ref() == Some(mapping_id) {
                route.mapping_id = None;
                touched += 1;
            }
        }
        Ok(touched)
    }
}

/// In-memory [`IntegrationStore`].
#[derive(Default)]
pub struct MemoryIntegrationStore {
    rows: RwLock<HashMap<TenantId, Integration>>,
}

impl MemoryIntegrationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IntegrationStore for MemoryIntegrationStore {
    async fn upsert(&self, integration: Integration) -> Result<(), StoreError> {
        self.rows
            .write()
            .expect("integration map poisoned")
            .insert(integration.tenant.clone(), integration);
        Ok(())
    }

    async fn get_by_tenant(&self, tenant: &TenantId) -> Result<Option<Integration>, StoreError> {
        Ok(self
            .rows
            .read()
            .expect("integration map poisoned")
            .get(tenant)
            .cloned())
    }
}
