//! Configuration entities: destinations, mappings, routes, integrations.

use async_trait::async_trait;
use metahub_core::{
    Destination, DestinationId, Integration, Mapping, MappingId, Route, RouteId, SourceType,
    TenantId,
};

use crate::error::StoreError;

/// Customer-owned HTTP endpoints.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Persist a destination.
    async fn create(&self, destination: Destination) -> Result<(), StoreError>;

    /// Fetch a destination by id. Soft-deleted rows are returned so the
    /// worker can distinguish "inactive" from "never existed".
    async fn get(&self, id: &DestinationId) -> Result<Option<Destination>, StoreError>;

    /// Destinations of a tenant, excluding soft-deleted ones.
    async fn list_by_tenant(&self, tenant: &TenantId) -> Result<Vec<Destination>, StoreError>;

    /// Soft-delete a destination. The caller is responsible for the route
    /// cascade (see [`RouteStore::deactivate_for_destination`]).
    async fn soft_delete(&self, id: &DestinationId) -> Result<(), StoreError>;
}

/// Reusable payload transformations.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Persist a mapping.
    async fn create(&self, mapping: Mapping) -> Result<(), StoreError>;

    /// Fetch a mapping by id; soft-deleted mappings behave as absent.
    async fn get(&self, id: &MappingId) -> Result<Option<Mapping>, StoreError>;

    /// Soft-delete a mapping. The caller is responsible for detaching it
    /// from routes (see [`RouteStore::detach_mapping`]).
    async fn soft_delete(&self, id: &MappingId) -> Result<(), StoreError>;
}

/// Source-to-destination bindings.
#[async_trait]
pub trait RouteStore: Send + Sync {
    /// Persist a route.
    async fn create(&self, route: Route) -> Result<(), StoreError>;

    /// Fetch a route by id.
    async fn get(&self, id: &RouteId) -> Result<Option<Route>, StoreError>;

    /// All routes of a tenant for a source type, active or not. The
    /// resolver applies matchability and ordering on top.
    async fn list_for_source(
        &self,
        tenant: &TenantId,
        source_type: SourceType,
    ) -> Result<Vec<Route>, StoreError>;

    /// All routes for a source type across every tenant. The webhook
    /// receiver uses this to discover which tenants an inbound identifier
    /// belongs to; Meta does not tell us.
    async fn list_for_source_all(&self, source_type: SourceType) -> Result<Vec<Route>, StoreError>;

    /// Cascade of a destination delete: deactivate every route that
    /// references it. Returns the number of routes touched.
    async fn deactivate_for_destination(
        &self,
        destination_id: &DestinationId,
    ) -> Result<u64, StoreError>;

    /// Cascade of a mapping delete: detach it from every route, leaving the
    /// routes active with pass-through behaviour. Returns the number of
    /// routes touched.
    async fn detach_mapping(&self, mapping_id: &MappingId) -> Result<u64, StoreError>;
}

/// Stored Meta OAuth integrations.
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    /// Insert or replace the integration of a tenant.
    async fn upsert(&self, integration: Integration) -> Result<(), StoreError>;

    /// Fetch the integration of a tenant.
    async fn get_by_tenant(&self, tenant: &TenantId) -> Result<Option<Integration>, StoreError>;
}
