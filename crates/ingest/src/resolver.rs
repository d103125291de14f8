//! Route resolution: which routes does an inbound identifier hit.

use std::cmp::Ordering;
use std::sync::Arc;

use metahub_core::{Route, SourceType, TenantId};
use metahub_store::{RouteStore, StoreError};

/// Resolves inbound `(source_type, source_id)` pairs to ordered route
/// lists.
#[derive(Clone)]
pub struct RouteResolver {
    routes: Arc<dyn RouteStore>,
}

impl RouteResolver {
    /// Create a resolver over a route store.
    #[must_use]
    pub fn new(routes: Arc<dyn RouteStore>) -> Self {
        Self { routes }
    }

    /// Matching routes of one tenant: active, not soft-deleted, source type
    /// equal, and either bound to exactly `source_id` or catch-all. Sorted
    /// by priority descending, creation time ascending.
    pub async fn resolve(
        &self,
        tenant: &TenantId,
        source_type: SourceType,
        source_id: Option<&str>,
    ) -> Result<Vec<Route>, StoreError> {
        let routes = self.routes.list_for_source(tenant, source_type).await?;
        Ok(Self::match_and_order(routes, source_id))
    }

    /// Matching routes across every tenant, grouped implicitly by the sort
    /// order. The webhook receiver uses this because Meta's envelope does
    /// not carry a tenant; the inbound identifier (or a catch-all route)
    /// is what binds traffic to a workspace.
    pub async fn resolve_global(
        &self,
        source_type: SourceType,
        source_id: Option<&str>,
    ) -> Result<Vec<Route>, StoreError> {
        let routes = self.routes.list_for_source_all(source_type).await?;
        Ok(Self::match_and_order(routes, source_id))
    }

    fn match_and_order(routes: Vec<Route>, source_id: Option<&str>) -> Vec<Route> {
        let mut matched: Vec<Route> = routes
            .into_iter()
            .filter(|r| r.is_matchable())
            .filter(|r| match (&r.source_id, source_id) {
                // Catch-all matches everything.
                (None, _) => true,
                (Some(bound), Some(inbound)) => bound == inbound,
                (Some(_), None) => false,
            })
            .collect();
        matched.sort_by(|a, b| match (a.tenant.cmp(&b.tenant), b.priority.cmp(&a.priority)) {
            (Ordering::Equal, Ordering::Equal) => a.created_at.cmp(&b.created_at),
            (Ordering::Equal, by_priority) => by_priority,
            (by_tenant, _) => by_tenant,
        });
        matched
    }
}
