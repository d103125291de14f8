//! Bounded per-tenant task pool for receiver-triggered deliveries.
//!
//! The webhook receiver never runs a delivery on the acceptor task; it
//! hands the work to this pool, which caps concurrent outbound calls per
//! tenant so a noisy tenant cannot starve the others.

use std::sync::Arc;

use dashmap::DashMap;
use metahub_core::TenantId;
use tokio::sync::Semaphore;
use tracing::warn;

/// Default cap of concurrent tasks per tenant.
pub const DEFAULT_PERMITS_PER_TENANT: usize = 32;

/// Per-tenant bounded task spawner.
#[derive(Clone)]
pub struct TenantTaskPool {
    permits_per_tenant: usize,
    semaphores: Arc<DashMap<TenantId, Arc<Semaphore>>>,
}

impl TenantTaskPool {
    /// Create a pool with the default per-tenant cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_permits(DEFAULT_PERMITS_PER_TENANT)
    }

    /// Create a pool with an explicit per-tenant cap.
    #[must_use]
    pub fn with_permits(permits_per_tenant: usize) -> Self {
        Self {
            permits_per_tenant: permits_per_tenant.max(1),
            semaphores: Arc::new(DashMap::new()),
        }
    }

    /// Spawn `task` for a tenant. The task waits for one of the tenant's
    /// permits inside the spawned future, so this call never blocks.
    pub fn spawn<F>(&self, tenant: &TenantId, task: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let semaphore = self
            .semaphores
            .entry(tenant.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(self.permits_per_tenant)))
            .clone();
        let tenant = tenant.clone();
        tokio::spawn(async move {
            match semaphore.acquire_owned().await {
                Ok(_permit) => task.await,
                Err(_) => warn!(%tenant, "tenant task pool closed, dropping task"),
            }
        })
    }

    /// Permits currently available for a tenant (the full cap when the
    /// tenant has never spawned).
    pub fn available_permits(&self, tenant: &TenantId) -> usize {
        self.semaphores
            .get(tenant)
            .map_or(self.permits_per_tenant, |s| s.available_permits())
    }
}

impl Default for TenantTaskPool {
    fn default() -> Self {
        Self::new()
    }
}
