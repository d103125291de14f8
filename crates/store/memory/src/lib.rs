//! In-memory storage backend.
//!
//! Suitable for tests and single-process development; a restart loses
//! everything. Production deployments use `metahub-store-postgres`.

pub mod alert;
pub mod catalog;
pub mod event;
pub mod log;

use std::sync::Arc;

use metahub_store::Stores;

pub use alert::MemoryAlertStore;
pub use catalog::{
    MemoryDestinationStore, MemoryIntegrationStore, MemoryMappingStore, MemoryRouteStore,
};
pub use event::MemoryEventStore;
pub use log::MemoryLogStore;

/// Build a fresh, empty in-memory [`Stores`] bundle.
#[must_use]
pub fn memory_stores() -> Stores {
    Stores {
        events: Arc::new(MemoryEventStore::new()),
        destinations: Arc::new(MemoryDestinationStore::new()),
        mappings: Arc::new(MemoryMappingStore::new()),
        routes: Arc::new(MemoryRouteStore::new()),
        integrations: Arc::new(MemoryIntegrationStore::new()),
        logs: Arc::new(MemoryLogStore::new()),
        alerts: Arc::new(MemoryAlertStore::new()),
    }
}
