//! Repository traits for MetaHub storage backends.
//!
//! The pipeline depends only on these traits; `metahub-store-memory` and
//! `metahub-store-postgres` provide the implementations. Conditional status
//! updates on delivery events are the single concurrency-control primitive:
//! a [`StoreError::Conflict`] means another worker won the claim.

pub mod alert;
pub mod catalog;
pub mod error;
pub mod event;
pub mod log;

use std::sync::Arc;

pub use alert::AlertStore;
pub use catalog::{DestinationStore, IntegrationStore, MappingStore, RouteStore};
pub use error::StoreError;
pub use event::{AttemptOutcome, EventStore, EventWindowStats, TransitionUpdate};
pub use log::{LogQuery, LogStore};

/// The full set of repositories a backend provides, shared across the
/// pipeline components.
#[derive(Clone)]
pub struct Stores {
    pub events: Arc<dyn EventStore>,
    pub destinations: Arc<dyn DestinationStore>,
    pub mappings: Arc<dyn MappingStore>,
    pub routes: Arc<dyn RouteStore>,
    pub integrations: Arc<dyn IntegrationStore>,
    pub logs: Arc<dyn LogStore>,
    pub alerts: Arc<dyn AlertStore>,
}
