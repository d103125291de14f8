//! Outbound delivery: the destination HTTP client, the retry/DLQ worker
//! and the bounded per-tenant task pool.

pub mod backoff;
pub mod client;
pub mod error;
pub mod pool;
pub mod worker;

#[cfg(test)]
mod testing;

pub use backoff::{BASE_BACKOFF_MS, MAX_BACKOFF_MS, backoff_ms};
pub use client::{AttemptResult, DestinationClient, MAX_RESPONSE_BYTES};
pub use error::DeliveryError;
pub use pool::{DEFAULT_PERMITS_PER_TENANT, TenantTaskPool};
pub use worker::{CLAIM_BATCH_SIZE, DeliveryWorker, ProcessSummary, ResendOutcome, sample_payload};
