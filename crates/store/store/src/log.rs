use async_trait::async_trait;
use metahub_core::{LogCategory, LogEntry, LogLevel, TenantId};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Query parameters for reading the log sink.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogQuery {
    /// Tenant whose logs to read.
    pub tenant: Option<TenantId>,
    /// Filter by severity.
    pub level: Option<LogLevel>,
    /// Filter by functional area.
    pub category: Option<LogCategory>,
    /// Case-insensitive substring match on the message.
    pub search: Option<String>,
    /// Maximum rows to return (default 50, clamped to 1..=1000).
    pub limit: Option<u32>,
}

impl LogQuery {
    /// Return the effective limit, clamped to 1..=1000, defaulting to 50.
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(50).clamp(1, 1000) as usize
    }
}

/// Append-only structured log sink. There is deliberately no deletion API;
/// retention is a deployment concern.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Append a record.
    async fn append(&self, entry: LogEntry) -> Result<(), StoreError>;

    /// Read records matching the query, newest first.
    async fn query(&self, query: &LogQuery) -> Result<Vec<LogEntry>, StoreError>;
}
