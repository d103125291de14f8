use std::sync::RwLock;

use async_trait::async_trait;
use metahub_core::LogEntry;
use metahub_store::log::LogQuery;
use metahub_store::{LogStore, StoreError};

/// In-memory [`LogStore`]: an append-only vector.
#[derive(Default)]
pub struct MemoryLogStore {
    rows: RwLock<Vec<LogEntry>>,
}

impl MemoryLogStore {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn append(&self, entry: LogEntry) -> Result<(), StoreError> {
        self.rows.write().expect("log sink poisoned").push(entry);
        Ok(())
    }

    async fn query(&self, query: &LogQuery) -> Result<Vec<LogEntry>, StoreError> {
        let rows = self.rows.read().expect("log sink poisoned");
        let needle = query.search.as_ref().map(|s| s.to_lowercase());
        let mut out: Vec<LogEntry> = rows
            .iter()
            .filter(|e| {
                query.tenant.as_ref().is_none_or(|t| e.tenant == *t)
                    && query.level.is_none_or(|l| e.level == l)
                    && query.category.is_none_or(|c| e.category == c)
                    && needle
                        .as_ref()
                        .is_none_or(|n| e.message.to_lowercase().contains(n))
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(query.effective_limit());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use metahub_core::{LogCategory, LogLevel, TenantId};

    use super::*;

    #[tokio::test]
    async fn query_filters_and_searches() {
        let sink = MemoryLogStore::new();
        sink.append(LogEntry::new("ws-1", LogLevel::Info, LogCategory::Webhook, "webhook.received", "Envelope received"))
            .await
            .unwrap();
        sink.append(LogEntry::new("ws-1", LogLevel::Error, LogCategory::Delivery, "delivery.failed", "HTTP 500 from endpoint"))
            .await
            .unwrap();
        sink.append(LogEntry::new("ws-2", LogLevel::Info, LogCategory::Webhook, "webhook.received", "other tenant"))
            .await
            .unwrap();

        let all = sink
            .query(&LogQuery {
                tenant: Some(TenantId::new("ws-1")),
                ..LogQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let errors = sink
            .query(&LogQuery {
                tenant: Some(TenantId::new("ws-1")),
                level: Some(LogLevel::Error),
                ..LogQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].action, "delivery.failed");

        let search = sink
            .query(&LogQuery {
                search: Some("http 500".into()),
                ..LogQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(search.len(), 1);
    }
}
