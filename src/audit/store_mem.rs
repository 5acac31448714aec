use crate::audit::event::{EventFilter, SecurityEvent, TransactionAudit};
use crate::audit::logger::AuditStore;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

const DEFAULT_QUERY_LIMIT: i64 = 100;

/// Append-only in-process store for single-process and test use. Production
/// deployments use the Postgres store.
#[derive(Clone, Default)]
pub struct InMemoryAuditStore {
    events: Arc<Mutex<Vec<SecurityEvent>>>,
    transactions: Arc<Mutex<Vec<TransactionAudit>>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn transactions(&self) -> Vec<TransactionAudit> {
        self.transactions
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }
}

fn poisoned() -> anyhow::Error {
    anyhow::anyhow!("audit store lock poisoned")
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append_event(&self, event: &SecurityEvent) -> Result<()> {
        self.events.lock().map_err(|_| poisoned())?.push(event.clone());
        Ok(())
    }

    async fn append_transaction(&self, audit: &TransactionAudit) -> Result<()> {
        self.transactions
            .lock()
            .map_err(|_| poisoned())?
            .push(audit.clone());
        Ok(())
    }

    async fn events(&self, filter: &EventFilter) -> Result<Vec<SecurityEvent>> {
        let events = self.events.lock().map_err(|_| poisoned())?;
        let limit = filter.limit.unwrap_or(DEFAULT_QUERY_LIMIT).max(0) as usize;
        Ok(events
            .iter()
            .rev()
            .filter(|e| {
                filter
                    .actor_id
                    .as_deref()
                    .map_or(true, |a| e.actor_id.as_deref() == Some(a))
            })
            .filter(|e| filter.severity.map_or(true, |s| e.severity == s))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn transactions_for_actor(
        &self,
        actor_id: &str,
        limit: i64,
    ) -> Result<Vec<TransactionAudit>> {
        let transactions = self.transactions.lock().map_err(|_| poisoned())?;
        Ok(transactions
            .iter()
            .rev()
            .filter(|t| t.actor_id == actor_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
