use crate::audit::alert::AlertHook;
use crate::audit::event::{
    EventFilter, SecurityEvent, SecurityEventType, Severity, TransactionAudit,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Single writer of record for the event and transaction trail.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append_event(&self, event: &SecurityEvent) -> Result<()>;
    async fn append_transaction(&self, audit: &TransactionAudit) -> Result<()>;
    async fn events(&self, filter: &EventFilter) -> Result<Vec<SecurityEvent>>;
    async fn transactions_for_actor(
        &self,
        actor_id: &str,
        limit: i64,
    ) -> Result<Vec<TransactionAudit>>;
}

#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn AuditStore>,
    alert: Arc<dyn AlertHook>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn AuditStore>, alert: Arc<dyn AlertHook>) -> Self {
        Self { store, alert }
    }

    pub async fn security_event(
        &self,
        event_type: SecurityEventType,
        severity: Severity,
        actor_id: Option<&str>,
        description: &str,
        metadata: serde_json::Value,
    ) -> Result<()> {
        let event = SecurityEvent {
            event_id: Uuid::new_v4(),
            event_type,
            severity,
            actor_id: actor_id.map(str::to_string),
            description: description.to_string(),
            metadata,
            resolved: false,
            created_at: Utc::now(),
        };
        self.store.append_event(&event).await?;
        tracing::debug!(
            event_type = event.event_type.as_str(),
            severity = severity.as_str(),
            "audit event recorded"
        );

        if severity == Severity::Critical {
            if let Err(err) = self.alert.raise(&event).await {
                tracing::warn!("alert hook failed for {}: {err}", event.event_type.as_str());
            }
        }
        Ok(())
    }

    pub async fn transaction(&self, audit: &TransactionAudit) -> Result<()> {
        self.store.append_transaction(audit).await
    }

    /// Newest-first event query for compliance tooling.
    pub async fn query(&self, filter: &EventFilter) -> Result<Vec<SecurityEvent>> {
        self.store.events(filter).await
    }

    pub async fn history_for(&self, actor_id: &str, limit: i64) -> Result<Vec<TransactionAudit>> {
        self.store.transactions_for_actor(actor_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::store_mem::InMemoryAuditStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAlert(AtomicUsize);

    #[async_trait]
    impl AlertHook for CountingAlert {
        async fn raise(&self, _event: &SecurityEvent) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn critical_events_trigger_the_alert_hook() {
        let alert = Arc::new(CountingAlert(AtomicUsize::new(0)));
        let logger = AuditLogger::new(Arc::new(InMemoryAuditStore::new()), alert.clone());

        logger
            .security_event(
                SecurityEventType::FraudScored,
                Severity::Info,
                Some("p1"),
                "scored",
                serde_json::json!({}),
            )
            .await
            .unwrap();
        assert_eq!(alert.0.load(Ordering::SeqCst), 0);

        logger
            .security_event(
                SecurityEventType::WebhookRejected,
                Severity::Critical,
                None,
                "bad signature",
                serde_json::json!({}),
            )
            .await
            .unwrap();
        assert_eq!(alert.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn query_filters_by_actor_and_severity_newest_first() {
        let store = Arc::new(InMemoryAuditStore::new());
        let logger = AuditLogger::new(store, Arc::new(crate::audit::alert::NoopAlert));

        for i in 0..3 {
            logger
                .security_event(
                    SecurityEventType::FraudScored,
                    Severity::Info,
                    Some("alice"),
                    &format!("event {i}"),
                    serde_json::json!({}),
                )
                .await
                .unwrap();
        }
        logger
            .security_event(
                SecurityEventType::RateLimitBreached,
                Severity::Warning,
                Some("bob"),
                "burst",
                serde_json::json!({}),
            )
            .await
            .unwrap();

        let alice = logger
            .query(&EventFilter {
                actor_id: Some("alice".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(alice.len(), 3);
        assert_eq!(alice[0].description, "event 2");

        let warnings = logger
            .query(&EventFilter {
                severity: Some(Severity::Warning),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].actor_id.as_deref(), Some("bob"));
    }
}
