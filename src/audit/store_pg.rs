use crate::audit::event::{
    EventFilter, SecurityEvent, SecurityEventType, Severity, TransactionAudit,
};
use crate::audit::logger::AuditStore;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::{PgPool, Row};

const DEFAULT_QUERY_LIMIT: i64 = 100;

/// Durable audit trail. Insert-only; retention/export is an external policy
/// concern and no delete path exists here.
#[derive(Clone)]
pub struct PgAuditStore {
    pub pool: PgPool,
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn append_event(&self, event: &SecurityEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO security_events (
                event_id, event_type, severity, actor_id, description, metadata, resolved, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.event_id)
        .bind(event.event_type.as_str())
        .bind(event.severity.as_str())
        .bind(event.actor_id.clone())
        .bind(event.description.clone())
        .bind(event.metadata.clone())
        .bind(event.resolved)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_transaction(&self, audit: &TransactionAudit) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transaction_audits (
                transaction_id, session_id, actor_id, provider_id, amount_minor, currency,
                status, security_score, risk_level, warnings, metadata, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(audit.transaction_id.clone())
        .bind(audit.session_id)
        .bind(audit.actor_id.clone())
        .bind(audit.provider_id.clone())
        .bind(audit.amount_minor)
        .bind(audit.currency.clone())
        .bind(audit.status.clone())
        .bind(audit.security_score)
        .bind(audit.risk_level.clone())
        .bind(serde_json::to_value(&audit.warnings)?)
        .bind(audit.metadata.clone())
        .bind(audit.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn events(&self, filter: &EventFilter) -> Result<Vec<SecurityEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, event_type, severity, actor_id, description, metadata, resolved, created_at
            FROM security_events
            WHERE ($1::text IS NULL OR actor_id = $1)
              AND ($2::text IS NULL OR severity = $2)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(filter.actor_id.clone())
        .bind(filter.severity.map(|s| s.as_str().to_string()))
        .bind(filter.limit.unwrap_or(DEFAULT_QUERY_LIMIT))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let event_type: String = row.get("event_type");
                let severity: String = row.get("severity");
                Ok(SecurityEvent {
                    event_id: row.get("event_id"),
                    event_type: SecurityEventType::parse(&event_type)
                        .ok_or_else(|| anyhow::anyhow!("unknown event type {event_type}"))?,
                    severity: Severity::parse(&severity)
                        .ok_or_else(|| anyhow::anyhow!("unknown severity {severity}"))?,
                    actor_id: row.get("actor_id"),
                    description: row.get("description"),
                    metadata: row.get("metadata"),
                    resolved: row.get("resolved"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }

    async fn transactions_for_actor(
        &self,
        actor_id: &str,
        limit: i64,
    ) -> Result<Vec<TransactionAudit>> {
        let rows = sqlx::query(
            r#"
            SELECT transaction_id, session_id, actor_id, provider_id, amount_minor, currency,
                   status, security_score, risk_level, warnings, metadata, created_at
            FROM transaction_audits
            WHERE actor_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(actor_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let warnings: serde_json::Value = row.get("warnings");
                Ok(TransactionAudit {
                    transaction_id: row.get("transaction_id"),
                    session_id: row.get("session_id"),
                    actor_id: row.get("actor_id"),
                    provider_id: row.get("provider_id"),
                    amount_minor: row.get("amount_minor"),
                    currency: row.get("currency"),
                    status: row.get("status"),
                    security_score: row.get("security_score"),
                    risk_level: row.get("risk_level"),
                    warnings: serde_json::from_value(warnings)?,
                    metadata: row.get("metadata"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }
}
