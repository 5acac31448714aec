use crate::audit::event::{SecurityEventType, Severity, TransactionAudit};
use crate::audit::logger::AuditLogger;
use crate::service::session_store::SessionStore;
use anyhow::Result;
use chrono::{Duration, Utc};
use serde_json::json;

const ARCHIVE_AFTER_HOURS: i64 = 1;

/// Background counterpart to the lazy expiry check: stale sessions are
/// expired and audited even if nothing ever touches them again.
pub struct ExpirySweeper {
    pub sessions: SessionStore,
    pub audit: AuditLogger,
    pub interval: std::time::Duration,
}

impl ExpirySweeper {
    pub async fn run(self) {
        loop {
            if let Err(err) = self.tick().await {
                tracing::error!("expiry sweep error: {err}");
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    pub async fn tick(&self) -> Result<()> {
        let now = Utc::now();
        for session in self.sessions.take_expired(now)? {
            self.audit
                .security_event(
                    SecurityEventType::SessionExpired,
                    Severity::Warning,
                    Some(&session.request.payer.payer_id),
                    "session expired by sweep",
                    json!({ "session_id": session.session_id }),
                )
                .await?;
            self.audit
                .transaction(&TransactionAudit {
                    transaction_id: session
                        .provider_transaction_ref
                        .clone()
                        .unwrap_or_else(|| session.session_id.to_string()),
                    session_id: session.session_id,
                    actor_id: session.request.payer.payer_id.clone(),
                    provider_id: session.provider_id.clone(),
                    amount_minor: session.request.amount_minor,
                    currency: session.request.currency.clone(),
                    status: session.status.as_str().to_string(),
                    security_score: session.security_score,
                    risk_level: session.risk_level.clone(),
                    warnings: session.warnings.clone(),
                    metadata: json!({ "expired_by": "sweep" }),
                    created_at: now,
                })
                .await?;
        }

        let archived = self
            .sessions
            .purge_terminal(now - Duration::hours(ARCHIVE_AFTER_HOURS))?;
        if archived > 0 {
            tracing::debug!("archived {archived} terminal sessions");
        }
        Ok(())
    }
}
