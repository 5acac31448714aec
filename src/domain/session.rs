use crate::domain::payment::PaymentRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Initiated,
    Active,
    Completed,
    Failed,
    Cancelled,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Initiated => "INITIATED",
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Failed => "FAILED",
            SessionStatus::Cancelled => "CANCELLED",
            SessionStatus::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed
                | SessionStatus::Failed
                | SessionStatus::Cancelled
                | SessionStatus::Expired
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("cannot transition session from {from} to {to}")]
    InvalidTransition { from: SessionStatus, to: SessionStatus },
}

pub fn can_transition(from: SessionStatus, to: SessionStatus) -> bool {
    use SessionStatus::*;
    matches!(
        (from, to),
        (Initiated, Active)
            | (Initiated, Failed)
            | (Initiated, Cancelled)
            | (Initiated, Expired)
            | (Active, Completed)
            | (Active, Failed)
            | (Active, Cancelled)
            | (Active, Expired)
    )
}

/// One payment attempt. Owned by the orchestrator for its lifetime; the
/// provider adapter is the only other party allowed to feed it a
/// provider-confirmed result.
#[derive(Debug, Clone)]
pub struct PaymentSession {
    pub session_id: Uuid,
    pub request: PaymentRequest,
    pub provider_id: String,
    pub status: SessionStatus,
    pub expires_at: DateTime<Utc>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub security_token: String,
    pub security_score: f64,
    pub risk_level: String,
    pub warnings: Vec<String>,
    pub provider_transaction_ref: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        request: PaymentRequest,
        provider_id: &str,
        expires_at: DateTime<Utc>,
        max_attempts: i32,
        security_token: String,
        security_score: f64,
        risk_level: &str,
        warnings: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            request,
            provider_id: provider_id.to_string(),
            status: SessionStatus::Initiated,
            expires_at,
            attempts: 0,
            max_attempts,
            security_token,
            security_score,
            risk_level: risk_level.to_string(),
            warnings,
            provider_transaction_ref: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Status with lazy expiry applied: a non-terminal session past its
    /// expiry reads as `Expired` even before any writer has touched it.
    pub fn effective_status(&self, now: DateTime<Utc>) -> SessionStatus {
        if !self.status.is_terminal() && now > self.expires_at {
            SessionStatus::Expired
        } else {
            self.status
        }
    }

    pub fn transition(
        &mut self,
        to: SessionStatus,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let from = self.effective_status(now);
        if from == to && to == SessionStatus::Expired {
            // lazy expiry being persisted
            self.status = SessionStatus::Expired;
            self.updated_at = now;
            return Ok(());
        }
        if !can_transition(from, to) {
            return Err(SessionError::InvalidTransition { from, to });
        }
        self.status = to;
        if to == SessionStatus::Cancelled {
            self.cancelled_at = Some(now);
        }
        self.updated_at = now;
        Ok(())
    }
}
