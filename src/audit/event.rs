use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "INFO" => Some(Severity::Info),
            "WARNING" => Some(Severity::Warning),
            "ERROR" => Some(Severity::Error),
            "CRITICAL" => Some(Severity::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityEventType {
    PaymentSubmitted,
    ValidationRejected,
    RateLimitBreached,
    FraudScored,
    FraudBlocked,
    SessionTransition,
    SessionExpired,
    ProviderCall,
    ProviderError,
    WebhookAccepted,
    WebhookRejected,
    WebhookReplayed,
    WebhookOrphaned,
    CancellationRequested,
    CancellationReconciled,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::PaymentSubmitted => "PAYMENT_SUBMITTED",
            SecurityEventType::ValidationRejected => "VALIDATION_REJECTED",
            SecurityEventType::RateLimitBreached => "RATE_LIMIT_BREACHED",
            SecurityEventType::FraudScored => "FRAUD_SCORED",
            SecurityEventType::FraudBlocked => "FRAUD_BLOCKED",
            SecurityEventType::SessionTransition => "SESSION_TRANSITION",
            SecurityEventType::SessionExpired => "SESSION_EXPIRED",
            SecurityEventType::ProviderCall => "PROVIDER_CALL",
            SecurityEventType::ProviderError => "PROVIDER_ERROR",
            SecurityEventType::WebhookAccepted => "WEBHOOK_ACCEPTED",
            SecurityEventType::WebhookRejected => "WEBHOOK_REJECTED",
            SecurityEventType::WebhookReplayed => "WEBHOOK_REPLAYED",
            SecurityEventType::WebhookOrphaned => "WEBHOOK_ORPHANED",
            SecurityEventType::CancellationRequested => "CANCELLATION_REQUESTED",
            SecurityEventType::CancellationReconciled => "CANCELLATION_RECONCILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PAYMENT_SUBMITTED" => Some(SecurityEventType::PaymentSubmitted),
            "VALIDATION_REJECTED" => Some(SecurityEventType::ValidationRejected),
            "RATE_LIMIT_BREACHED" => Some(SecurityEventType::RateLimitBreached),
            "FRAUD_SCORED" => Some(SecurityEventType::FraudScored),
            "FRAUD_BLOCKED" => Some(SecurityEventType::FraudBlocked),
            "SESSION_TRANSITION" => Some(SecurityEventType::SessionTransition),
            "SESSION_EXPIRED" => Some(SecurityEventType::SessionExpired),
            "PROVIDER_CALL" => Some(SecurityEventType::ProviderCall),
            "PROVIDER_ERROR" => Some(SecurityEventType::ProviderError),
            "WEBHOOK_ACCEPTED" => Some(SecurityEventType::WebhookAccepted),
            "WEBHOOK_REJECTED" => Some(SecurityEventType::WebhookRejected),
            "WEBHOOK_REPLAYED" => Some(SecurityEventType::WebhookReplayed),
            "WEBHOOK_ORPHANED" => Some(SecurityEventType::WebhookOrphaned),
            "CANCELLATION_REQUESTED" => Some(SecurityEventType::CancellationRequested),
            "CANCELLATION_RECONCILED" => Some(SecurityEventType::CancellationReconciled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub event_id: Uuid,
    pub event_type: SecurityEventType,
    pub severity: Severity,
    pub actor_id: Option<String>,
    pub description: String,
    pub metadata: serde_json::Value,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

/// Payment-specific audit record. Append-only, retained for the compliance
/// horizon, never mutated after write.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionAudit {
    pub transaction_id: String,
    pub session_id: Uuid,
    pub actor_id: String,
    pub provider_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    pub security_score: f64,
    pub risk_level: String,
    pub warnings: Vec<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub actor_id: Option<String>,
    pub severity: Option<Severity>,
    pub limit: Option<i64>,
}
