use crate::domain::payment::{ErrorEnvelope, ErrorPayload};
use crate::security::crypto::CryptoError;
use crate::security::fraud::FraudFactor;
use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

/// Caller-visible failure classes. Stable codes; no stack traces, no
/// credentials in any message.
#[derive(Debug, Error)]
pub enum GatekeeperError {
    #[error("{message}")]
    Validation { field: &'static str, message: String },

    #[error("rate limit exceeded, retry after {retry_after_ms}ms")]
    RateLimited {
        retry_after_ms: i64,
        reset_at: chrono::DateTime<chrono::Utc>,
    },

    #[error("transaction blocked by risk policy (score {risk_score:.0})")]
    FraudBlocked {
        risk_score: f64,
        factors: Vec<FraudFactor>,
    },

    #[error("provider {provider} call failed: {reason}")]
    Provider {
        provider: String,
        reason: String,
        retryable: bool,
    },

    #[error("webhook signature could not be verified")]
    WebhookVerification,

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("unknown session: {0}")]
    UnknownSession(Uuid),

    #[error("invalid session state: {from} cannot move to {to}")]
    SessionState { from: String, to: String },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl GatekeeperError {
    pub fn code(&self) -> &'static str {
        match self {
            GatekeeperError::Validation { .. } => "VALIDATION_FAILED",
            GatekeeperError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            GatekeeperError::FraudBlocked { .. } => "FRAUD_BLOCKED",
            GatekeeperError::Provider { .. } => "PROVIDER_ERROR",
            GatekeeperError::WebhookVerification => "WEBHOOK_VERIFICATION_FAILED",
            GatekeeperError::UnknownProvider(_) => "UNKNOWN_PROVIDER",
            GatekeeperError::UnknownSession(_) => "UNKNOWN_SESSION",
            GatekeeperError::SessionState { .. } => "INVALID_SESSION_STATE",
            GatekeeperError::Crypto(_) => "CRYPTO_FAILURE",
            GatekeeperError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatekeeperError::Validation { .. } => StatusCode::BAD_REQUEST,
            GatekeeperError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatekeeperError::FraudBlocked { .. } => StatusCode::FORBIDDEN,
            GatekeeperError::Provider { .. } => StatusCode::BAD_GATEWAY,
            GatekeeperError::WebhookVerification => StatusCode::UNAUTHORIZED,
            GatekeeperError::UnknownProvider(_) | GatekeeperError::UnknownSession(_) => {
                StatusCode::NOT_FOUND
            }
            GatekeeperError::SessionState { .. } => StatusCode::CONFLICT,
            GatekeeperError::Crypto(_) | GatekeeperError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        let details = match self {
            GatekeeperError::Validation { field, .. } => Some(format!("field={field}")),
            GatekeeperError::RateLimited { retry_after_ms, .. } => {
                Some(format!("retry_after_ms={retry_after_ms}"))
            }
            GatekeeperError::FraudBlocked { factors, .. } => Some(
                factors
                    .iter()
                    .map(|f| f.name.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            GatekeeperError::Provider { retryable, .. } => {
                Some(format!("retryable={retryable}"))
            }
            _ => None,
        };
        // internal errors keep their context in logs, not in the response
        let message = match self {
            GatekeeperError::Internal(_) => "internal error".to_string(),
            GatekeeperError::Crypto(_) => "cryptographic operation failed".to_string(),
            other => other.to_string(),
        };
        ErrorEnvelope {
            error: ErrorPayload {
                code: self.code().to_string(),
                message,
                details,
            },
        }
    }
}

impl From<crate::domain::session::SessionError> for GatekeeperError {
    fn from(err: crate::domain::session::SessionError) -> Self {
        match err {
            crate::domain::session::SessionError::InvalidTransition { from, to } => {
                GatekeeperError::SessionState {
                    from: from.to_string(),
                    to: to.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_statuses_are_stable() {
        let err = GatekeeperError::RateLimited {
            retry_after_ms: 1500,
            reset_at: chrono::Utc::now(),
        };
        assert_eq!(err.code(), "RATE_LIMIT_EXCEEDED");
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            err.envelope().error.details.as_deref(),
            Some("retry_after_ms=1500")
        );
    }

    #[test]
    fn internal_errors_are_redacted() {
        let err = GatekeeperError::Internal(anyhow::anyhow!("pg: password=hunter2 refused"));
        assert_eq!(err.envelope().error.message, "internal error");
    }
}
