use crate::audit::event::{SecurityEventType, Severity};
use crate::audit::logger::AuditLogger;
use crate::domain::payment::{NextAction, PaymentRequest, PaymentStatus};
use crate::error::GatekeeperError;
use crate::providers::{
    ensure_supported, ProviderAdapter, ProviderDescriptor, ProviderResponse, ProviderTransaction,
    WebhookEvent,
};
use crate::security::crypto;
use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

/// Behavior-scripted adapter for tests and local development.
pub struct MockProvider {
    pub descriptor: ProviderDescriptor,
    pub behavior: String,
    pub webhook_secret: String,
    pub audit: AuditLogger,
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn initialize(
        &self,
        request: &PaymentRequest,
    ) -> Result<ProviderResponse, GatekeeperError> {
        ensure_supported(&self.descriptor, request)?;
        if let Err(err) = self
            .audit
            .security_event(
                SecurityEventType::ProviderCall,
                Severity::Info,
                Some(&request.payer.payer_id),
                "mock initialize",
                json!({ "behavior": self.behavior }),
            )
            .await
        {
            tracing::warn!("provider call audit failed: {err}");
        }

        match self.behavior.as_str() {
            "ALWAYS_FAILURE" => Err(GatekeeperError::Provider {
                provider: self.descriptor.provider_id.clone(),
                reason: "MOCK_DECLINED".to_string(),
                retryable: false,
            }),
            "ALWAYS_TIMEOUT" => Err(GatekeeperError::Provider {
                provider: self.descriptor.provider_id.clone(),
                reason: "TIMEOUT".to_string(),
                retryable: true,
            }),
            _ => {
                let transaction_id = format!("mock_txn_{}", Uuid::new_v4());
                Ok(ProviderResponse {
                    transaction_id: transaction_id.clone(),
                    status: PaymentStatus::Pending,
                    next_action: Some(NextAction::Redirect {
                        url: format!("https://mock.example/checkout/{transaction_id}"),
                    }),
                })
            }
        }
    }

    async fn verify(&self, transaction_id: &str) -> Result<ProviderTransaction, GatekeeperError> {
        Ok(ProviderTransaction {
            transaction_id: transaction_id.to_string(),
            status: PaymentStatus::Pending,
            amount_minor: 0,
            currency: self
                .descriptor
                .supported_currencies
                .first()
                .cloned()
                .unwrap_or_default(),
            raw: json!({ "mock": true }),
        })
    }

    async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, GatekeeperError> {
        if !crypto::verify_signature(payload, signature, &self.webhook_secret) {
            return Err(GatekeeperError::WebhookVerification);
        }
        let v: serde_json::Value =
            serde_json::from_slice(payload).map_err(|_| GatekeeperError::WebhookVerification)?;
        let transaction_id = v
            .get("transaction_id")
            .and_then(|id| id.as_str())
            .ok_or(GatekeeperError::WebhookVerification)?
            .to_string();
        let status = match v.get("status").and_then(|s| s.as_str()).unwrap_or("") {
            "SUCCEEDED" => PaymentStatus::Succeeded,
            "FAILED" => PaymentStatus::Failed,
            _ => PaymentStatus::Pending,
        };

        Ok(WebhookEvent {
            transaction_id,
            status,
            raw: v,
        })
    }
}
