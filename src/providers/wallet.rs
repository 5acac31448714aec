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

/// Global wallet provider. Bearer-token API; webhooks carry a plain
/// HMAC-SHA256 hex signature over the raw body.
pub struct WalletProvider {
    pub descriptor: ProviderDescriptor,
    pub base_url: String,
    pub api_token: String,
    pub webhook_secret: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
    pub audit: AuditLogger,
}

fn map_status(raw: &str) -> PaymentStatus {
    match raw {
        "confirmed" => PaymentStatus::Succeeded,
        "declined" | "expired" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

impl WalletProvider {
    fn provider_error(&self, reason: &str, retryable: bool) -> GatekeeperError {
        GatekeeperError::Provider {
            provider: self.descriptor.provider_id.clone(),
            reason: reason.to_string(),
            retryable,
        }
    }

    async fn audit_call(&self, operation: &str, metadata: serde_json::Value) {
        if let Err(err) = self
            .audit
            .security_event(
                SecurityEventType::ProviderCall,
                Severity::Info,
                None,
                &format!("{} {}", self.descriptor.provider_id, operation),
                metadata,
            )
            .await
        {
            tracing::warn!("provider call audit failed: {err}");
        }
    }
}

#[async_trait]
impl ProviderAdapter for WalletProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn initialize(
        &self,
        request: &PaymentRequest,
    ) -> Result<ProviderResponse, GatekeeperError> {
        ensure_supported(&self.descriptor, request)?;
        self.audit_call(
            "initialize",
            json!({
                "amount_minor": request.amount_minor,
                "currency": request.currency,
                "payer_id": request.payer.payer_id,
            }),
        )
        .await;

        let body = json!({
            "amount_minor": request.amount_minor,
            "currency": request.currency,
            "customer_reference": request.payer.payer_id,
        });
        let resp = self
            .client
            .post(format!("{}/v2/payment-intents", self.base_url))
            .bearer_auth(&self.api_token)
            .json(&body)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => {
                let v: serde_json::Value = r.json().await.unwrap_or_default();
                let transaction_id = v
                    .get("intent_id")
                    .and_then(|id| id.as_str())
                    .ok_or_else(|| self.provider_error("MISSING_TRANSACTION_ID", false))?
                    .to_string();
                let next_action = v
                    .get("approval_url")
                    .and_then(|u| u.as_str())
                    .map(|url| NextAction::Redirect {
                        url: url.to_string(),
                    });
                Ok(ProviderResponse {
                    transaction_id,
                    status: PaymentStatus::Pending,
                    next_action,
                })
            }
            Ok(r) => {
                let status = r.status();
                Err(self.provider_error(
                    &format!("HTTP_{}", status.as_u16()),
                    status.is_server_error(),
                ))
            }
            Err(e) if e.is_timeout() => Err(self.provider_error("TIMEOUT", true)),
            Err(_) => Err(self.provider_error("NETWORK_ERROR", true)),
        }
    }

    async fn verify(&self, transaction_id: &str) -> Result<ProviderTransaction, GatekeeperError> {
        self.audit_call("verify", json!({ "transaction_id": transaction_id }))
            .await;

        let resp = self
            .client
            .get(format!(
                "{}/v2/payment-intents/{transaction_id}",
                self.base_url
            ))
            .bearer_auth(&self.api_token)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => {
                let v: serde_json::Value = r.json().await.unwrap_or_default();
                Ok(ProviderTransaction {
                    transaction_id: transaction_id.to_string(),
                    status: map_status(v.get("state").and_then(|s| s.as_str()).unwrap_or("")),
                    amount_minor: v.get("amount_minor").and_then(|a| a.as_i64()).unwrap_or(0),
                    currency: v
                        .get("currency")
                        .and_then(|c| c.as_str())
                        .unwrap_or("")
                        .to_string(),
                    raw: v,
                })
            }
            Ok(r) => {
                let status = r.status();
                Err(self.provider_error(
                    &format!("HTTP_{}", status.as_u16()),
                    status.is_server_error(),
                ))
            }
            Err(e) if e.is_timeout() => Err(self.provider_error("TIMEOUT", true)),
            Err(_) => Err(self.provider_error("NETWORK_ERROR", true)),
        }
    }

    async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, GatekeeperError> {
        self.audit_call("webhook", json!({ "payload_bytes": payload.len() }))
            .await;

        if !crypto::verify_signature(payload, signature, &self.webhook_secret) {
            return Err(GatekeeperError::WebhookVerification);
        }
        let v: serde_json::Value =
            serde_json::from_slice(payload).map_err(|_| GatekeeperError::WebhookVerification)?;
        let transaction_id = v
            .get("intent_id")
            .and_then(|id| id.as_str())
            .ok_or(GatekeeperError::WebhookVerification)?
            .to_string();
        let status = map_status(v.get("state").and_then(|s| s.as_str()).unwrap_or(""));

        Ok(WebhookEvent {
            transaction_id,
            status,
            raw: v,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::alert::NoopAlert;
    use crate::audit::store_mem::InMemoryAuditStore;
    use crate::providers::SecurityTier;
    use std::sync::Arc;

    fn provider() -> WalletProvider {
        WalletProvider {
            descriptor: ProviderDescriptor {
                provider_id: "wallet".to_string(),
                display_name: "Global Wallet".to_string(),
                supported_currencies: vec!["USD".to_string(), "EUR".to_string(), "INR".to_string()],
                regions: vec!["GLOBAL".to_string()],
                fee_bps: 150,
                security_tier: SecurityTier::Standard,
            },
            base_url: "http://127.0.0.1:1".to_string(),
            api_token: "tok".to_string(),
            webhook_secret: "whsec_wallet".to_string(),
            timeout_ms: 100,
            client: reqwest::Client::new(),
            audit: AuditLogger::new(Arc::new(InMemoryAuditStore::new()), Arc::new(NoopAlert)),
        }
    }

    #[tokio::test]
    async fn webhook_round_trip() {
        let p = provider();
        let body = br#"{"intent_id":"wi_9","state":"confirmed"}"#;
        let sig = crypto::sign(body, "whsec_wallet");
        let event = p.handle_webhook(body, &sig).await.unwrap();
        assert_eq!(event.transaction_id, "wi_9");
        assert_eq!(event.status, PaymentStatus::Succeeded);
    }

    #[tokio::test]
    async fn webhook_wrong_secret_rejected() {
        let p = provider();
        let body = br#"{"intent_id":"wi_9","state":"confirmed"}"#;
        let sig = crypto::sign(body, "other");
        assert!(matches!(
            p.handle_webhook(body, &sig).await,
            Err(GatekeeperError::WebhookVerification)
        ));
    }

    #[test]
    fn wallet_vocabulary_maps_to_canonical() {
        assert_eq!(map_status("confirmed"), PaymentStatus::Succeeded);
        assert_eq!(map_status("declined"), PaymentStatus::Failed);
        assert_eq!(map_status("processing"), PaymentStatus::Pending);
    }
}
