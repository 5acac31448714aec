use crate::audit::event::{SecurityEventType, Severity};
use crate::audit::logger::AuditLogger;
use crate::domain::payment::{NextAction, PaymentRequest, PaymentStatus};
use crate::error::GatekeeperError;
use crate::providers::{
    ensure_supported, ProviderAdapter, ProviderDescriptor, ProviderResponse, ProviderTransaction,
    SecurityTier, WebhookEvent,
};
use crate::security::crypto;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const BARTER_CURRENCY: &str = "BTR";

#[derive(Debug, Clone)]
struct BarterOffer {
    payer_id: String,
    item_value_minor: i64,
    claim_code: String,
    status: PaymentStatus,
}

/// Non-monetary exchange channel. An offer stays pending with a claim code
/// until the counterparty confirms the match through the signed internal
/// callback ("MATCHED") or withdraws it ("WITHDRAWN").
pub struct BarterExchange {
    pub descriptor: ProviderDescriptor,
    pub webhook_secret: String,
    pub audit: AuditLogger,
    offers: Arc<Mutex<HashMap<String, BarterOffer>>>,
}

impl BarterExchange {
    pub fn new(webhook_secret: &str, audit: AuditLogger) -> Self {
        Self {
            descriptor: ProviderDescriptor {
                provider_id: "barter".to_string(),
                display_name: "Barter Exchange".to_string(),
                supported_currencies: vec![BARTER_CURRENCY.to_string()],
                regions: vec!["GLOBAL".to_string()],
                fee_bps: 0,
                security_tier: SecurityTier::Internal,
            },
            webhook_secret: webhook_secret.to_string(),
            audit,
            offers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn provider_error(&self, reason: &str) -> GatekeeperError {
        GatekeeperError::Provider {
            provider: self.descriptor.provider_id.clone(),
            reason: reason.to_string(),
            retryable: false,
        }
    }
}

#[async_trait]
impl ProviderAdapter for BarterExchange {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn initialize(
        &self,
        request: &PaymentRequest,
    ) -> Result<ProviderResponse, GatekeeperError> {
        ensure_supported(&self.descriptor, request)?;

        let transaction_id = format!("btr_{}", Uuid::new_v4());
        let claim_code = crypto::generate_secure_token()[..10].to_uppercase();
        {
            let mut offers = self
                .offers
                .lock()
                .map_err(|_| GatekeeperError::Internal(anyhow::anyhow!("offer book lock poisoned")))?;
            offers.insert(
                transaction_id.clone(),
                BarterOffer {
                    payer_id: request.payer.payer_id.clone(),
                    item_value_minor: request.amount_minor,
                    claim_code: claim_code.clone(),
                    status: PaymentStatus::Pending,
                },
            );
        }

        if let Err(err) = self
            .audit
            .security_event(
                SecurityEventType::ProviderCall,
                Severity::Info,
                Some(&request.payer.payer_id),
                "barter offer listed",
                json!({ "transaction_id": transaction_id, "item_value_minor": request.amount_minor }),
            )
            .await
        {
            tracing::warn!("provider call audit failed: {err}");
        }

        Ok(ProviderResponse {
            transaction_id,
            status: PaymentStatus::Pending,
            next_action: Some(NextAction::ClaimCode { code: claim_code }),
        })
    }

    async fn verify(&self, transaction_id: &str) -> Result<ProviderTransaction, GatekeeperError> {
        let found = {
            let offers = self
                .offers
                .lock()
                .map_err(|_| GatekeeperError::Internal(anyhow::anyhow!("offer book lock poisoned")))?;
            offers.get(transaction_id).cloned()
        };
        let offer = found.ok_or_else(|| self.provider_error("UNKNOWN_OFFER"))?;

        Ok(ProviderTransaction {
            transaction_id: transaction_id.to_string(),
            status: offer.status,
            amount_minor: offer.item_value_minor,
            currency: BARTER_CURRENCY.to_string(),
            raw: json!({
                "payer_id": offer.payer_id,
                "claim_code": offer.claim_code,
                "status": offer.status.as_str(),
            }),
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
        let status = match v.get("event").and_then(|s| s.as_str()).unwrap_or("") {
            "MATCHED" => PaymentStatus::Succeeded,
            "WITHDRAWN" => PaymentStatus::Failed,
            _ => PaymentStatus::Pending,
        };

        {
            let mut offers = self
                .offers
                .lock()
                .map_err(|_| GatekeeperError::Internal(anyhow::anyhow!("offer book lock poisoned")))?;
            if let Some(offer) = offers.get_mut(&transaction_id) {
                offer.status = status;
            }
        }

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
    use crate::domain::payment::{PayerIdentity, RequestMetadata};
    use chrono::Utc;

    fn exchange() -> BarterExchange {
        BarterExchange::new(
            "whsec_barter",
            AuditLogger::new(Arc::new(InMemoryAuditStore::new()), Arc::new(NoopAlert)),
        )
    }

    fn request() -> PaymentRequest {
        PaymentRequest {
            amount_minor: 7_500,
            currency: BARTER_CURRENCY.to_string(),
            payer: PayerIdentity {
                payer_id: "trader_1".to_string(),
                email: "trader@example.com".to_string(),
            },
            metadata: RequestMetadata::default(),
            created_at: Utc::now(),
            nonce: "n".to_string(),
        }
    }

    #[tokio::test]
    async fn offer_stays_pending_with_claim_code() {
        let exchange = exchange();
        let resp = exchange.initialize(&request()).await.unwrap();
        assert_eq!(resp.status, PaymentStatus::Pending);
        assert!(matches!(resp.next_action, Some(NextAction::ClaimCode { .. })));
    }

    #[tokio::test]
    async fn matched_callback_settles_the_offer() {
        let exchange = exchange();
        let resp = exchange.initialize(&request()).await.unwrap();

        let body = serde_json::to_vec(&json!({
            "transaction_id": resp.transaction_id,
            "event": "MATCHED",
        }))
        .unwrap();
        let sig = crypto::sign(&body, "whsec_barter");
        let event = exchange.handle_webhook(&body, &sig).await.unwrap();
        assert_eq!(event.status, PaymentStatus::Succeeded);

        let verified = exchange.verify(&resp.transaction_id).await.unwrap();
        assert_eq!(verified.status, PaymentStatus::Succeeded);
    }

    #[tokio::test]
    async fn unsigned_callback_is_rejected() {
        let exchange = exchange();
        let body = br#"{"transaction_id":"btr_x","event":"MATCHED"}"#;
        assert!(matches!(
            exchange.handle_webhook(body, "deadbeef").await,
            Err(GatekeeperError::WebhookVerification)
        ));
    }
}
