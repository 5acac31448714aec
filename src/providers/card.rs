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

/// External card/bank processor. Signs webhooks Stripe-style:
/// `t=<unix-ts>,v1=<hmac-sha256-hex over "<ts>.<body>">`.
pub struct CardProcessor {
    pub descriptor: ProviderDescriptor,
    pub base_url: String,
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
    pub timeout_ms: u64,
    pub webhook_tolerance_seconds: i64,
    pub client: reqwest::Client,
    pub audit: AuditLogger,
}

fn map_status(raw: &str) -> PaymentStatus {
    match raw {
        "captured" => PaymentStatus::Succeeded,
        "failed" | "voided" => PaymentStatus::Failed,
        // created / authorized / anything newer we don't know yet
        _ => PaymentStatus::Pending,
    }
}

fn parse_signature_header(signature: &str) -> Option<(i64, String)> {
    let mut timestamp = None;
    let mut v1 = None;
    for part in signature.split(',') {
        match part.split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => v1 = Some(value.to_string()),
            _ => {}
        }
    }
    Some((timestamp?, v1?))
}

impl CardProcessor {
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

    fn provider_error(&self, reason: &str, retryable: bool) -> GatekeeperError {
        GatekeeperError::Provider {
            provider: self.descriptor.provider_id.clone(),
            reason: reason.to_string(),
            retryable,
        }
    }
}

#[async_trait]
impl ProviderAdapter for CardProcessor {
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
            "amount": request.amount_minor,
            "currency": request.currency,
            "reference": request.payer.payer_id,
            "capture": true,
        });
        let resp = self
            .client
            .post(format!("{}/v1/charges", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => {
                let v: serde_json::Value = r.json().await.unwrap_or_default();
                let transaction_id = v
                    .get("id")
                    .and_then(|id| id.as_str())
                    .ok_or_else(|| self.provider_error("MISSING_TRANSACTION_ID", false))?
                    .to_string();
                let redirect = v
                    .get("redirect_url")
                    .and_then(|u| u.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}/checkout/{}", self.base_url, transaction_id));
                Ok(ProviderResponse {
                    transaction_id,
                    status: PaymentStatus::Pending,
                    next_action: Some(NextAction::Redirect { url: redirect }),
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
            .get(format!("{}/v1/charges/{transaction_id}", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => {
                let v: serde_json::Value = r.json().await.unwrap_or_default();
                Ok(ProviderTransaction {
                    transaction_id: transaction_id.to_string(),
                    status: map_status(v.get("status").and_then(|s| s.as_str()).unwrap_or("")),
                    amount_minor: v.get("amount").and_then(|a| a.as_i64()).unwrap_or(0),
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

        let (timestamp, v1) =
            parse_signature_header(signature).ok_or(GatekeeperError::WebhookVerification)?;
        let age = (chrono::Utc::now().timestamp() - timestamp).abs();
        if age > self.webhook_tolerance_seconds {
            return Err(GatekeeperError::WebhookVerification);
        }

        let body = std::str::from_utf8(payload).map_err(|_| GatekeeperError::WebhookVerification)?;
        let signed_payload = format!("{timestamp}.{body}");
        if !crypto::verify_signature(signed_payload.as_bytes(), &v1, &self.webhook_secret) {
            return Err(GatekeeperError::WebhookVerification);
        }

        let v: serde_json::Value =
            serde_json::from_str(body).map_err(|_| GatekeeperError::WebhookVerification)?;
        let transaction_id = v
            .get("id")
            .and_then(|id| id.as_str())
            .ok_or(GatekeeperError::WebhookVerification)?
            .to_string();
        let status = map_status(v.get("status").and_then(|s| s.as_str()).unwrap_or(""));

        Ok(WebhookEvent {
            transaction_id,
            status,
            raw: v,
        })
    }
}
