use crate::audit::event::{SecurityEventType, Severity};
use crate::audit::logger::AuditLogger;
use crate::domain::payment::{PaymentRequest, PaymentStatus};
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

pub const POINTS_CURRENCY: &str = "PTS";

#[derive(Debug, Clone)]
struct PointsTransaction {
    payer_id: String,
    amount_minor: i64,
    status: PaymentStatus,
}

/// Internal point currency. Settlement is an in-process ledger debit, so
/// initialization is already terminal; webhooks only arrive for back-office
/// adjustments (reversals) and are signed like any external provider's.
pub struct PointsLedger {
    pub descriptor: ProviderDescriptor,
    pub webhook_secret: String,
    pub audit: AuditLogger,
    balances: Arc<Mutex<HashMap<String, i64>>>,
    transactions: Arc<Mutex<HashMap<String, PointsTransaction>>>,
}

impl PointsLedger {
    pub fn new(webhook_secret: &str, audit: AuditLogger) -> Self {
        Self {
            descriptor: ProviderDescriptor {
                provider_id: "points".to_string(),
                display_name: "Loyalty Points".to_string(),
                supported_currencies: vec![POINTS_CURRENCY.to_string()],
                regions: vec!["GLOBAL".to_string()],
                fee_bps: 0,
                security_tier: SecurityTier::Internal,
            },
            webhook_secret: webhook_secret.to_string(),
            audit,
            balances: Arc::new(Mutex::new(HashMap::new())),
            transactions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Top-up path for the account ledger (fed by an external grants flow).
    pub fn credit(&self, account: &str, amount_minor: i64) {
        if let Ok(mut balances) = self.balances.lock() {
            *balances.entry(account.to_string()).or_insert(0) += amount_minor;
        }
    }

    pub fn balance(&self, account: &str) -> i64 {
        self.balances
            .lock()
            .ok()
            .and_then(|b| b.get(account).copied())
            .unwrap_or(0)
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
impl ProviderAdapter for PointsLedger {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn initialize(
        &self,
        request: &PaymentRequest,
    ) -> Result<ProviderResponse, GatekeeperError> {
        ensure_supported(&self.descriptor, request)?;

        let transaction_id = format!("pts_{}", Uuid::new_v4());
        // debit inside one critical section; guard dropped before any await
        let debited = {
            let mut balances = self
                .balances
                .lock()
                .map_err(|_| GatekeeperError::Internal(anyhow::anyhow!("ledger lock poisoned")))?;
            let balance = balances.entry(request.payer.payer_id.clone()).or_insert(0);
            if *balance >= request.amount_minor {
                *balance -= request.amount_minor;
                true
            } else {
                false
            }
        };

        if !debited {
            return Err(self.provider_error("INSUFFICIENT_POINTS"));
        }

        {
            let mut transactions = self
                .transactions
                .lock()
                .map_err(|_| GatekeeperError::Internal(anyhow::anyhow!("ledger lock poisoned")))?;
            transactions.insert(
                transaction_id.clone(),
                PointsTransaction {
                    payer_id: request.payer.payer_id.clone(),
                    amount_minor: request.amount_minor,
                    status: PaymentStatus::Succeeded,
                },
            );
        }

        if let Err(err) = self
            .audit
            .security_event(
                SecurityEventType::ProviderCall,
                Severity::Info,
                Some(&request.payer.payer_id),
                "points debit settled",
                json!({ "transaction_id": transaction_id, "amount_minor": request.amount_minor }),
            )
            .await
        {
            tracing::warn!("provider call audit failed: {err}");
        }

        Ok(ProviderResponse {
            transaction_id,
            status: PaymentStatus::Succeeded,
            next_action: None,
        })
    }

    async fn verify(&self, transaction_id: &str) -> Result<ProviderTransaction, GatekeeperError> {
        let found = {
            let transactions = self
                .transactions
                .lock()
                .map_err(|_| GatekeeperError::Internal(anyhow::anyhow!("ledger lock poisoned")))?;
            transactions.get(transaction_id).cloned()
        };
        let txn = found.ok_or_else(|| self.provider_error("UNKNOWN_TRANSACTION"))?;

        Ok(ProviderTransaction {
            transaction_id: transaction_id.to_string(),
            status: txn.status,
            amount_minor: txn.amount_minor,
            currency: POINTS_CURRENCY.to_string(),
            raw: json!({ "payer_id": txn.payer_id, "status": txn.status.as_str() }),
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

        {
            let mut transactions = self
                .transactions
                .lock()
                .map_err(|_| GatekeeperError::Internal(anyhow::anyhow!("ledger lock poisoned")))?;
            if let Some(txn) = transactions.get_mut(&transaction_id) {
                txn.status = status;
            }
        }

        Ok(WebhookEvent {
            transaction_id,
            status,
            raw: v,
        })
    }
}
