use crate::domain::payment::{NextAction, PaymentRequest, PaymentStatus};
use crate::error::GatekeeperError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub mod barter;
pub mod card;
pub mod mock;
pub mod points;
pub mod wallet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityTier {
    Standard,
    Enhanced,
    Internal,
}

/// Static descriptor; loaded at wiring time and never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderDescriptor {
    pub provider_id: String,
    pub display_name: String,
    pub supported_currencies: Vec<String>,
    pub regions: Vec<String>,
    pub fee_bps: i32,
    pub security_tier: SecurityTier,
}

#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub next_action: Option<NextAction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderTransaction {
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub amount_minor: i64,
    pub currency: String,
    pub raw: serde_json::Value,
}

/// Provider callback after signature verification and vocabulary mapping.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub raw: serde_json::Value,
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn descriptor(&self) -> &ProviderDescriptor;

    async fn initialize(
        &self,
        request: &PaymentRequest,
    ) -> Result<ProviderResponse, GatekeeperError>;

    async fn verify(&self, transaction_id: &str) -> Result<ProviderTransaction, GatekeeperError>;

    /// Verifies the signature over the raw payload before trusting any field
    /// of it. An unverifiable payload is `WebhookVerification`, never a
    /// parsed event.
    async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, GatekeeperError>;
}

pub fn ensure_supported(
    descriptor: &ProviderDescriptor,
    request: &PaymentRequest,
) -> Result<(), GatekeeperError> {
    if request.amount_minor <= 0 {
        return Err(GatekeeperError::Validation {
            field: "amount_minor",
            message: "amount must be positive".to_string(),
        });
    }
    if !descriptor
        .supported_currencies
        .iter()
        .any(|c| c == &request.currency)
    {
        return Err(GatekeeperError::Validation {
            field: "currency",
            message: format!(
                "{} does not support currency {}",
                descriptor.provider_id, request.currency
            ),
        });
    }
    Ok(())
}

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters
            .insert(adapter.descriptor().provider_id.clone(), adapter);
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(provider_id).cloned()
    }

    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        self.adapters
            .values()
            .map(|a| a.descriptor().clone())
            .collect()
    }
}
