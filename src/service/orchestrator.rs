use crate::audit::event::{SecurityEventType, Severity, TransactionAudit};
use crate::audit::logger::AuditLogger;
use crate::domain::payment::{PaymentRequest, PaymentResponse};
use crate::domain::session::{PaymentSession, SessionStatus};
use crate::error::GatekeeperError;
use crate::providers::{ProviderRegistry, ProviderTransaction};
use crate::security::crypto;
use crate::security::fraud::{self, FraudWeights, HistoryRecord, RiskDecision, TransactionSnapshot};
use crate::security::rate_limit::RateLimiter;
use crate::service::session_store::SessionStore;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct GatekeeperPolicy {
    pub allowed_currencies: Vec<String>,
    pub amount_ceiling_minor: i64,
    pub clock_skew_seconds: i64,
    pub session_ttl_seconds: i64,
    pub max_attempts: i32,
    pub fraud_history_limit: i64,
    /// Key for encrypting PII (billing contact) inside audit metadata.
    pub pii_encryption_key: [u8; 32],
}

impl Default for GatekeeperPolicy {
    fn default() -> Self {
        Self {
            allowed_currencies: ["USD", "EUR", "INR", "PTS", "BTR"]
                .into_iter()
                .map(String::from)
                .collect(),
            amount_ceiling_minor: 5_000_000,
            clock_skew_seconds: 300,
            session_ttl_seconds: 1_800,
            max_attempts: 3,
            fraud_history_limit: 200,
            pii_encryption_key: *b"dev-only-key-dev-only-key-dev-ok",
        }
    }
}

/// Façade sequencing validate → rate-limit → fraud → session → provider
/// dispatch → result recording. The only entry point the caller-facing
/// surface touches.
#[derive(Clone)]
pub struct Orchestrator {
    pub providers: Arc<ProviderRegistry>,
    pub sessions: SessionStore,
    pub audit: AuditLogger,
    pub rate_limiter: RateLimiter,
    pub fraud_weights: FraudWeights,
    pub policy: GatekeeperPolicy,
}

impl Orchestrator {
    pub async fn submit(
        &self,
        request: PaymentRequest,
        provider_id: &str,
        network_origin: &str,
    ) -> Result<PaymentResponse, GatekeeperError> {
        let now = Utc::now();
        let payer_id = request.payer.payer_id.clone();

        if let Err(err) = self.validate(&request, now) {
            self.audit
                .security_event(
                    SecurityEventType::ValidationRejected,
                    Severity::Warning,
                    Some(&payer_id),
                    &err.to_string(),
                    json!({ "provider_id": provider_id }),
                )
                .await?;
            return Err(err);
        }

        self.audit
            .security_event(
                SecurityEventType::PaymentSubmitted,
                Severity::Info,
                Some(&payer_id),
                "payment submitted",
                json!({
                    "provider_id": provider_id,
                    "amount_minor": request.amount_minor,
                    "currency": request.currency,
                }),
            )
            .await?;

        // (payer, network origin) is the throttling identity
        let identifier = format!("{payer_id}:{network_origin}");
        let limit = self.rate_limiter.check(&identifier, now).await?;
        if !limit.allowed {
            let retry_after_ms = limit.retry_after_ms.unwrap_or(0);
            self.audit
                .security_event(
                    SecurityEventType::RateLimitBreached,
                    Severity::Warning,
                    Some(&payer_id),
                    "submission rate limit breached",
                    json!({ "identifier": identifier, "retry_after_ms": retry_after_ms }),
                )
                .await?;
            return Err(GatekeeperError::RateLimited {
                retry_after_ms,
                reset_at: limit.reset_at,
            });
        }

        let history = self.load_history(&payer_id).await?;
        let snapshot = TransactionSnapshot {
            payer_id: payer_id.clone(),
            amount_minor: request.amount_minor,
            country: request.metadata.geo_country.clone(),
            device_fingerprint: request.metadata.device_fingerprint.clone(),
            timestamp: now,
        };
        let analysis = fraud::analyze(&snapshot, &history, &self.fraud_weights);
        self.audit
            .security_event(
                SecurityEventType::FraudScored,
                Severity::Info,
                Some(&payer_id),
                &format!("risk score {:.1}", analysis.score),
                json!({
                    "score": analysis.score,
                    "confidence": analysis.confidence,
                    "factors": analysis.factors,
                }),
            )
            .await?;

        let mut warnings = Vec::new();
        match analysis.decision {
            RiskDecision::Block => {
                self.audit
                    .security_event(
                        SecurityEventType::FraudBlocked,
                        Severity::Critical,
                        Some(&payer_id),
                        &format!("transaction blocked at score {:.1}", analysis.score),
                        json!({ "score": analysis.score, "factors": analysis.factors }),
                    )
                    .await?;
                return Err(GatekeeperError::FraudBlocked {
                    risk_score: analysis.score,
                    factors: analysis.factors,
                });
            }
            RiskDecision::Review => {
                warnings.push(format!("flagged for review at risk score {:.0}", analysis.score));
            }
            RiskDecision::Approve => {}
        }

        let adapter = self
            .providers
            .get(provider_id)
            .ok_or_else(|| GatekeeperError::UnknownProvider(provider_id.to_string()))?;

        let session = PaymentSession::new(
            request.clone(),
            provider_id,
            now + Duration::seconds(self.policy.session_ttl_seconds),
            self.policy.max_attempts,
            crypto::generate_secure_token(),
            analysis.score,
            analysis.risk_level(),
            warnings.clone(),
            now,
        );
        let session_id = session.session_id;
        self.sessions.insert(session.clone())?;
        self.record_transaction(&session, now).await?;

        let attempts = self
            .sessions
            .update(&session_id, |s| {
                s.attempts += 1;
                s.attempts
            })?
            .ok_or(GatekeeperError::UnknownSession(session_id))?;
        if attempts > self.policy.max_attempts {
            self.apply_transition(&session_id, SessionStatus::Failed, now)
                .await?;
            return Err(GatekeeperError::Provider {
                provider: provider_id.to_string(),
                reason: "MAX_ATTEMPTS_EXCEEDED".to_string(),
                retryable: false,
            });
        }

        match adapter.initialize(&request).await {
            Ok(resp) => {
                self.sessions
                    .update(&session_id, |s| {
                        s.provider_transaction_ref = Some(resp.transaction_id.clone());
                    })?
                    .ok_or(GatekeeperError::UnknownSession(session_id))?;
                self.apply_transition(&session_id, SessionStatus::Active, now)
                    .await?;
                Ok(PaymentResponse {
                    success: true,
                    session_id,
                    transaction_id: resp.transaction_id,
                    status: resp.status,
                    security_score: analysis.score,
                    warnings,
                    next_action: resp.next_action,
                })
            }
            Err(err) => {
                self.apply_transition(&session_id, SessionStatus::Failed, now)
                    .await?;
                self.audit
                    .security_event(
                        SecurityEventType::ProviderError,
                        Severity::Error,
                        Some(&payer_id),
                        &err.to_string(),
                        json!({ "provider_id": provider_id, "session_id": session_id }),
                    )
                    .await?;
                Err(err)
            }
        }
    }

    /// Polling boundary. Also the lazy-expiry touch point: a lapsed session
    /// observed here is persisted as `Expired` before the provider answer is
    /// returned.
    pub async fn verify(
        &self,
        provider_id: &str,
        transaction_id: &str,
    ) -> Result<ProviderTransaction, GatekeeperError> {
        let adapter = self
            .providers
            .get(provider_id)
            .ok_or_else(|| GatekeeperError::UnknownProvider(provider_id.to_string()))?;

        let now = Utc::now();
        if let Some(session) = self
            .sessions
            .find_by_transaction_ref(provider_id, transaction_id)?
        {
            if session.effective_status(now) == SessionStatus::Expired
                && session.status != SessionStatus::Expired
            {
                self.apply_transition(&session.session_id, SessionStatus::Expired, now)
                    .await?;
                self.audit
                    .security_event(
                        SecurityEventType::SessionExpired,
                        Severity::Warning,
                        Some(&session.request.payer.payer_id),
                        "session expired on access",
                        json!({ "session_id": session.session_id }),
                    )
                    .await?;
            }
        }

        adapter.verify(transaction_id).await
    }

    /// Inbound provider callback. Idempotent: the session's current status is
    /// the de-duplication key, so replays of an already-applied terminal event
    /// change nothing and credit nothing.
    pub async fn handle_webhook(
        &self,
        provider_id: &str,
        payload: &[u8],
        signature: &str,
    ) -> Result<(), GatekeeperError> {
        let adapter = self
            .providers
            .get(provider_id)
            .ok_or_else(|| GatekeeperError::UnknownProvider(provider_id.to_string()))?;

        let event = match adapter.handle_webhook(payload, signature).await {
            Ok(event) => event,
            Err(err) => {
                self.audit
                    .security_event(
                        SecurityEventType::WebhookRejected,
                        Severity::Critical,
                        None,
                        "webhook rejected without touching session state",
                        json!({ "provider_id": provider_id, "reason": err.code() }),
                    )
                    .await?;
                return Err(err);
            }
        };

        let target = match event.status {
            crate::domain::payment::PaymentStatus::Succeeded => SessionStatus::Completed,
            crate::domain::payment::PaymentStatus::Failed => SessionStatus::Failed,
            crate::domain::payment::PaymentStatus::Pending => {
                tracing::info!(
                    "ignoring non-terminal webhook for {} {}",
                    provider_id,
                    event.transaction_id
                );
                return Ok(());
            }
        };

        let session = match self
            .sessions
            .find_by_transaction_ref(provider_id, &event.transaction_id)?
        {
            Some(session) => session,
            None => {
                self.audit
                    .security_event(
                        SecurityEventType::WebhookOrphaned,
                        Severity::Warning,
                        None,
                        "verified webhook matched no live session",
                        json!({ "provider_id": provider_id, "transaction_id": event.transaction_id }),
                    )
                    .await?;
                return Ok(());
            }
        };

        let now = Utc::now();
        let payer_id = session.request.payer.payer_id.clone();
        let effective = session.effective_status(now);

        if effective == target {
            self.audit
                .security_event(
                    SecurityEventType::WebhookReplayed,
                    Severity::Info,
                    Some(&payer_id),
                    "duplicate terminal webhook absorbed",
                    json!({ "session_id": session.session_id, "status": target.as_str() }),
                )
                .await?;
            return Ok(());
        }

        if effective.is_terminal() {
            if effective == SessionStatus::Cancelled && target == SessionStatus::Completed {
                // cancellation stands; flag the charge for reversal
                self.audit
                    .security_event(
                        SecurityEventType::CancellationReconciled,
                        Severity::Critical,
                        Some(&payer_id),
                        "provider confirmed success after cancellation",
                        json!({
                            "session_id": session.session_id,
                            "transaction_id": event.transaction_id,
                            "needs_reversal": true,
                        }),
                    )
                    .await?;
            } else {
                self.audit
                    .security_event(
                        SecurityEventType::WebhookReplayed,
                        Severity::Warning,
                        Some(&payer_id),
                        "webhook conflicts with settled terminal state",
                        json!({
                            "session_id": session.session_id,
                            "stored": effective.as_str(),
                            "incoming": target.as_str(),
                        }),
                    )
                    .await?;
            }
            return Ok(());
        }

        self.apply_transition(&session.session_id, target, now).await?;
        self.audit
            .security_event(
                SecurityEventType::WebhookAccepted,
                Severity::Info,
                Some(&payer_id),
                "verified webhook applied",
                json!({ "session_id": session.session_id, "status": target.as_str() }),
            )
            .await?;
        Ok(())
    }

    pub async fn cancel(&self, session_id: Uuid) -> Result<(), GatekeeperError> {
        let now = Utc::now();
        let session = self
            .sessions
            .get(&session_id)?
            .ok_or(GatekeeperError::UnknownSession(session_id))?;

        self.apply_transition(&session_id, SessionStatus::Cancelled, now)
            .await?;
        self.audit
            .security_event(
                SecurityEventType::CancellationRequested,
                Severity::Info,
                Some(&session.request.payer.payer_id),
                "session cancelled by caller",
                json!({ "session_id": session_id }),
            )
            .await?;
        Ok(())
    }

    fn validate(&self, request: &PaymentRequest, now: DateTime<Utc>) -> Result<(), GatekeeperError> {
        if request.amount_minor <= 0 {
            return Err(GatekeeperError::Validation {
                field: "amount_minor",
                message: "amount must be positive".to_string(),
            });
        }
        if request.amount_minor > self.policy.amount_ceiling_minor {
            return Err(GatekeeperError::Validation {
                field: "amount_minor",
                message: format!(
                    "amount exceeds ceiling of {}",
                    self.policy.amount_ceiling_minor
                ),
            });
        }
        if !self
            .policy
            .allowed_currencies
            .iter()
            .any(|c| c == &request.currency)
        {
            return Err(GatekeeperError::Validation {
                field: "currency",
                message: format!("currency {} is not allowed", request.currency),
            });
        }
        let email = &request.payer.email;
        let domain_ok = email
            .split_once('@')
            .map_or(false, |(local, domain)| !local.is_empty() && domain.contains('.'));
        if !domain_ok {
            return Err(GatekeeperError::Validation {
                field: "email",
                message: "billing contact must be an email address".to_string(),
            });
        }
        let skew = (now - request.created_at).num_seconds().abs();
        if skew > self.policy.clock_skew_seconds {
            return Err(GatekeeperError::Validation {
                field: "created_at",
                message: format!("timestamp outside {}s clock-skew window", self.policy.clock_skew_seconds),
            });
        }
        if request.nonce.trim().is_empty() {
            return Err(GatekeeperError::Validation {
                field: "nonce",
                message: "nonce is required".to_string(),
            });
        }
        Ok(())
    }

    async fn load_history(&self, payer_id: &str) -> Result<Vec<HistoryRecord>, GatekeeperError> {
        let audits = self
            .audit
            .history_for(payer_id, self.policy.fraud_history_limit)
            .await?;
        // one INITIATED entry exists per attempt; later transition entries
        // would double-count velocity
        Ok(audits
            .iter()
            .filter(|a| a.status == SessionStatus::Initiated.as_str())
            .map(|a| HistoryRecord {
                amount_minor: a.amount_minor,
                country: a
                    .metadata
                    .get("geo_country")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                device_fingerprint: a
                    .metadata
                    .get("device_fingerprint")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                timestamp: a.created_at,
            })
            .collect())
    }

    async fn apply_transition(
        &self,
        session_id: &Uuid,
        to: SessionStatus,
        now: DateTime<Utc>,
    ) -> Result<PaymentSession, GatekeeperError> {
        let outcome = self
            .sessions
            .update(session_id, |s| s.transition(to, now).map(|_| s.clone()))?
            .ok_or(GatekeeperError::UnknownSession(*session_id))?;
        let session = outcome?;

        self.audit
            .security_event(
                SecurityEventType::SessionTransition,
                Severity::Info,
                Some(&session.request.payer.payer_id),
                &format!("session moved to {}", session.status),
                json!({ "session_id": session_id, "status": session.status.as_str() }),
            )
            .await?;
        self.record_transaction(&session, now).await?;
        Ok(session)
    }

    async fn record_transaction(
        &self,
        session: &PaymentSession,
        now: DateTime<Utc>,
    ) -> Result<(), GatekeeperError> {
        // billing contact is PII; the audit row carries it encrypted only
        let billing_contact = crypto::encrypt(
            session.request.payer.email.as_bytes(),
            &self.policy.pii_encryption_key,
        )?;
        let audit = TransactionAudit {
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
            metadata: json!({
                "geo_country": session.request.metadata.geo_country,
                "device_fingerprint": session.request.metadata.device_fingerprint,
                "intent_tag": session.request.metadata.intent_tag,
                "attempts": session.attempts,
                "billing_contact": billing_contact,
            }),
            created_at: now,
        };
        self.audit.transaction(&audit).await?;
        Ok(())
    }
}
