use chrono::Utc;
use payments_gatekeeper::audit::alert::NoopAlert;
use payments_gatekeeper::audit::event::{EventFilter, SecurityEventType, Severity, TransactionAudit};
use payments_gatekeeper::audit::logger::AuditLogger;
use payments_gatekeeper::audit::store_mem::InMemoryAuditStore;
use payments_gatekeeper::domain::payment::{
    NextAction, PayerIdentity, PaymentRequest, PaymentStatus, RequestMetadata,
};
use payments_gatekeeper::error::GatekeeperError;
use payments_gatekeeper::providers::mock::MockProvider;
use payments_gatekeeper::providers::{ProviderDescriptor, ProviderRegistry, SecurityTier};
use payments_gatekeeper::security::crypto;
use payments_gatekeeper::security::fraud::FraudWeights;
use payments_gatekeeper::security::rate_limit::{InMemoryRateLimitStore, RateLimiter};
use payments_gatekeeper::service::orchestrator::{GatekeeperPolicy, Orchestrator};
use payments_gatekeeper::service::session_store::SessionStore;
use serde_json::json;
use std::sync::Arc;

const WEBHOOK_SECRET: &str = "whsec_test";

fn harness_with(behavior: &str, max_requests: i64) -> (Orchestrator, Arc<InMemoryAuditStore>) {
    let store = Arc::new(InMemoryAuditStore::new());
    let audit = AuditLogger::new(store.clone(), Arc::new(NoopAlert));

    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(MockProvider {
        descriptor: ProviderDescriptor {
            provider_id: "card".to_string(),
            display_name: "Card Processor".to_string(),
            supported_currencies: vec!["USD".to_string()],
            regions: vec!["US".to_string()],
            fee_bps: 290,
            security_tier: SecurityTier::Enhanced,
        },
        behavior: behavior.to_string(),
        webhook_secret: WEBHOOK_SECRET.to_string(),
        audit: audit.clone(),
    }));

    let orchestrator = Orchestrator {
        providers: Arc::new(registry),
        sessions: SessionStore::new(),
        audit,
        rate_limiter: RateLimiter::new(
            Arc::new(InMemoryRateLimitStore::new()),
            60_000,
            max_requests,
        ),
        fraud_weights: FraudWeights::default(),
        policy: GatekeeperPolicy::default(),
    };
    (orchestrator, store)
}

fn harness() -> (Orchestrator, Arc<InMemoryAuditStore>) {
    harness_with("ALWAYS_SUCCESS", 100)
}

fn request(amount_minor: i64) -> PaymentRequest {
    PaymentRequest {
        amount_minor,
        currency: "USD".to_string(),
        payer: PayerIdentity {
            payer_id: "payer_1".to_string(),
            email: "payer@example.com".to_string(),
        },
        metadata: RequestMetadata::default(),
        created_at: Utc::now(),
        nonce: "nonce-1".to_string(),
    }
}

fn signed_webhook(transaction_id: &str, status: &str) -> (Vec<u8>, String) {
    let body = serde_json::to_vec(&json!({
        "transaction_id": transaction_id,
        "status": status,
    }))
    .unwrap();
    let sig = crypto::sign(&body, WEBHOOK_SECRET);
    (body, sig)
}

fn completed_audits(store: &InMemoryAuditStore) -> Vec<TransactionAudit> {
    store
        .transactions()
        .into_iter()
        .filter(|t| t.status == "COMPLETED")
        .collect()
}

#[tokio::test]
async fn clean_submission_reaches_active_with_redirect() {
    let (orchestrator, _store) = harness();
    let resp = orchestrator
        .submit(request(5_000), "card", "203.0.113.7")
        .await
        .unwrap();

    assert!(resp.success);
    assert!(resp.security_score < 60.0);
    assert!(resp.warnings.is_empty());
    assert_eq!(resp.status, PaymentStatus::Pending);
    assert!(matches!(resp.next_action, Some(NextAction::Redirect { .. })));

    let session = orchestrator.sessions.get(&resp.session_id).unwrap().unwrap();
    assert_eq!(session.status.as_str(), "ACTIVE");
    assert!(!session.security_token.is_empty());
}

#[tokio::test]
async fn verified_webhook_completes_session_with_exactly_one_audit() {
    let (orchestrator, store) = harness();
    let resp = orchestrator
        .submit(request(5_000), "card", "203.0.113.7")
        .await
        .unwrap();

    let (body, sig) = signed_webhook(&resp.transaction_id, "SUCCEEDED");
    orchestrator
        .handle_webhook("card", &body, &sig)
        .await
        .unwrap();

    let session = orchestrator.sessions.get(&resp.session_id).unwrap().unwrap();
    assert_eq!(session.status.as_str(), "COMPLETED");
    assert_eq!(completed_audits(&store).len(), 1);
}

#[tokio::test]
async fn webhook_replay_is_absorbed_without_double_credit() {
    let (orchestrator, store) = harness();
    let resp = orchestrator
        .submit(request(5_000), "card", "203.0.113.7")
        .await
        .unwrap();

    let (body, sig) = signed_webhook(&resp.transaction_id, "SUCCEEDED");
    orchestrator.handle_webhook("card", &body, &sig).await.unwrap();
    orchestrator.handle_webhook("card", &body, &sig).await.unwrap();

    assert_eq!(completed_audits(&store).len(), 1);

    let replays = store_events(&orchestrator, SecurityEventType::WebhookReplayed).await;
    assert_eq!(replays.len(), 1);
}

#[tokio::test]
async fn tampered_webhook_is_rejected_and_audited_critical() {
    let (orchestrator, _store) = harness();
    let resp = orchestrator
        .submit(request(5_000), "card", "203.0.113.7")
        .await
        .unwrap();

    let (mut body, sig) = signed_webhook(&resp.transaction_id, "SUCCEEDED");
    body[0] ^= 0x01;
    let err = orchestrator
        .handle_webhook("card", &body, &sig)
        .await
        .unwrap_err();
    assert!(matches!(err, GatekeeperError::WebhookVerification));

    // session state untouched
    let session = orchestrator.sessions.get(&resp.session_id).unwrap().unwrap();
    assert_eq!(session.status.as_str(), "ACTIVE");

    let criticals = orchestrator
        .audit
        .query(&EventFilter {
            severity: Some(Severity::Critical),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(criticals
        .iter()
        .any(|e| e.event_type == SecurityEventType::WebhookRejected));
}

#[tokio::test]
async fn failed_webhook_moves_session_to_failed() {
    let (orchestrator, store) = harness();
    let resp = orchestrator
        .submit(request(5_000), "card", "203.0.113.7")
        .await
        .unwrap();

    let (body, sig) = signed_webhook(&resp.transaction_id, "FAILED");
    orchestrator.handle_webhook("card", &body, &sig).await.unwrap();

    let session = orchestrator.sessions.get(&resp.session_id).unwrap().unwrap();
    assert_eq!(session.status.as_str(), "FAILED");
    assert!(completed_audits(&store).is_empty());
}

#[tokio::test]
async fn cancellation_stands_against_late_provider_success() {
    let (orchestrator, store) = harness();
    let resp = orchestrator
        .submit(request(5_000), "card", "203.0.113.7")
        .await
        .unwrap();

    orchestrator.cancel(resp.session_id).await.unwrap();

    let (body, sig) = signed_webhook(&resp.transaction_id, "SUCCEEDED");
    orchestrator.handle_webhook("card", &body, &sig).await.unwrap();

    let session = orchestrator.sessions.get(&resp.session_id).unwrap().unwrap();
    assert_eq!(session.status.as_str(), "CANCELLED");
    assert!(completed_audits(&store).is_empty());

    let reconciled = store_events(&orchestrator, SecurityEventType::CancellationReconciled).await;
    assert_eq!(reconciled.len(), 1);
    assert_eq!(
        reconciled[0].metadata.get("needs_reversal"),
        Some(&serde_json::Value::Bool(true))
    );
}

#[tokio::test]
async fn cancelling_a_settled_session_conflicts() {
    let (orchestrator, _store) = harness();
    let resp = orchestrator
        .submit(request(5_000), "card", "203.0.113.7")
        .await
        .unwrap();

    let (body, sig) = signed_webhook(&resp.transaction_id, "SUCCEEDED");
    orchestrator.handle_webhook("card", &body, &sig).await.unwrap();

    let err = orchestrator.cancel(resp.session_id).await.unwrap_err();
    assert!(matches!(err, GatekeeperError::SessionState { .. }));
}

#[tokio::test]
async fn provider_failure_fails_the_session() {
    let (orchestrator, store) = harness_with("ALWAYS_FAILURE", 100);
    let err = orchestrator
        .submit(request(5_000), "card", "203.0.113.7")
        .await
        .unwrap_err();
    assert!(matches!(err, GatekeeperError::Provider { retryable: false, .. }));

    let failed: Vec<_> = store
        .transactions()
        .into_iter()
        .filter(|t| t.status == "FAILED")
        .collect();
    assert_eq!(failed.len(), 1);
}

#[tokio::test]
async fn rate_limit_denies_the_excess_request_before_any_provider_work() {
    let (orchestrator, store) = harness_with("ALWAYS_SUCCESS", 2);

    for _ in 0..2 {
        orchestrator
            .submit(request(5_000), "card", "203.0.113.7")
            .await
            .unwrap();
    }
    let err = orchestrator
        .submit(request(5_000), "card", "203.0.113.7")
        .await
        .unwrap_err();
    match err {
        GatekeeperError::RateLimited { retry_after_ms, .. } => assert!(retry_after_ms > 0),
        other => panic!("expected RateLimited, got {other:?}"),
    }

    // the denied attempt created no session audit
    let initiated: Vec<_> = store
        .transactions()
        .into_iter()
        .filter(|t| t.status == "INITIATED")
        .collect();
    assert_eq!(initiated.len(), 2);
}

#[tokio::test]
async fn different_network_origins_have_independent_budgets() {
    let (orchestrator, _store) = harness_with("ALWAYS_SUCCESS", 1);
    orchestrator
        .submit(request(5_000), "card", "203.0.113.7")
        .await
        .unwrap();
    orchestrator
        .submit(request(5_000), "card", "198.51.100.2")
        .await
        .unwrap();
}

#[tokio::test]
async fn hot_history_with_amount_spike_is_blocked_and_audited() {
    let (orchestrator, store) = harness();
    let now = Utc::now();

    // 30 prior attempts in the last day at an average of $50
    for i in 0..30 {
        store_seed(&store, 5_000, now - chrono::Duration::minutes(i * 20)).await;
    }

    let err = orchestrator
        .submit(request(60_000), "card", "203.0.113.7")
        .await
        .unwrap_err();
    match err {
        GatekeeperError::FraudBlocked { risk_score, factors } => {
            assert!(risk_score >= 80.0);
            assert!(factors.iter().any(|f| f.name == "amount_deviation"));
        }
        other => panic!("expected FraudBlocked, got {other:?}"),
    }

    let blocked = store_events(&orchestrator, SecurityEventType::FraudBlocked).await;
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].severity, Severity::Critical);
}

#[tokio::test]
async fn validation_rejects_bad_amounts_and_contacts() {
    let (orchestrator, _store) = harness();

    let err = orchestrator
        .submit(request(0), "card", "ip")
        .await
        .unwrap_err();
    assert!(matches!(err, GatekeeperError::Validation { field: "amount_minor", .. }));

    let err = orchestrator
        .submit(request(999_000_000), "card", "ip")
        .await
        .unwrap_err();
    assert!(matches!(err, GatekeeperError::Validation { field: "amount_minor", .. }));

    let mut bad_email = request(5_000);
    bad_email.payer.email = "not-an-email".to_string();
    let err = orchestrator.submit(bad_email, "card", "ip").await.unwrap_err();
    assert!(matches!(err, GatekeeperError::Validation { field: "email", .. }));

    let mut stale = request(5_000);
    stale.created_at = Utc::now() - chrono::Duration::hours(2);
    let err = orchestrator.submit(stale, "card", "ip").await.unwrap_err();
    assert!(matches!(err, GatekeeperError::Validation { field: "created_at", .. }));

    let mut bad_currency = request(5_000);
    bad_currency.currency = "XAU".to_string();
    let err = orchestrator
        .submit(bad_currency, "card", "ip")
        .await
        .unwrap_err();
    assert!(matches!(err, GatekeeperError::Validation { field: "currency", .. }));
}

#[tokio::test]
async fn audit_rows_carry_billing_contact_encrypted_only() {
    let (orchestrator, store) = harness();
    orchestrator
        .submit(request(5_000), "card", "203.0.113.7")
        .await
        .unwrap();

    let initiated = store
        .transactions()
        .into_iter()
        .find(|t| t.status == "INITIATED")
        .unwrap();
    let envelope: payments_gatekeeper::security::crypto::EncryptedEnvelope =
        serde_json::from_value(initiated.metadata.get("billing_contact").unwrap().clone())
            .unwrap();
    assert_ne!(envelope.ciphertext, "payer@example.com");

    let key = GatekeeperPolicy::default().pii_encryption_key;
    let plaintext = payments_gatekeeper::security::crypto::decrypt(&envelope, &key).unwrap();
    assert_eq!(plaintext, b"payer@example.com");
}

#[tokio::test]
async fn unknown_provider_is_a_404_class_error() {
    let (orchestrator, _store) = harness();
    let err = orchestrator
        .submit(request(5_000), "carrier-pigeon", "ip")
        .await
        .unwrap_err();
    assert!(matches!(err, GatekeeperError::UnknownProvider(_)));
}

async fn store_events(
    orchestrator: &Orchestrator,
    event_type: SecurityEventType,
) -> Vec<payments_gatekeeper::audit::event::SecurityEvent> {
    orchestrator
        .audit
        .query(&EventFilter {
            limit: Some(500),
            ..Default::default()
        })
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == event_type)
        .collect()
}

async fn store_seed(store: &InMemoryAuditStore, amount_minor: i64, at: chrono::DateTime<Utc>) {
    use payments_gatekeeper::audit::logger::AuditStore;
    store
        .append_transaction(&TransactionAudit {
            transaction_id: uuid::Uuid::new_v4().to_string(),
            session_id: uuid::Uuid::new_v4(),
            actor_id: "payer_1".to_string(),
            provider_id: "card".to_string(),
            amount_minor,
            currency: "USD".to_string(),
            status: "INITIATED".to_string(),
            security_score: 10.0,
            risk_level: "LOW".to_string(),
            warnings: Vec::new(),
            metadata: json!({}),
            created_at: at,
        })
        .await
        .unwrap();
}
