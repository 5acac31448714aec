use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use payments_gatekeeper::audit::alert::{AlertHook, HttpAlertHook, NoopAlert};
use payments_gatekeeper::audit::logger::AuditLogger;
use payments_gatekeeper::audit::store_pg::PgAuditStore;
use payments_gatekeeper::config::AppConfig;
use payments_gatekeeper::providers::barter::BarterExchange;
use payments_gatekeeper::providers::card::CardProcessor;
use payments_gatekeeper::providers::points::PointsLedger;
use payments_gatekeeper::providers::wallet::WalletProvider;
use payments_gatekeeper::providers::{ProviderDescriptor, ProviderRegistry, SecurityTier};
use payments_gatekeeper::security::fraud::FraudWeights;
use payments_gatekeeper::security::rate_limit::{RateLimiter, RedisRateLimitStore};
use payments_gatekeeper::service::expiry_sweep::ExpirySweeper;
use payments_gatekeeper::service::orchestrator::{GatekeeperPolicy, Orchestrator};
use payments_gatekeeper::service::session_store::SessionStore;
use payments_gatekeeper::AppState;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&cfg.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let redis_client = redis::Client::open(cfg.redis_url.clone())?;

    let alert: Arc<dyn AlertHook> = match &cfg.alert_webhook_url {
        Some(url) => Arc::new(HttpAlertHook {
            target_url: url.clone(),
            client: reqwest::Client::new(),
        }),
        None => Arc::new(NoopAlert),
    };
    let audit = AuditLogger::new(Arc::new(PgAuditStore { pool: pool.clone() }), alert);

    let rate_limiter = RateLimiter::new(
        Arc::new(RedisRateLimitStore {
            client: redis::Client::open(cfg.redis_url.clone())?,
        }),
        cfg.rate_limit_window_ms,
        cfg.rate_limit_max_requests,
    );

    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(CardProcessor {
        descriptor: ProviderDescriptor {
            provider_id: "card".to_string(),
            display_name: "Card Processor".to_string(),
            supported_currencies: vec!["USD".to_string(), "EUR".to_string(), "INR".to_string()],
            regions: vec!["US".to_string(), "EU".to_string(), "IN".to_string()],
            fee_bps: 290,
            security_tier: SecurityTier::Enhanced,
        },
        base_url: cfg.card_base_url.clone(),
        key_id: cfg.card_key_id.clone(),
        key_secret: cfg.card_key_secret.clone(),
        webhook_secret: cfg.card_webhook_secret.clone(),
        timeout_ms: cfg.card_timeout_ms,
        webhook_tolerance_seconds: 300,
        client: reqwest::Client::new(),
        audit: audit.clone(),
    }));
    registry.register(Arc::new(WalletProvider {
        descriptor: ProviderDescriptor {
            provider_id: "wallet".to_string(),
            display_name: "Global Wallet".to_string(),
            supported_currencies: vec!["USD".to_string(), "EUR".to_string(), "INR".to_string()],
            regions: vec!["GLOBAL".to_string()],
            fee_bps: 150,
            security_tier: SecurityTier::Standard,
        },
        base_url: cfg.wallet_base_url.clone(),
        api_token: cfg.wallet_api_token.clone(),
        webhook_secret: cfg.wallet_webhook_secret.clone(),
        timeout_ms: cfg.wallet_timeout_ms,
        client: reqwest::Client::new(),
        audit: audit.clone(),
    }));
    registry.register(Arc::new(PointsLedger::new(
        &cfg.points_webhook_secret,
        audit.clone(),
    )));
    registry.register(Arc::new(BarterExchange::new(
        &cfg.barter_webhook_secret,
        audit.clone(),
    )));

    let sessions = SessionStore::new();
    let orchestrator = Orchestrator {
        providers: Arc::new(registry),
        sessions: sessions.clone(),
        audit: audit.clone(),
        rate_limiter,
        fraud_weights: FraudWeights {
            velocity: cfg.fraud_velocity_weight,
            amount_deviation: cfg.fraud_amount_weight,
            geo_novelty: cfg.fraud_geo_weight,
            device_novelty: cfg.fraud_device_weight,
        },
        policy: GatekeeperPolicy {
            allowed_currencies: cfg.allowed_currencies.clone(),
            amount_ceiling_minor: cfg.amount_ceiling_minor,
            clock_skew_seconds: cfg.clock_skew_seconds,
            session_ttl_seconds: cfg.session_ttl_seconds,
            max_attempts: cfg.max_attempts,
            fraud_history_limit: cfg.fraud_history_limit,
            pii_encryption_key: cfg.pii_encryption_key,
        },
    };

    let sweeper = ExpirySweeper {
        sessions,
        audit: audit.clone(),
        interval: std::time::Duration::from_secs(cfg.sweep_interval_seconds),
    };
    tokio::spawn(sweeper.run());

    let state = AppState {
        orchestrator,
        audit,
        pool,
        redis_client,
    };

    let admin_key = cfg.internal_api_key.clone();
    let admin_routes = Router::new()
        .route(
            "/audit/events",
            get(payments_gatekeeper::http::handlers::audit::list_events),
        )
        .layer(from_fn_with_state(
            admin_key,
            payments_gatekeeper::http::middleware::admin_auth::require_internal_api_key,
        ));

    let app = Router::new()
        .route(
            "/health",
            get(payments_gatekeeper::http::handlers::payments::health),
        )
        .route(
            "/payments",
            post(payments_gatekeeper::http::handlers::payments::submit_payment),
        )
        .route(
            "/payments/:session_id/cancel",
            post(payments_gatekeeper::http::handlers::payments::cancel_payment),
        )
        .route(
            "/providers/:provider_id/transactions/:transaction_id",
            get(payments_gatekeeper::http::handlers::payments::verify_transaction),
        )
        .route(
            "/webhooks/:provider_id",
            post(payments_gatekeeper::http::handlers::webhooks::provider_webhook),
        )
        .route(
            "/ops/readiness",
            get(payments_gatekeeper::http::handlers::ops::readiness),
        )
        .route(
            "/ops/liveness",
            get(payments_gatekeeper::http::handlers::ops::liveness),
        )
        .merge(admin_routes)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!("listening on {}", cfg.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
