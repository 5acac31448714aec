pub mod audit {
    pub mod alert;
    pub mod event;
    pub mod logger;
    pub mod store_mem;
    pub mod store_pg;
}
pub mod config;
pub mod domain {
    pub mod payment;
    pub mod session;
}
pub mod error;
pub mod http {
    pub mod handlers {
        pub mod audit;
        pub mod ops;
        pub mod payments;
        pub mod webhooks;
    }
    pub mod middleware {
        pub mod admin_auth;
    }
}
pub mod providers;
pub mod security {
    pub mod crypto;
    pub mod fraud;
    pub mod rate_limit;
}
pub mod service {
    pub mod expiry_sweep;
    pub mod orchestrator;
    pub mod session_store;
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: service::orchestrator::Orchestrator,
    pub audit: audit::logger::AuditLogger,
    pub pool: sqlx::PgPool,
    pub redis_client: redis::Client,
}
