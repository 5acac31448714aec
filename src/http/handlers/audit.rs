use crate::audit::event::{EventFilter, Severity};
use crate::error::GatekeeperError;
use crate::AppState;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct EventQuery {
    pub actor_id: Option<String>,
    pub severity: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> impl IntoResponse {
    let filter = EventFilter {
        actor_id: query.actor_id,
        severity: query.severity.as_deref().and_then(Severity::parse),
        limit: query.limit,
    };
    match state.audit.query(&filter).await {
        Ok(events) => (axum::http::StatusCode::OK, Json(events)).into_response(),
        Err(err) => {
            let err = GatekeeperError::Internal(err);
            (err.status(), Json(err.envelope())).into_response()
        }
    }
}
