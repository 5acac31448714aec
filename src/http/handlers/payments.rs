use crate::domain::payment::PaymentRequest;
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SubmitPaymentBody {
    pub provider_id: String,
    #[serde(flatten)]
    pub request: PaymentRequest,
}

fn network_origin(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .split(',')
        .next()
        .unwrap_or("unknown")
        .trim()
        .to_string()
}

pub async fn submit_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SubmitPaymentBody>,
) -> impl IntoResponse {
    let origin = network_origin(&headers);
    match state
        .orchestrator
        .submit(body.request, &body.provider_id, &origin)
        .await
    {
        Ok(resp) => (axum::http::StatusCode::OK, Json(resp)).into_response(),
        Err(err) => (err.status(), Json(err.envelope())).into_response(),
    }
}

pub async fn cancel_payment(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.orchestrator.cancel(session_id).await {
        Ok(()) => (
            axum::http::StatusCode::OK,
            Json(serde_json::json!({ "session_id": session_id, "status": "CANCELLED" })),
        )
            .into_response(),
        Err(err) => (err.status(), Json(err.envelope())).into_response(),
    }
}

pub async fn verify_transaction(
    State(state): State<AppState>,
    Path((provider_id, transaction_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.orchestrator.verify(&provider_id, &transaction_id).await {
        Ok(txn) => (axum::http::StatusCode::OK, Json(txn)).into_response(),
        Err(err) => (err.status(), Json(err.envelope())).into_response(),
    }
}

pub async fn health() -> impl IntoResponse {
    (axum::http::StatusCode::OK, "ok")
}
