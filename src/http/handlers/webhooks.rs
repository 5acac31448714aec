use crate::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;

pub const SIGNATURE_HEADER: &str = "x-provider-signature";

/// Inbound provider callback boundary. Responds fast; all downstream work is
/// idempotent, so providers may retry freely.
pub async fn provider_webhook(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    match state
        .orchestrator
        .handle_webhook(&provider_id, &body, signature)
        .await
    {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => (err.status(), Json(err.envelope())).into_response(),
    }
}
