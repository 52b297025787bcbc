//! Externally triggered maintenance.

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};

use crate::services::reaper::{self, SweepReport};
use crate::state::AppState;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// `POST /api/cron/reap`: sweep guest staging data past retention.
///
/// 404 when no `CRON_SECRET` is configured, 401 on a missing or wrong token.
pub async fn reap(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<SweepReport>, StatusCode> {
    let Some(secret) = state.cron_secret.as_deref() else {
        return Err(StatusCode::NOT_FOUND);
    };
    if bearer_token(&headers) != Some(secret) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let report = reaper::sweep(&state.pool, state.guest_retention_days).await.map_err(|e| {
        tracing::error!(error = %e, "guest sweep failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(report))
}
