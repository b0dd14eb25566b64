//! Optional bearer-token guard for the dashboard API.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use super::{ApiError, DashboardState};

/// Rejects requests without `Authorization: Bearer <token>` when a token is configured.
/// Without a configured token every request passes.
pub async fn auth_middleware(
    State(state): State<DashboardState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    if provided != Some(expected) {
        warn!("Rejected dashboard request to {}", request.uri().path());
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(request).await)
}
