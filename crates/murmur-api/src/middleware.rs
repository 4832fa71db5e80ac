use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// The user an access token was issued for, set by [`require_auth`].
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

/// Extract and validate the bearer access token from the Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::MissingToken)?;

    let user_id = state.sessions.authorize(token)?;

    req.extensions_mut().insert(AuthUser(user_id));
    Ok(next.run(req).await)
}
