use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use murmur_types::api::{Envelope, LoginRequest, LoginResponse, RegisterRequest, RenewTokenRequest};

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::validate::validate_registration;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_registration(&req)?;

    let user = state
        .sessions
        .register(req.name.trim(), &req.email, &req.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::success(
            "User created. Check your email to verify your account",
            user.profile(),
        )),
    ))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.verify_email(&token).await?;
    Ok(Json(Envelope::ok("Email verified")))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::Validation("You must fill in all the inputs".into()));
    }

    let (user, tokens) = state.sessions.login(&req.email, &req.password).await?;

    Ok(Json(Envelope::success(
        "Login successful",
        LoginResponse {
            user: user.profile(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        },
    )))
}

pub async fn renew_token(
    State(state): State<AppState>,
    Json(req): Json<RenewTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.token.trim().is_empty() {
        return Err(ApiError::MissingToken);
    }
    let pair = state.sessions.renew(req.token.trim()).await?;
    Ok(Json(Envelope::success("Token renewed", pair)))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.logout(user_id).await?;
    Ok(Json(Envelope::ok("Logged out")))
}
