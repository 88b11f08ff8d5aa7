use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::{error, info, instrument};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest},
        jwt::JwtKeys,
    },
    error::DirectoryError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/auth/login", post(login))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, DirectoryError> {
    payload.account = payload.account.trim().to_string();
    if payload.account.is_empty() || payload.password.is_empty() {
        return Err(DirectoryError::InvalidCredentials);
    }

    let user = state
        .users
        .authenticate(&payload.account, &payload.password)
        .await?;

    if !user.status {
        return Err(DirectoryError::InvalidCredentials);
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id, user.user_type).map_err(|e| {
        error!(error = %e, "jwt sign failed");
        DirectoryError::Internal(e.to_string())
    })?;

    info!(user_id = user.id, account = %user.account, "user logged in");
    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}
