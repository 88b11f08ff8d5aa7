use std::marker::PhantomData;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::warn;

use super::jwt::JwtKeys;
use crate::{
    error::DirectoryError,
    state::AppState,
    users::repo_types::{User, UserType},
};

/// The caller behind a valid bearer token, re-read from the store so that
/// deactivation and deletion take effect immediately.
pub struct SessionUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for SessionUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| {
                (StatusCode::UNAUTHORIZED, "missing Authorization header").into_response()
            })?;

        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or_else(|| (StatusCode::UNAUTHORIZED, "invalid auth scheme").into_response())?;

        let claims = JwtKeys::from_ref(state).verify(token).map_err(|_| {
            warn!("invalid or expired token");
            (StatusCode::UNAUTHORIZED, "invalid or expired token").into_response()
        })?;

        let user = match state.users.get_user_by_id(claims.sub).await {
            Ok(u) => u,
            Err(DirectoryError::NotFound(_)) => {
                warn!(user_id = claims.sub, "token for missing or deleted user");
                return Err((StatusCode::UNAUTHORIZED, "user not found").into_response());
            }
            Err(e) => return Err(e.into_response()),
        };

        if !user.status {
            warn!(user_id = user.id, "inactive user rejected");
            return Err((StatusCode::FORBIDDEN, "account is inactive").into_response());
        }

        Ok(SessionUser(user))
    }
}

/// An area of the back-office reserved for one user type.
pub trait Area: Send + Sync + 'static {
    const REQUIRED: UserType;
}

pub struct Dashboard;

impl Area for Dashboard {
    const REQUIRED: UserType = UserType::System;
}

pub struct Panel;

impl Area for Panel {
    const REQUIRED: UserType = UserType::Panel;
}

/// Active session whose stored type matches the area.
pub struct AreaUser<A: Area> {
    pub user: User,
    _area: PhantomData<A>,
}

#[async_trait]
impl<A: Area> FromRequestParts<AppState> for AreaUser<A> {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let SessionUser(user) = SessionUser::from_request_parts(parts, state).await?;
        if user.user_type != A::REQUIRED {
            warn!(
                user_id = user.id,
                user_type = %user.user_type,
                required = %A::REQUIRED,
                "user type not allowed here"
            );
            return Err((StatusCode::FORBIDDEN, "not allowed for this user type").into_response());
        }
        Ok(AreaUser {
            user,
            _area: PhantomData,
        })
    }
}
