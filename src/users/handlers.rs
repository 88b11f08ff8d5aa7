use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::extractors::{AreaUser, Dashboard},
    error::DirectoryError,
    state::AppState,
    users::dto::{
        ListParams, PaginatedResult, PublicUser, UserCandidate, UserCountResponse, UserPatch,
    },
};

type Admin = AreaUser<Dashboard>;

pub fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard/home", get(home))
        .route("/dashboard/users", get(list_users).post(create_user))
        .route("/dashboard/users/:id", get(get_user))
        .route("/dashboard/users/update/:id", post(update_user))
        .route(
            "/dashboard/users/delete/:id",
            post(delete_user).delete(delete_user),
        )
}

/// Dashboard landing data. A failed count is shown as zero; the failure is logged.
#[instrument(skip(state, _admin))]
pub async fn home(State(state): State<AppState>, _admin: Admin) -> Json<UserCountResponse> {
    let user_count = match state.users.get_user_count().await {
        Ok(n) => n,
        Err(e) => {
            error!(error = %e, "user count unavailable, showing 0");
            0
        }
    };
    Json(UserCountResponse { user_count })
}

/// Unparseable query strings fall back to the default listing.
#[instrument(skip(state, _admin, params))]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: Admin,
    params: Option<Query<ListParams>>,
) -> Result<Json<PaginatedResult<PublicUser>>, DirectoryError> {
    let params = match params {
        Some(Query(p)) => p,
        None => {
            warn!("could not parse list query, using defaults");
            ListParams::default()
        }
    };
    let page = state.users.list_users(params).await?;
    Ok(Json(page.map(PublicUser::from)))
}

#[instrument(skip(state, _admin))]
pub async fn get_user(
    State(state): State<AppState>,
    _admin: Admin,
    Path(id): Path<i64>,
) -> Result<Json<PublicUser>, DirectoryError> {
    let user = state.users.get_user_by_id(id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, admin, candidate), fields(admin_id = admin.user.id))]
pub async fn create_user(
    State(state): State<AppState>,
    admin: Admin,
    Json(candidate): Json<UserCandidate>,
) -> Result<(StatusCode, HeaderMap, Json<PublicUser>), DirectoryError> {
    let user = state.users.create_user(candidate).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/dashboard/users/{}", user.id).parse::<HeaderValue>() {
        headers.insert(header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(user.into())))
}

#[instrument(skip(state, admin, patch), fields(admin_id = admin.user.id))]
pub async fn update_user(
    State(state): State<AppState>,
    admin: Admin,
    Path(id): Path<i64>,
    Json(patch): Json<UserPatch>,
) -> Result<Json<PublicUser>, DirectoryError> {
    let user = state.users.update_user(id, patch).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, admin), fields(admin_id = admin.user.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    admin: Admin,
    Path(id): Path<i64>,
) -> Result<StatusCode, DirectoryError> {
    state.users.delete_user(id).await?;
    info!(user_id = id, "deleted from dashboard");
    Ok(StatusCode::NO_CONTENT)
}
