//! Landing area for `panel` users.

use axum::{routing::get, Json, Router};
use tracing::instrument;

use crate::{
    auth::extractors::{AreaUser, Panel},
    state::AppState,
    users::dto::PublicUser,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/panel/home", get(home))
}

#[instrument(skip(session), fields(user_id = session.user.id))]
pub async fn home(session: AreaUser<Panel>) -> Json<PublicUser> {
    Json(session.user.into())
}
