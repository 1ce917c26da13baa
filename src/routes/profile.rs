use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};

use super::posts::PostsResponse;
use crate::content::posts::{self, PostFilter, PROFILE_POST_LIMIT};
use crate::db::models::{Post, User};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, JsonBody, PathParam, QueryParams};
use crate::identity::{self, ProfileUpdate};
use crate::pagination::{OffsetRequest, PageParams, DEFAULT_POST_PAGE_SIZE};
use crate::state::AppState;
use crate::uploads::MAX_AVATAR_BYTES;

/// Multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Serialize)]
struct PublicProfile {
    #[serde(flatten)]
    user: User,
    posts: Vec<Post>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_self))
        .route("/me", put(update_self))
        .route(
            "/me/avatar",
            post(upload_avatar).layer(DefaultBodyLimit::max(MAX_AVATAR_BYTES + MULTIPART_OVERHEAD)),
        )
        .route("/me/posts", get(list_mine))
        .route("/user/{nickname}", get(public_profile))
}

async fn get_self(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let user = identity::get_user(&conn, user.id)?;
    Ok(Json(json!({ "user": user })))
}

async fn update_self(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(update): JsonBody<ProfileUpdate>,
) -> AppResult<Json<User>> {
    let conn = state.db.get()?;
    Ok(Json(identity::update_profile(&conn, user.id, &update)?))
}

async fn upload_avatar(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<Value>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(e.body_text()))?
    {
        if field.name() != Some("avatar") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::bad_request(e.body_text()))?;

        let url = state.avatars.store(&file_name, data).await?;
        let conn = state.db.get()?;
        identity::set_avatar(&conn, user.id, &url)?;
        return Ok((StatusCode::CREATED, Json(json!({ "avatar": url }))));
    }

    Err(AppError::bad_request("No avatar file provided"))
}

async fn list_mine(
    State(state): State<AppState>,
    user: CurrentUser,
    QueryParams(params): QueryParams<PageParams>,
) -> AppResult<Json<PostsResponse>> {
    let request = OffsetRequest::new(params.page, params.page_size, DEFAULT_POST_PAGE_SIZE);
    let filter = PostFilter {
        author_id: Some(user.id),
        search: params.search.as_deref(),
    };
    let conn = state.db.get()?;
    Ok(Json(posts::list_posts(&conn, filter, request)?.into()))
}

async fn public_profile(
    State(state): State<AppState>,
    _user: CurrentUser,
    PathParam(nickname): PathParam<String>,
) -> AppResult<Json<PublicProfile>> {
    let conn = state.db.get()?;
    let user = identity::find_by_nickname(&conn, &nickname)?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    let posts = posts::latest_posts_by_author(&conn, user.id, PROFILE_POST_LIMIT)?;
    Ok(Json(PublicProfile { user, posts }))
}
