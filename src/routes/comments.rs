use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::posts::ReactionBody;
use crate::content::comments;
use crate::db::models::{Comment, Reaction};
use crate::error::AppResult;
use crate::extractors::{CurrentUser, JsonBody, PathParam, QueryParams};
use crate::pagination::{PageParams, ScrollPage, ScrollRequest, DEFAULT_COMMENT_PAGE_SIZE};
use crate::reactions::{self, ReactionTarget};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CommentsResponse {
    comments: Vec<Comment>,
    page: i64,
    page_size: i64,
    has_more: bool,
}

impl From<ScrollPage<Comment>> for CommentsResponse {
    fn from(page: ScrollPage<Comment>) -> Self {
        Self {
            comments: page.items,
            page: page.page,
            page_size: page.page_size,
            has_more: page.has_more,
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct ContentBody {
    #[serde(default)]
    pub(crate) content: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/posts/{post}/comments",
            get(list_comments).post(create_comment),
        )
        .route("/comments/{id}/react", post(react).delete(unreact))
}

async fn list_comments(
    State(state): State<AppState>,
    _user: CurrentUser,
    PathParam(slug): PathParam<String>,
    QueryParams(params): QueryParams<PageParams>,
) -> AppResult<Json<CommentsResponse>> {
    let request = ScrollRequest::new(params.page, params.page_size, DEFAULT_COMMENT_PAGE_SIZE);
    let conn = state.db.get()?;
    let page = comments::list_comments(&conn, &slug, request)?;
    Ok(Json(page.into()))
}

async fn create_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(slug): PathParam<String>,
    JsonBody(body): JsonBody<ContentBody>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let conn = state.db.get()?;
    let comment = comments::create_comment(&conn, &slug, user.id, &body.content)?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn react(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(id): PathParam<i64>,
    JsonBody(body): JsonBody<ReactionBody>,
) -> AppResult<(StatusCode, Json<Reaction>)> {
    let kind = body.kind()?;
    let conn = state.db.get()?;
    let reaction = reactions::set_reaction(&conn, ReactionTarget::Comment, user.id, id, kind)?;
    Ok((StatusCode::CREATED, Json(reaction)))
}

async fn unreact(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(id): PathParam<i64>,
) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    reactions::clear_reaction(&conn, ReactionTarget::Comment, user.id, id)?;
    Ok(StatusCode::NO_CONTENT)
}
