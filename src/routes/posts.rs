use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::content::posts::{self, PostFilter, PostPatch};
use crate::db::models::{Post, PostDetail, Reaction, ReactionKind};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, JsonBody, PathParam, QueryParams};
use crate::pagination::{OffsetPage, OffsetRequest, PageParams, DEFAULT_POST_PAGE_SIZE};
use crate::reactions::{self, ReactionTarget};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PostsResponse {
    posts: Vec<Post>,
    page: i64,
    page_size: i64,
    total: i64,
}

impl From<OffsetPage<Post>> for PostsResponse {
    fn from(page: OffsetPage<Post>) -> Self {
        Self {
            posts: page.items,
            page: page.page,
            page_size: page.page_size,
            total: page.total,
        }
    }
}

#[derive(Deserialize)]
struct NewPostBody {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

/// `{"type": "LIKE" | "DISLIKE"}`
#[derive(Deserialize)]
pub(crate) struct ReactionBody {
    #[serde(rename = "type", default)]
    kind: String,
}

impl ReactionBody {
    pub(crate) fn kind(&self) -> AppResult<ReactionKind> {
        self.kind
            .parse()
            .map_err(|_| AppError::bad_request("Reaction type must be LIKE or DISLIKE"))
    }
}

pub fn router() -> Router<AppState> {
    // `{post}` is a slug except under /react, where it is an id. The
    // router allows one parameter name per segment.
    Router::new()
        .route("/posts", get(list_posts))
        .route("/posts/{post}", get(get_post))
        .route("/posts/{post}/react", post(react).delete(unreact))
        .route("/new-post", post(create_post))
        .route("/post/{id}", put(update_post).delete(delete_post))
}

async fn list_posts(
    State(state): State<AppState>,
    _user: CurrentUser,
    QueryParams(params): QueryParams<PageParams>,
) -> AppResult<Json<PostsResponse>> {
    let request = OffsetRequest::new(params.page, params.page_size, DEFAULT_POST_PAGE_SIZE);
    let filter = PostFilter {
        author_id: None,
        search: params.search.as_deref(),
    };
    let conn = state.db.get()?;
    let page = posts::list_posts(&conn, filter, request)?;
    Ok(Json(page.into()))
}

async fn get_post(
    State(state): State<AppState>,
    _user: CurrentUser,
    PathParam(slug): PathParam<String>,
) -> AppResult<Json<PostDetail>> {
    let conn = state.db.get()?;
    Ok(Json(posts::get_post_by_slug(&conn, &slug)?))
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(body): JsonBody<NewPostBody>,
) -> AppResult<(StatusCode, Json<Post>)> {
    let conn = state.db.get()?;
    let post = posts::create_post(&conn, user.id, &body.title, &body.content)?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn update_post(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(id): PathParam<i64>,
    JsonBody(patch): JsonBody<PostPatch>,
) -> AppResult<Json<Post>> {
    let conn = state.db.get()?;
    Ok(Json(posts::update_post(&conn, id, user.id, &patch)?))
}

async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(id): PathParam<i64>,
) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    posts::delete_post(&conn, id, user.id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn react(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(id): PathParam<i64>,
    JsonBody(body): JsonBody<ReactionBody>,
) -> AppResult<(StatusCode, Json<Reaction>)> {
    let kind = body.kind()?;
    let conn = state.db.get()?;
    let reaction = reactions::set_reaction(&conn, ReactionTarget::Post, user.id, id, kind)?;
    Ok((StatusCode::CREATED, Json(reaction)))
}

async fn unreact(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(id): PathParam<i64>,
) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    reactions::clear_reaction(&conn, ReactionTarget::Post, user.id, id)?;
    Ok(StatusCode::NO_CONTENT)
}
