use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::comments::ContentBody;
use super::posts::ReactionBody;
use crate::content::answers;
use crate::db::models::{Answer, Reaction};
use crate::error::AppResult;
use crate::extractors::{CurrentUser, JsonBody, PathParam, QueryParams};
use crate::pagination::{lenient_number, ScrollPage};
use crate::reactions::{self, ReactionTarget};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnswersResponse {
    answers: Vec<Answer>,
    page: i64,
    page_size: i64,
    has_more: bool,
}

impl From<ScrollPage<Answer>> for AnswersResponse {
    fn from(page: ScrollPage<Answer>) -> Self {
        Self {
            answers: page.items,
            page: page.page,
            page_size: page.page_size,
            has_more: page.has_more,
        }
    }
}

/// Answers have a fixed page size; only the page number is read.
#[derive(Debug, Default, Deserialize)]
struct AnswerPageParams {
    #[serde(default, deserialize_with = "lenient_number")]
    page: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/comments/{id}/answer", post(create_answer))
        .route("/comments/{id}/answers", get(list_answers))
        .route("/answers/{id}/react", post(react).delete(unreact))
}

async fn create_answer(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(comment_id): PathParam<i64>,
    JsonBody(body): JsonBody<ContentBody>,
) -> AppResult<(StatusCode, Json<Answer>)> {
    let conn = state.db.get()?;
    let answer = answers::create_answer(&conn, comment_id, user.id, &body.content)?;
    Ok((StatusCode::CREATED, Json(answer)))
}

async fn list_answers(
    State(state): State<AppState>,
    _user: CurrentUser,
    PathParam(comment_id): PathParam<i64>,
    QueryParams(params): QueryParams<AnswerPageParams>,
) -> AppResult<Json<AnswersResponse>> {
    let conn = state.db.get()?;
    let page = answers::list_answers(&conn, comment_id, params.page)?;
    Ok(Json(page.into()))
}

async fn react(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(id): PathParam<i64>,
    JsonBody(body): JsonBody<ReactionBody>,
) -> AppResult<(StatusCode, Json<Reaction>)> {
    let kind = body.kind()?;
    let conn = state.db.get()?;
    let reaction = reactions::set_reaction(&conn, ReactionTarget::Answer, user.id, id, kind)?;
    Ok((StatusCode::CREATED, Json(reaction)))
}

async fn unreact(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(id): PathParam<i64>,
) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    reactions::clear_reaction(&conn, ReactionTarget::Answer, user.id, id)?;
    Ok(StatusCode::NO_CONTENT)
}
