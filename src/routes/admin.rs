use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, put};
use axum::{Json, Router};

use crate::content::posts;
use crate::db::models::{Post, User};
use crate::error::AppResult;
use crate::extractors::{AdminUser, PathParam};
use crate::identity;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/users/{id}", put(promote_user).delete(delete_user))
        .route("/admin/posts", get(list_posts))
        .route("/admin/posts/{id}", delete(delete_post))
}

async fn list_users(State(state): State<AppState>, _admin: AdminUser) -> AppResult<Json<Vec<User>>> {
    let conn = state.db.get()?;
    Ok(Json(identity::list_users(&conn)?))
}

async fn list_posts(State(state): State<AppState>, _admin: AdminUser) -> AppResult<Json<Vec<Post>>> {
    let conn = state.db.get()?;
    Ok(Json(posts::list_all_posts(&conn)?))
}

async fn promote_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    PathParam(id): PathParam<i64>,
) -> AppResult<Json<User>> {
    let conn = state.db.get()?;
    let user = identity::promote_to_admin(&conn, id)?;
    tracing::info!(admin_id = admin.id, user_id = id, "Admin promoted user");
    Ok(Json(user))
}

async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    PathParam(id): PathParam<i64>,
) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    identity::delete_user(&conn, id)?;
    tracing::info!(admin_id = admin.id, user_id = id, "Admin deleted user");
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_post(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    PathParam(id): PathParam<i64>,
) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    posts::admin_delete_post(&conn, id)?;
    tracing::info!(admin_id = admin.id, post_id = id, "Admin deleted post");
    Ok(StatusCode::NO_CONTENT)
}
