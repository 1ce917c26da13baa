use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::blocking;
use crate::auth::{accounts, reset};
use crate::error::AppResult;
use crate::extractors::JsonBody;
use crate::mail;
use crate::state::AppState;

/// Same body whether or not the email belongs to anyone.
const RESET_REQUESTED: &str = "If user exist, email has been sent";

#[derive(Deserialize)]
struct CredentialsBody {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
struct ForgotPasswordBody {
    #[serde(default)]
    email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResetPasswordBody {
    #[serde(default)]
    token: String,
    #[serde(default)]
    new_password: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
}

async fn register(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CredentialsBody>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let db = state.db.clone();
    let cost = state.config.auth.bcrypt_cost;
    blocking(move || {
        let conn = db.get()?;
        accounts::register(&conn, &body.email, &body.password, cost)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(json!({ "message": "Ok" }))))
}

async fn login(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CredentialsBody>,
) -> AppResult<Json<Value>> {
    let db = state.db.clone();
    let tokens = state.tokens.clone();
    let cost = state.config.auth.bcrypt_cost;
    let outcome = blocking(move || {
        let conn = db.get()?;
        accounts::login(&conn, &tokens, &body.email, &body.password, cost)
    })
    .await?;

    Ok(Json(json!({
        "jwt_sign": outcome.token,
        "nickname": outcome.nickname,
        "id": outcome.id,
    })))
}

async fn forgot_password(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<ForgotPasswordBody>,
) -> AppResult<Json<Value>> {
    let ttl = Duration::minutes(state.config.auth.reset_token_minutes);
    let issued = {
        let conn = state.db.get()?;
        reset::issue_reset_token(&conn, &body.email, ttl, Utc::now().timestamp())?
    };

    if let Some((user, token)) = issued {
        let link = format!(
            "{}/{}",
            state.config.auth.reset_link_base.trim_end_matches('/'),
            token.token
        );
        let message = mail::password_reset_message(&state.config.mail.from, &user.email, &link);
        mail::dispatch(state.mailer.clone(), message);
    }

    Ok(Json(json!({ "message": RESET_REQUESTED })))
}

async fn reset_password(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<ResetPasswordBody>,
) -> AppResult<Json<Value>> {
    let db = state.db.clone();
    let cost = state.config.auth.bcrypt_cost;
    blocking(move || {
        let conn = db.get()?;
        reset::reset_password(
            &conn,
            &body.token,
            &body.new_password,
            cost,
            Utc::now().timestamp(),
        )
    })
    .await?;

    Ok(Json(json!({ "message": "Password updated" })))
}
