use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::error::{AppError, AppResult};
use crate::extractors::PathParam;
use crate::state::AppState;
use crate::uploads::is_safe_name;

pub fn router() -> Router<AppState> {
    Router::new().route("/uploads/{name}", get(serve))
}

async fn serve(
    State(state): State<AppState>,
    PathParam(name): PathParam<String>,
) -> AppResult<Response> {
    if !is_safe_name(&name) {
        return Err(AppError::not_found("File not found"));
    }

    let path = state.config.uploads_path().join(&name);
    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::not_found("File not found"));
        }
        Err(e) => return Err(AppError::Internal(format!("reading {}: {}", name, e))),
    };

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
        ],
        data,
    )
        .into_response())
}
