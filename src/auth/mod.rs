pub mod accounts;
pub mod password;
pub mod reset;
pub mod session;

use rusqlite::Connection;

use crate::db::models::Role;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::identity;

use self::session::TokenSigner;

/// Resolve a bearer token to the calling user.
///
/// Fails with Unauthorized when the token does not verify, the user is
/// gone, or the token predates the user's last password reset.
pub fn authenticate(conn: &Connection, signer: &TokenSigner, token: &str) -> AppResult<CurrentUser> {
    let claims = signer.verify(token).map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        AppError::from(e)
    })?;

    let record = identity::session_record(conn, claims.sub)?
        .ok_or_else(|| AppError::unauthorized("Invalid token"))?;

    if record.token_version != claims.ver {
        return Err(AppError::unauthorized("Invalid token"));
    }

    Ok(CurrentUser {
        id: claims.sub,
        email: record.email,
        role: record.role,
    })
}

/// Exact role match, not a hierarchy.
pub fn require_role(user: &CurrentUser, role: Role) -> AppResult<()> {
    if user.role != role {
        return Err(AppError::forbidden("Access denied"));
    }
    Ok(())
}
