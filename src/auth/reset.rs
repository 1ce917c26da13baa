//! Password-reset tokens: one live token per user, single use, expiring.

use chrono::Duration;
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};

use crate::auth::password;
use crate::db;
use crate::db::models::PasswordResetToken;
use crate::error::{AppError, AppResult};
use crate::identity;

const INVALID_TOKEN: &str = "Token is invalid or expired";

/// Store a fresh token for the user behind `email`, replacing any earlier
/// one. Returns `None` when no such user exists.
pub fn issue_reset_token(
    conn: &Connection,
    email: &str,
    ttl: Duration,
    now: i64,
) -> AppResult<Option<(identity::Credentials, PasswordResetToken)>> {
    let Some(user) = identity::find_credentials(conn, email)? else {
        return Ok(None);
    };

    let expires_at = now + ttl.num_seconds();
    for _ in 0..db::MAX_INSERT_ATTEMPTS {
        let token = generate_token();
        // The upsert on user_id makes replace-then-insert a single atomic
        // statement. A clash on the token column itself gets a new token.
        let result = conn.execute(
            "INSERT INTO password_reset_tokens (user_id, token, expires_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
               token = excluded.token,
               expires_at = excluded.expires_at",
            params![user.id, token, expires_at],
        );
        match result {
            Ok(_) => {
                tracing::info!(user_id = user.id, "Password reset token issued");
                let record = PasswordResetToken {
                    user_id: user.id,
                    token,
                    expires_at,
                };
                return Ok(Some((user, record)));
            }
            Err(e) if db::is_unique_violation(&e) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::Internal(
        "Could not allocate a unique reset token".into(),
    ))
}

pub fn find_token(conn: &Connection, token: &str) -> AppResult<Option<PasswordResetToken>> {
    let record = conn
        .query_row(
            "SELECT user_id, token, expires_at FROM password_reset_tokens WHERE token = ?1",
            params![token],
            |row| {
                Ok(PasswordResetToken {
                    user_id: row.get(0)?,
                    token: row.get(1)?,
                    expires_at: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(record)
}

/// Consume `token` and set a new password. Bumps the user's token_version
/// so sessions issued before the reset stop verifying.
pub fn reset_password(
    conn: &Connection,
    token: &str,
    new_password: &str,
    cost: u32,
    now: i64,
) -> AppResult<()> {
    if new_password.is_empty() {
        return Err(AppError::bad_request("New password is required"));
    }
    if token.is_empty() {
        return Err(AppError::bad_request(INVALID_TOKEN));
    }

    // Cheap rejection before paying for the hash.
    match find_token(conn, token)? {
        Some(record) if record.expires_at >= now => {}
        _ => return Err(AppError::bad_request(INVALID_TOKEN)),
    }

    let hash = password::hash_password(new_password, cost)?;

    db::immediate(conn, |tx| {
        // Re-read under the write lock; a concurrent reset may have used it.
        let record = match find_token(tx, token)? {
            Some(record) if record.expires_at >= now => record,
            _ => return Err(AppError::bad_request(INVALID_TOKEN)),
        };

        tx.execute(
            "UPDATE users SET password_hash = ?1, token_version = token_version + 1
             WHERE id = ?2",
            params![hash, record.user_id],
        )?;
        tx.execute(
            "DELETE FROM password_reset_tokens WHERE token = ?1",
            params![token],
        )?;

        tracing::info!(user_id = record.user_id, "Password reset completed");
        Ok(())
    })
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}
