//! Identity store: users, credentials, roles, nicknames and avatars.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Deserialize;

use crate::db;
use crate::db::models::{Role, User};
use crate::error::{AppError, AppResult};

const USER_COLUMNS: &str =
    "id, email, COALESCE(nickname, 'User-' || id), avatar, role, created_at";

/// What login needs to know about an account.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub id: i64,
    pub email: String,
    pub nickname: String,
    pub password_hash: String,
    pub role: Role,
    pub token_version: i64,
}

/// What request authentication needs to know about an account.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub email: String,
    pub role: Role,
    pub token_version: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub nickname: Option<String>,
    /// Empty string clears the avatar.
    pub avatar: Option<String>,
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        nickname: row.get(2)?,
        avatar: row.get(3)?,
        role: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Emails are compared trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn find_by_id(conn: &Connection, id: i64) -> AppResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![id],
            map_user,
        )
        .optional()?;
    Ok(user)
}

pub fn get_user(conn: &Connection, id: i64) -> AppResult<User> {
    find_by_id(conn, id)?.ok_or_else(|| AppError::not_found("User not found"))
}

pub fn find_by_email(conn: &Connection, email: &str) -> AppResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
            params![normalize_email(email)],
            map_user,
        )
        .optional()?;
    Ok(user)
}

pub fn find_by_nickname(conn: &Connection, nickname: &str) -> AppResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE nickname = ?1", USER_COLUMNS),
            params![nickname],
            map_user,
        )
        .optional()?;
    Ok(user)
}

pub fn find_credentials(conn: &Connection, email: &str) -> AppResult<Option<Credentials>> {
    let creds = conn
        .query_row(
            "SELECT id, email, COALESCE(nickname, 'User-' || id), password_hash, role, token_version
             FROM users WHERE email = ?1",
            params![normalize_email(email)],
            |row| {
                Ok(Credentials {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    nickname: row.get(2)?,
                    password_hash: row.get(3)?,
                    role: row.get(4)?,
                    token_version: row.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(creds)
}

pub fn session_record(conn: &Connection, id: i64) -> AppResult<Option<SessionRecord>> {
    let record = conn
        .query_row(
            "SELECT email, role, token_version FROM users WHERE id = ?1",
            params![id],
            |row| {
                Ok(SessionRecord {
                    email: row.get(0)?,
                    role: row.get(1)?,
                    token_version: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(record)
}

/// Insert a user and give it the default `User-{id}` nickname. The id is
/// only known after the insert, hence two statements in one transaction.
pub fn create_user(conn: &Connection, email: &str, password_hash: &str) -> AppResult<i64> {
    let email = normalize_email(email);
    db::immediate(conn, |tx| {
        tx.execute(
            "INSERT INTO users (email, password_hash) VALUES (?1, ?2)",
            params![email, password_hash],
        )
        .map_err(|e| {
            if db::is_unique_violation(&e) {
                AppError::Conflict("User with such email already exists".into())
            } else {
                e.into()
            }
        })?;
        let id = tx.last_insert_rowid();

        // A user may already have picked this exact nickname by hand.
        let default = format!("User-{}", id);
        let nickname = if nickname_taken(tx, &default, id)? {
            format!("{}-{}", default, &uuid::Uuid::now_v7().simple().to_string()[24..])
        } else {
            default
        };
        tx.execute(
            "UPDATE users SET nickname = ?1 WHERE id = ?2",
            params![nickname, id],
        )?;
        Ok(id)
    })
}

fn nickname_taken(conn: &Connection, nickname: &str, except_id: i64) -> AppResult<bool> {
    let taken: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE nickname = ?1 AND id != ?2",
        params![nickname, except_id],
        |row| row.get(0),
    )?;
    Ok(taken)
}

pub fn update_profile(conn: &Connection, id: i64, update: &ProfileUpdate) -> AppResult<User> {
    let mut user = get_user(conn, id)?;

    if let Some(raw) = &update.nickname {
        let nickname = raw.trim();
        if nickname.is_empty() {
            return Err(AppError::bad_request("Nickname cannot be empty"));
        }
        if nickname.chars().count() > 32 {
            return Err(AppError::bad_request(
                "Nickname must be 32 characters or less",
            ));
        }
        if nickname_taken(conn, nickname, id)? {
            return Err(AppError::Conflict("Nickname is already in use".into()));
        }
        user.nickname = nickname.to_string();
    }

    if let Some(raw) = &update.avatar {
        let avatar = raw.trim();
        user.avatar = if avatar.is_empty() {
            None
        } else {
            validate_avatar_url(avatar)?;
            Some(avatar.to_string())
        };
    }

    conn.execute(
        "UPDATE users SET nickname = ?1, avatar = ?2 WHERE id = ?3",
        params![user.nickname, user.avatar, id],
    )
    .map_err(|e| {
        if db::is_unique_violation(&e) {
            AppError::Conflict("Nickname is already in use".into())
        } else {
            e.into()
        }
    })?;

    Ok(user)
}

/// Avatars are either absolute http(s) URLs or paths served by this host.
fn validate_avatar_url(avatar: &str) -> AppResult<()> {
    if avatar.starts_with('/') && !avatar.starts_with("//") {
        return Ok(());
    }
    match url::Url::parse(avatar) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(()),
        _ => Err(AppError::bad_request("Avatar must be an http(s) URL")),
    }
}

pub fn set_avatar(conn: &Connection, id: i64, url: &str) -> AppResult<User> {
    let updated = conn.execute(
        "UPDATE users SET avatar = ?1 WHERE id = ?2",
        params![url, id],
    )?;
    if updated == 0 {
        return Err(AppError::not_found("User not found"));
    }
    get_user(conn, id)
}

pub fn list_users(conn: &Connection) -> AppResult<Vec<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))?;
    let users = stmt
        .query_map([], map_user)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

pub fn promote_to_admin(conn: &Connection, id: i64) -> AppResult<User> {
    let updated = conn.execute(
        "UPDATE users SET role = ?1 WHERE id = ?2",
        params![Role::Admin, id],
    )?;
    if updated == 0 {
        return Err(AppError::not_found("User not found"));
    }
    tracing::info!(user_id = id, "User promoted to admin");
    get_user(conn, id)
}

/// Delete a user. Foreign keys cascade to their posts, comments, answers,
/// reactions and reset token.
pub fn delete_user(conn: &Connection, id: i64) -> AppResult<()> {
    let deleted = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
    if deleted == 0 {
        return Err(AppError::not_found("User not found"));
    }
    tracing::info!(user_id = id, "User deleted");
    Ok(())
}
