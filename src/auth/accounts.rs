use rusqlite::Connection;

use crate::auth::password;
use crate::auth::session::{Subject, TokenSigner};
use crate::error::{AppError, AppResult};
use crate::identity;

const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    pub id: i64,
    pub nickname: String,
}

pub fn register(conn: &Connection, email: &str, password: &str, cost: u32) -> AppResult<i64> {
    let email = identity::normalize_email(email);
    if email.is_empty() || password.is_empty() {
        return Err(AppError::bad_request("Email and password are required"));
    }
    if !email.contains('@') {
        return Err(AppError::bad_request("Email is invalid"));
    }

    if identity::find_by_email(conn, &email)?.is_some() {
        return Err(AppError::Conflict(
            "User with such email already exists".into(),
        ));
    }

    let hash = password::hash_password(password, cost)?;
    // A concurrent registration can still win the race; create_user maps
    // the unique violation to the same Conflict.
    let id = identity::create_user(conn, &email, &hash)?;
    tracing::info!(user_id = id, "User registered");
    Ok(id)
}

/// Unknown email and wrong password fail identically.
pub fn login(
    conn: &Connection,
    signer: &TokenSigner,
    email: &str,
    password: &str,
    cost: u32,
) -> AppResult<LoginOutcome> {
    let Some(creds) = identity::find_credentials(conn, email)? else {
        password::verify_against_dummy(password, cost);
        return Err(AppError::unauthorized(INVALID_CREDENTIALS));
    };

    if !password::verify_password(password, &creds.password_hash) {
        return Err(AppError::unauthorized(INVALID_CREDENTIALS));
    }

    let token = signer.issue(&Subject {
        id: creds.id,
        email: &creds.email,
        role: creds.role,
        token_version: creds.token_version,
    })?;

    Ok(LoginOutcome {
        token,
        id: creds.id,
        nickname: creds.nickname,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::test_pool;
    use chrono::Duration;

    const COST: u32 = 4;

    fn signer() -> TokenSigner {
        TokenSigner::new(b"secret", Duration::days(7))
    }

    #[test]
    fn register_then_login_yields_token_for_same_user() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let signer = signer();

        let id = register(&conn, "alice@example.com", "pw", COST).unwrap();
        let outcome = login(&conn, &signer, "alice@example.com", "pw", COST).unwrap();

        assert_eq!(outcome.id, id);
        assert_eq!(outcome.nickname, format!("User-{}", id));
        let claims = signer.verify(&outcome.token).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.ver, 0);
    }

    #[test]
    fn duplicate_registration_is_conflict() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        register(&conn, "alice@example.com", "pw", COST).unwrap();
        let err = register(&conn, "alice@example.com", "other", COST).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn register_requires_fields() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        assert!(matches!(
            register(&conn, "", "pw", COST),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            register(&conn, "a@example.com", "", COST),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            register(&conn, "no-at-sign", "pw", COST),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn wrong_password_and_unknown_email_fail_the_same_way() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let signer = signer();
        register(&conn, "alice@example.com", "pw", COST).unwrap();

        let wrong = login(&conn, &signer, "alice@example.com", "nope", COST).unwrap_err();
        let unknown = login(&conn, &signer, "bob@example.com", "pw", COST).unwrap_err();

        assert_eq!(wrong.status(), unknown.status());
        assert_eq!(wrong.to_string(), unknown.to_string());
    }
}
