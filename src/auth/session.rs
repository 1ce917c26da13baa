//! Signed session tokens.
//!
//! Tokens are compact HS256 JWTs: `base64url(header).base64url(claims).base64url(mac)`.
//! The `ver` claim pins the token to the user's `token_version`, so bumping
//! that column (on password reset) invalidates every token issued before it.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::db::models::Role;
use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";

/// Key length used when no secret is configured.
const RANDOM_KEY_LENGTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: i64,
    pub email: String,
    pub role: Role,
    /// The user's token_version at issue time.
    pub ver: i64,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("signature mismatch")]
    BadSignature,

    #[error("token expired")]
    Expired,

    #[error("invalid signing key")]
    InvalidKey,

    #[error("claims encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidKey | TokenError::Encoding(_) => AppError::Internal(err.to_string()),
            _ => AppError::unauthorized("Invalid token"),
        }
    }
}

/// The fields of a user that go into a token.
#[derive(Debug, Clone)]
pub struct Subject<'a> {
    pub id: i64,
    pub email: &'a str,
    pub role: Role,
    pub token_version: i64,
}

pub struct TokenSigner {
    key: Vec<u8>,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            key: secret.to_vec(),
            ttl,
        }
    }

    /// Signer with a per-process random key. Tokens die with the process.
    pub fn with_random_key(ttl: Duration) -> Self {
        let mut key = vec![0u8; RANDOM_KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key, ttl }
    }

    pub fn issue(&self, subject: &Subject<'_>) -> Result<String, TokenError> {
        self.issue_at(subject, Utc::now().timestamp())
    }

    pub fn issue_at(&self, subject: &Subject<'_>, now: i64) -> Result<String, TokenError> {
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: Some("JWT".to_string()),
        };
        let claims = Claims {
            sub: subject.id,
            email: subject.email.to_string(),
            role: subject.role,
            ver: subject.token_version,
            iat: now,
            exp: now + self.ttl.num_seconds(),
        };

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
        );

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", signing_input, signature))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let (header_b64, claims_b64, signature_b64) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(c), Some(s), None) => (h, c, s),
                _ => return Err(TokenError::Malformed),
            };

        let header: Header = decode_segment(header_b64)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::Malformed)?;

        // verify_slice compares in constant time
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let claims: Claims = decode_segment(claims_b64)?;
        if claims.exp <= now {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        <HmacSha256 as Mac>::new_from_slice(&self.key).map_err(|_| TokenError::InvalidKey)
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new(b"test-secret", Duration::days(7))
    }

    fn subject() -> Subject<'static> {
        Subject {
            id: 42,
            email: "alice@example.com",
            role: Role::User,
            token_version: 3,
        }
    }

    #[test]
    fn issued_token_verifies_to_same_claims() {
        let signer = signer();
        let token = signer.issue_at(&subject(), 1_000).unwrap();
        let claims = signer.verify_at(&token, 1_001).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.ver, 3);
        assert_eq!(claims.exp, 1_000 + 7 * 24 * 3600);
    }

    #[test]
    fn token_has_three_segments() {
        let token = signer().issue(&subject()).unwrap();
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn expired_token_is_rejected() {
        let signer = signer();
        let token = signer.issue_at(&subject(), 1_000).unwrap();
        let later = 1_000 + Duration::days(7).num_seconds();
        assert!(matches!(
            signer.verify_at(&token, later),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn token_from_other_key_is_rejected() {
        let token = TokenSigner::new(b"other", Duration::days(7))
            .issue(&subject())
            .unwrap();
        assert!(matches!(
            signer().verify(&token),
            Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn tampered_claims_are_rejected() {
        let signer = signer();
        let token = signer.issue(&subject()).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let mut claims: Claims =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
        claims.role = Role::Admin;
        let forged = format!(
            "{}.{}.{}",
            parts[0],
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap()),
            parts[2]
        );

        assert!(matches!(
            signer.verify(&forged),
            Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn alg_none_is_rejected() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let token = format!("{}.e30.", header);
        assert!(matches!(
            signer().verify(&token),
            Err(TokenError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            signer().verify("not-a-token"),
            Err(TokenError::Malformed)
        ));
        assert!(matches!(
            signer().verify("a.b.c.d"),
            Err(TokenError::Malformed)
        ));
    }

    #[test]
    fn verification_failures_map_to_401() {
        let err: AppError = TokenError::Expired.into();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);
    }
}
