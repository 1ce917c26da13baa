use std::sync::OnceLock;

/// Hash a password with bcrypt (salted).
pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, cost)
}

/// Check a password against a stored hash. A malformed hash never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Burn the same bcrypt work as a real check when the account does not
/// exist, so response time does not reveal which emails are registered.
pub fn verify_against_dummy(password: &str, cost: u32) {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    if let Some(hash) = DUMMY.get_or_init(|| bcrypt::hash("dummy-password", cost).ok()) {
        let _ = bcrypt::verify(password, hash);
    }
}
