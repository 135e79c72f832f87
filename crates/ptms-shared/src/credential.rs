use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::error::PtmsError;

/// Argon2 password hash allowing offline re-authentication without keeping
/// the password. Survives logout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineCredential {
    pub email: String,
    /// PHC string (`$argon2id$v=19$...`), salt included.
    pub password_hash: String,
}

impl OfflineCredential {
    /// Hash freshly validated credentials with a random salt.
    pub fn derive(email: &str, password: &str) -> Result<Self, PtmsError> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| PtmsError::Cache(format!("argon2 hash failed: {e}")))?
            .to_string();
        Ok(Self {
            email: normalize_email(email),
            password_hash,
        })
    }

    /// Check a candidate email/password pair. A malformed stored hash never
    /// verifies.
    pub fn verify(&self, email: &str, password: &str) -> bool {
        if normalize_email(email) != self.email {
            return false;
        }
        let Ok(parsed) = PasswordHash::new(&self.password_hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

/// Emails compare case-insensitively and ignore surrounding whitespace.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
