use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand_core::OsRng;

pub trait PasswordHashing: Send + Sync {
    fn hash(&self, password: &str) -> anyhow::Result<String>;

    /// `Ok(false)` on mismatch; `Err` only if `hash` is unusable.
    fn verify(&self, password: &str, hash: &str) -> anyhow::Result<bool>;
}

/// Argon2id with default parameters, PHC string output.
#[derive(Default)]
pub struct Argon2Hashing;

impl PasswordHashing for Argon2Hashing {
    fn hash(&self, password: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
        Ok(hash.to_string())
    }

    fn verify(&self, password: &str, hash: &str) -> anyhow::Result<bool> {
        let parsed =
            PasswordHash::new(hash).map_err(|e| anyhow::anyhow!("stored hash unusable: {}", e))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}
