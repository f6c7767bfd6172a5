use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher as _, PasswordVerifier};

use crate::error::AppError;

/// パスワードハッシュ化戦略
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plain_password: &str) -> Result<String, AppError>;

    fn verify(&self, plain_password: &str, hash: &str) -> Result<bool, AppError>;
}

/// argon2id によるハッシュ化（ソルトは毎回ランダム生成）
#[derive(Clone, Default)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, plain_password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plain_password.as_bytes(), &salt)
            .map_err(|e| {
                tracing::error!(error = ?e, "パスワードハッシュ生成エラー");
                AppError::Internal(anyhow::anyhow!("password hash error"))
            })?;
        Ok(hash.to_string())
    }

    fn verify(&self, plain_password: &str, hash: &str) -> Result<bool, AppError> {
        let parsed_hash = PasswordHash::new(hash).map_err(|e| {
            tracing::error!(error = ?e, "パスワードハッシュのパースエラー");
            AppError::Internal(anyhow::anyhow!("password hash parse error"))
        })?;

        Ok(self
            .argon2
            .verify_password(plain_password.as_bytes(), &parsed_hash)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = Argon2Hasher::new();
        let hash = hasher.hash("password123").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("password123", &hash).unwrap());
        assert!(!hasher.verify("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_same_password_produces_different_hashes() {
        let hasher = Argon2Hasher::new();
        let first = hasher.hash("password123").unwrap();
        let second = hasher.hash("password123").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_verify_with_invalid_hash_format() {
        let hasher = Argon2Hasher::new();
        assert!(hasher.verify("password123", "invalid_hash_format").is_err());
    }
}
