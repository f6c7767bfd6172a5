use std::collections::BTreeMap;

use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{HasPlainPassword, User};
use crate::repositories::UserRepository;
use crate::services::PasswordResetService;

const ROLE_PREFIX: &str = "ROLE_";
const MIN_PASSWORD_LEN: usize = 8;

/// ユーザープロバイダー単位のユーザー管理
#[derive(Clone)]
pub struct UsersManager {
    provider: String,
    user_repo: UserRepository,
    password_reset: PasswordResetService,
}

impl UsersManager {
    pub fn new(
        provider: impl Into<String>,
        user_repo: UserRepository,
        password_reset: PasswordResetService,
    ) -> Self {
        Self {
            provider: provider.into(),
            user_repo,
            password_reset,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn password_reset(&self) -> &PasswordResetService {
        &self.password_reset
    }

    /// 新しいユーザーを作成
    ///
    /// # Security
    /// - パスワードはログに出力しない
    /// - ハッシュ化は保存時に行われる
    pub fn create(
        &self,
        email: &str,
        plain_password: SecretString,
        roles: &[&str],
        active: bool,
    ) -> Result<User, AppError> {
        validate_email(email)?;
        validate_password(&plain_password)?;

        let mut user = User::new_at(email.trim(), self.user_repo.now());
        for role in roles {
            let role = normalize_role(role)?;
            if !user.has_role(&role) {
                user.roles.push(role);
            }
        }
        user.active = active;
        user.set_plain_password(plain_password);

        self.user_repo.save(&mut user)?;

        tracing::info!(provider = %self.provider, user_id = %user.id, email = %user.email, "ユーザー作成");

        Ok(user)
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.user_repo.find_by_email(email)
    }

    pub fn activate(&self, user_id: Uuid) -> Result<User, AppError> {
        self.update(user_id, |user| {
            user.active = true;
            Ok(())
        })
    }

    pub fn deactivate(&self, user_id: Uuid) -> Result<User, AppError> {
        self.update(user_id, |user| {
            user.active = false;
            Ok(())
        })
    }

    /// ロールを付与（付与済みなら何もしない）
    pub fn add_role(&self, user_id: Uuid, role: &str) -> Result<User, AppError> {
        let role = normalize_role(role)?;
        self.update(user_id, |user| {
            if !user.has_role(&role) {
                user.roles.push(role.clone());
            }
            Ok(())
        })
    }

    pub fn remove_role(&self, user_id: Uuid, role: &str) -> Result<User, AppError> {
        let role = normalize_role(role)?;
        self.update(user_id, |user| {
            user.roles.retain(|r| r != &role);
            Ok(())
        })
    }

    /// パスワードを変更（保存時にハッシュ化）
    pub fn change_password(
        &self,
        user_id: Uuid,
        new_password: SecretString,
    ) -> Result<User, AppError> {
        validate_password(&new_password)?;
        self.update(user_id, move |user| {
            user.set_plain_password(new_password);
            Ok(())
        })
    }

    fn update<F>(&self, user_id: Uuid, apply: F) -> Result<User, AppError>
    where
        F: FnOnce(&mut User) -> Result<(), AppError>,
    {
        let mut user = self
            .user_repo
            .find_by_id(user_id)?
            .ok_or(AppError::AccountNotFound(user_id))?;
        apply(&mut user)?;
        self.user_repo.save(&mut user)?;

        tracing::info!(provider = %self.provider, user_id = %user.id, "ユーザー更新");

        Ok(user)
    }
}

/// プロバイダー名 → UsersManager
///
/// 起動時に構築して明示的に受け渡す
#[derive(Clone, Default)]
pub struct UsersManagerRegistry {
    managers: BTreeMap<String, UsersManager>,
}

impl UsersManagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_manager(&mut self, manager: UsersManager) {
        self.managers.insert(manager.provider().to_string(), manager);
    }

    pub fn manager(&self, provider: &str) -> Result<&UsersManager, AppError> {
        self.managers
            .get(provider)
            .ok_or_else(|| AppError::Validation(format!("未知のユーザープロバイダー: {}", provider)))
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.managers.keys().map(String::as_str)
    }
}

/// メールアドレスのバリデーション
fn validate_email(email: &str) -> Result<(), AppError> {
    if email.trim().is_empty() || !email.contains('@') {
        return Err(AppError::Validation(
            "有効なメールアドレスを入力してください".to_string(),
        ));
    }
    Ok(())
}

fn validate_password(password: &SecretString) -> Result<(), AppError> {
    if password.expose_secret().chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "パスワードは{}文字以上で入力してください",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// ロール名を正規化（大文字化、ROLE_ 接頭辞必須）
fn normalize_role(role: &str) -> Result<String, AppError> {
    let role = role.trim().to_ascii_uppercase();
    if role.len() <= ROLE_PREFIX.len() || !role.starts_with(ROLE_PREFIX) {
        return Err(AppError::Validation(format!(
            "ロール名は {} で始めてください",
            ROLE_PREFIX
        )));
    }
    Ok(role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::Config;
    use crate::services::clock::{Clock, FixedClock};
    use crate::services::encoder::{CredentialEncoder, EncoderRegistry};
    use crate::services::hasher::{Argon2Hasher, PasswordHasher};

    fn create_test_manager() -> UsersManager {
        let registry = EncoderRegistry::new().register::<User>(Arc::new(Argon2Hasher::new()));
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::at_secs(5000));
        let repo = UserRepository::new(CredentialEncoder::new(Arc::new(registry)), clock.clone());
        let reset = PasswordResetService::new(
            repo.clone(),
            clock,
            Arc::new(Config::default()),
        );
        UsersManager::new("main", repo, reset)
    }

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    #[test]
    fn test_normalize_role() {
        assert_eq!(normalize_role(" role_admin ").unwrap(), "ROLE_ADMIN");
        assert!(normalize_role("admin").is_err());
        assert!(normalize_role("ROLE_").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("").is_err());
        assert!(validate_email("invalid-email").is_err());
        assert!(validate_email("test@example.com").is_ok());
    }

    #[test]
    fn test_create_hashes_password() {
        let manager = create_test_manager();
        let user = manager
            .create(
                "test@example.com",
                secret("password123"),
                &["role_user", "ROLE_USER"],
                false,
            )
            .unwrap();

        assert_eq!(user.roles, vec!["ROLE_USER".to_string()]);
        assert!(!user.active);
        assert!(user.plain_password().is_none());
        let hash = user.password_hash.unwrap();
        assert!(Argon2Hasher::new().verify("password123", &hash).unwrap());
    }

    #[test]
    fn test_create_uses_injected_clock() {
        let manager = create_test_manager();
        let user = manager
            .create("test@example.com", secret("password123"), &[], true)
            .unwrap();

        let expected = FixedClock::at_secs(5000).now();
        assert_eq!(user.created_at, expected);
        assert_eq!(user.updated_at, expected);
    }

    #[test]
    fn test_create_rejects_short_password() {
        let manager = create_test_manager();
        let result = manager.create("test@example.com", secret("short"), &[], true);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_create_duplicate_email() {
        let manager = create_test_manager();
        manager
            .create("test@example.com", secret("password123"), &[], true)
            .unwrap();
        let result = manager.create("test@example.com", secret("password456"), &[], true);
        assert!(matches!(result, Err(AppError::EmailAlreadyExists)));
    }

    #[test]
    fn test_activate_and_deactivate() {
        let manager = create_test_manager();
        let user = manager
            .create("test@example.com", secret("password123"), &[], false)
            .unwrap();

        assert!(manager.activate(user.id).unwrap().active);
        assert!(!manager.deactivate(user.id).unwrap().active);
    }

    #[test]
    fn test_add_and_remove_role() {
        let manager = create_test_manager();
        let user = manager
            .create("test@example.com", secret("password123"), &[], true)
            .unwrap();

        let user = manager.add_role(user.id, "role_admin").unwrap();
        assert!(user.has_role("ROLE_ADMIN"));
        let user = manager.add_role(user.id, "ROLE_ADMIN").unwrap();
        assert_eq!(user.roles.len(), 1);

        let user = manager.remove_role(user.id, "ROLE_ADMIN").unwrap();
        assert!(user.roles.is_empty());
    }

    #[test]
    fn test_change_password() {
        let manager = create_test_manager();
        let user = manager
            .create("test@example.com", secret("password123"), &[], true)
            .unwrap();
        let old_hash = user.password_hash.clone().unwrap();

        let user = manager
            .change_password(user.id, secret("NewP@ss123"))
            .unwrap();
        let new_hash = user.password_hash.unwrap();

        assert_ne!(old_hash, new_hash);
        assert!(Argon2Hasher::new().verify("NewP@ss123", &new_hash).unwrap());
    }

    #[test]
    fn test_update_unknown_user() {
        let manager = create_test_manager();
        let result = manager.activate(Uuid::new_v4());
        assert!(matches!(result, Err(AppError::AccountNotFound(_))));
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = UsersManagerRegistry::new();
        registry.add_manager(create_test_manager());

        assert_eq!(registry.manager("main").unwrap().provider(), "main");
        assert!(registry.manager("admin").is_err());
        assert_eq!(registry.providers().collect::<Vec<_>>(), vec!["main"]);
    }
}
