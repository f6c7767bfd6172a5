use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::User;
use crate::services::clock::Clock;
use crate::services::encoder::CredentialEncoder;

/// インメモリのユーザーストア
///
/// 書き込み前に `CredentialEncoder` を通すため、平文パスワードは保存されない
#[derive(Clone)]
pub struct UserRepository {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
    encoder: CredentialEncoder,
    clock: Arc<dyn Clock>,
}

impl UserRepository {
    pub fn new(encoder: CredentialEncoder, clock: Arc<dyn Clock>) -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            encoder,
            clock,
        }
    }

    /// 作成・更新日時に使う現在時刻
    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    /// ユーザーIDでユーザーを検索
    pub fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.read()?.get(&user_id).cloned())
    }

    /// メールアドレスでユーザーを検索（大文字小文字を区別しない）
    pub fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .read()?
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    /// ユーザーを保存（作成・更新）
    ///
    /// # Errors
    /// - `StaleWrite`: 読み込み後に他の処理で更新されている
    /// - `EmailAlreadyExists`: メールアドレス重複
    ///
    /// # Note
    /// 平文パスワードのハッシュ化はストア更新より前に行う。
    /// 以降の検証で失敗しても平文は既に破棄されている
    pub fn save(&self, user: &mut User) -> Result<(), AppError> {
        self.encoder.on_before_write(user)?;

        let mut users = self.write()?;

        match users.get(&user.id) {
            Some(stored) if stored.version != user.version => {
                tracing::warn!(
                    user_id = %user.id,
                    stored_version = stored.version,
                    version = user.version,
                    "楽観ロック競合"
                );
                return Err(AppError::StaleWrite);
            }
            None if user.version != 0 => return Err(AppError::AccountNotFound(user.id)),
            _ => {}
        }

        if users
            .values()
            .any(|u| u.id != user.id && u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(AppError::EmailAlreadyExists);
        }

        user.version += 1;
        user.updated_at = self.clock.now();
        users.insert(user.id, user.clone());

        tracing::debug!(user_id = %user.id, version = user.version, "ユーザー保存");

        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<Uuid, User>>, AppError> {
        self.users
            .read()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("user store lock poisoned")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<Uuid, User>>, AppError> {
        self.users
            .write()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("user store lock poisoned")))
    }
}
