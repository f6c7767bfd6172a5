use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use secrecy::ExposeSecret;

use crate::error::AppError;
use crate::models::HasPlainPassword;
use crate::services::hasher::PasswordHasher;

/// エンティティ型ごとのパスワードハッシュ化戦略
///
/// 起動時に一度だけ構築し、以降は参照のみ
#[derive(Clone, Default)]
pub struct EncoderRegistry {
    hashers: HashMap<TypeId, Arc<dyn PasswordHasher>>,
}

impl EncoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// エンティティ型 `A` にハッシュ化戦略を登録
    pub fn register<A: HasPlainPassword + 'static>(
        mut self,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        tracing::debug!(entity = type_name::<A>(), "パスワードエンコーダー登録");
        self.hashers.insert(TypeId::of::<A>(), hasher);
        self
    }

    pub fn resolve<A: HasPlainPassword + 'static>(
        &self,
    ) -> Result<Arc<dyn PasswordHasher>, AppError> {
        self.hashers
            .get(&TypeId::of::<A>())
            .cloned()
            .ok_or(AppError::NoEncoderForType(type_name::<A>()))
    }

    /// 起動時検証: 未登録なら構成エラー
    pub fn ensure_registered<A: HasPlainPassword + 'static>(&self) -> Result<(), AppError> {
        self.resolve::<A>().map(|_| ())
    }
}

/// 書き込み直前に平文パスワードをハッシュ化するリスナー
///
/// # Security
/// - 平文は成否に関わらず必ず破棄する
/// - 平文・ハッシュはログに出力しない
#[derive(Clone)]
pub struct CredentialEncoder {
    registry: Arc<EncoderRegistry>,
}

impl CredentialEncoder {
    pub fn new(registry: Arc<EncoderRegistry>) -> Self {
        Self { registry }
    }

    /// 永続化直前のフック
    ///
    /// 平文パスワードが無い・空の場合は何もしない
    pub fn on_before_write<A: HasPlainPassword + 'static>(
        &self,
        account: &mut A,
    ) -> Result<(), AppError> {
        // 先に取り出すことで、以降どこで失敗しても平文は残らない
        let Some(plain_password) = account.take_plain_password() else {
            return Ok(());
        };
        if plain_password.expose_secret().is_empty() {
            return Ok(());
        }

        let hasher = self.registry.resolve::<A>()?;
        let hash = hasher.hash(plain_password.expose_secret())?;
        account.set_password_hash(hash);

        tracing::debug!(entity = type_name::<A>(), "パスワードをハッシュ化");

        Ok(())
    }
}
