use std::sync::Arc;

use crate::config::Config;
use crate::error::AppError;
use crate::models::User;
use crate::repositories::UserRepository;
use crate::services::{
    Argon2Hasher, Clock, CredentialEncoder, EncoderRegistry, PasswordResetService, SystemClock,
    UsersManager, UsersManagerRegistry,
};

/// アプリケーション共有状態
///
/// 起動時に一度だけ構築し、ホストアプリケーションへ明示的に渡す。
/// グローバルなシングルトンは持たない
#[derive(Clone)]
pub struct AppState {
    /// アプリケーション設定（Arc で共有）
    pub config: Arc<Config>,
    /// 書き込み前のパスワードハッシュ化
    pub encoder: CredentialEncoder,
    /// プロバイダーごとのユーザー管理
    pub users: UsersManagerRegistry,
}

impl AppState {
    /// 新しい AppState を作成
    pub fn new(config: Config) -> Result<Self, AppError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self, AppError> {
        config.validate()?;
        let config = Arc::new(config);

        let registry = EncoderRegistry::new().register::<User>(Arc::new(Argon2Hasher::new()));
        // エンコーダー未登録は起動時に検出する
        registry.ensure_registered::<User>()?;
        let encoder = CredentialEncoder::new(Arc::new(registry));

        let mut users = UsersManagerRegistry::new();
        for provider in &config.user_providers {
            let user_repo = UserRepository::new(encoder.clone(), clock.clone());
            let password_reset =
                PasswordResetService::new(user_repo.clone(), clock.clone(), config.clone());
            users.add_manager(UsersManager::new(provider.clone(), user_repo, password_reset));
            tracing::info!(provider = %provider, "ユーザープロバイダーを初期化");
        }

        Ok(Self {
            config,
            encoder,
            users,
        })
    }
}
