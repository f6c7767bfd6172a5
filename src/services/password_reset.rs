use std::fmt;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::models::{HasPlainPassword, PendingReset, ResetTokenHolder};
use crate::repositories::UserRepository;
use crate::services::clock::Clock;

/// トークンのランダムバイト数
const TOKEN_BYTES: usize = 32;
const MIN_PASSWORD_LEN: usize = 8;
const DEFAULT_RESET_URL_BASE: &str = "http://localhost:3000/password-reset";

/// トークン再発行間隔と有効期限（秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetPolicy {
    pub cooldown_secs: i64,
    pub token_ttl_secs: i64,
}

/// 発行したリセットトークン（保存しない）
pub struct ResetRequest {
    pub token: String,
    pub requested_at: OffsetDateTime,
    pub account_id: Uuid,
}

impl fmt::Debug for ResetRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResetRequest")
            .field("token", &"[REDACTED]")
            .field("requested_at", &self.requested_at)
            .field("account_id", &self.account_id)
            .finish()
    }
}

/// リセットトークンの発行・検証・使用
///
/// I/O を行わず、渡されたアカウントのみを操作する
#[derive(Debug, Clone, Copy)]
pub struct ResetTokenManager {
    policy: ResetPolicy,
}

impl ResetTokenManager {
    pub fn new(policy: ResetPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ResetPolicy {
        self.policy
    }

    /// トークンを発行してアカウントに設定
    ///
    /// 前回発行から `cooldown_secs` 未満なら `Throttled`。
    /// 既存トークンは上書きされ無効になる。保存は呼び出し側で行う
    pub fn request_reset<A: ResetTokenHolder>(
        &self,
        account: &mut A,
        now: OffsetDateTime,
    ) -> Result<ResetRequest, AppError> {
        if let Some(reset) = account.pending_reset() {
            let elapsed = now - reset.requested_at;
            let cooldown = Duration::seconds(self.policy.cooldown_secs);
            if elapsed < cooldown {
                tracing::warn!(
                    user_id = %account.account_id(),
                    elapsed_secs = elapsed.as_seconds_f64(),
                    "リセット要求の間隔が短すぎる"
                );
                return Err(AppError::Throttled {
                    retry_after_secs: ceil_seconds(cooldown.saturating_sub(elapsed)),
                });
            }
        }

        let token = generate_token();
        account.set_pending_reset(Some(PendingReset {
            token_hash: hash_token(&token),
            requested_at: now,
        }));

        tracing::info!(user_id = %account.account_id(), "リセットトークン発行");

        Ok(ResetRequest {
            token,
            requested_at: now,
            account_id: account.account_id(),
        })
    }

    /// 提示されたトークンを検証（状態は変更しない）
    ///
    /// 発行から `token_ttl_secs` ちょうどまでは有効
    pub fn validate_token<A: ResetTokenHolder>(
        &self,
        account: &A,
        presented_token: &str,
        now: OffsetDateTime,
    ) -> Result<(), AppError> {
        let reset = account.pending_reset().ok_or(AppError::TokenMissing)?;

        if !tokens_match(presented_token, &reset.token_hash) {
            tracing::warn!(user_id = %account.account_id(), "トークン不一致");
            return Err(AppError::TokenMismatch);
        }

        if now - reset.requested_at > Duration::seconds(self.policy.token_ttl_secs) {
            tracing::warn!(user_id = %account.account_id(), "期限切れトークン");
            return Err(AppError::TokenExpired);
        }

        Ok(())
    }

    /// トークンを使用済みにし、新しい平文パスワードを設定
    ///
    /// # Contract
    /// `validate_token` 成功後にのみ呼ぶこと。
    /// ハッシュ化は次回保存時に `CredentialEncoder` が行う
    pub fn redeem<A: ResetTokenHolder + HasPlainPassword>(
        &self,
        account: &mut A,
        new_plain_password: SecretString,
    ) {
        account.set_plain_password(new_plain_password);
        account.set_pending_reset(None);

        tracing::info!(user_id = %account.account_id(), "リセットトークン使用");
    }
}

/// パスワードリセットサービス
#[derive(Clone)]
pub struct PasswordResetService {
    user_repo: UserRepository,
    tokens: ResetTokenManager,
    clock: Arc<dyn Clock>,
    config: Arc<Config>,
}

impl PasswordResetService {
    /// 新しい PasswordResetService を作成
    pub fn new(user_repo: UserRepository, clock: Arc<dyn Clock>, config: Arc<Config>) -> Self {
        Self {
            user_repo,
            tokens: ResetTokenManager::new(config.reset_policy()),
            clock,
            config,
        }
    }

    pub fn tokens(&self) -> &ResetTokenManager {
        &self.tokens
    }

    /// 現在時刻でトークンを発行
    pub fn request_reset<A: ResetTokenHolder>(
        &self,
        account: &mut A,
    ) -> Result<ResetRequest, AppError> {
        self.tokens.request_reset(account, self.clock.now())
    }

    /// 現在時刻でトークンを検証
    pub fn validate_token<A: ResetTokenHolder>(
        &self,
        account: &A,
        presented_token: &str,
    ) -> Result<(), AppError> {
        self.tokens
            .validate_token(account, presented_token, self.clock.now())
    }

    /// メールアドレスからパスワードリセットをリクエスト
    ///
    /// # Security
    /// - ユーザーが存在しない場合も成功（`None`）を返す（情報漏洩防止）
    /// - トークン（平文）はログに出力しない
    pub fn request_reset_for_email(&self, email: &str) -> Result<Option<ResetRequest>, AppError> {
        tracing::info!(email = %email, "パスワードリセットリクエスト");

        let Some(mut user) = self.user_repo.find_by_email(email)? else {
            tracing::info!(email = %email, "パスワードリセット: ユーザー不在");
            return Ok(None);
        };

        let request = self.request_reset(&mut user)?;
        self.user_repo.save(&mut user)?;

        Ok(Some(request))
    }

    /// トークンを検証してパスワードを更新
    ///
    /// # Security
    /// - トークン・新パスワードはログに出力しない
    /// - ユーザー不在はトークン未発行と区別しない
    pub fn reset_password(
        &self,
        email: &str,
        token: &str,
        new_password: SecretString,
    ) -> Result<(), AppError> {
        if new_password.expose_secret().chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "パスワードは{}文字以上で入力してください",
                MIN_PASSWORD_LEN
            )));
        }

        let mut user = self
            .user_repo
            .find_by_email(email)?
            .ok_or(AppError::TokenMissing)?;

        self.validate_token(&user, token)?;
        self.tokens.redeem(&mut user, new_password);
        self.user_repo.save(&mut user)?;

        tracing::info!(user_id = %user.id, "パスワードリセット完了");

        Ok(())
    }

    /// リセットURLを構築
    pub fn build_reset_url(&self, request: &ResetRequest) -> String {
        let base = self
            .config
            .password_reset_url_base
            .as_deref()
            .unwrap_or(DEFAULT_RESET_URL_BASE);
        format!("{}?token={}", base, request.token)
    }
}

/// 秒単位に切り上げ（1秒未満の残りも1秒とする）
fn ceil_seconds(duration: Duration) -> i64 {
    let secs = duration.whole_seconds();
    if duration.subsec_nanoseconds() > 0 {
        secs.saturating_add(1)
    } else {
        secs
    }
}

/// 32バイトのランダムトークンを生成
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// トークンをSHA256でハッシュ化
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// 定数時間比較（ハッシュ長は常に同じ）
fn tokens_match(presented_token: &str, stored_hash: &str) -> bool {
    let presented_hash = hash_token(presented_token);
    presented_hash
        .as_bytes()
        .ct_eq(stored_hash.as_bytes())
        .into()
}
