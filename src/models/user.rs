use std::fmt;

use secrecy::SecretString;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// 発行済みパスワードリセットトークン
///
/// トークン自体はSHA256ハッシュのみ保持（token_hash）
/// 平文トークンは発行時に呼び出し側へ返し、保存しない
#[derive(Clone, PartialEq, Eq)]
pub struct PendingReset {
    pub token_hash: String,
    pub requested_at: OffsetDateTime,
}

impl fmt::Debug for PendingReset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingReset")
            .field("token_hash", &"[REDACTED]")
            .field("requested_at", &self.requested_at)
            .finish()
    }
}

/// 平文パスワードを一時的に保持できるエンティティ
///
/// 書き込み直前に `CredentialEncoder` がハッシュ化して平文を破棄する
pub trait HasPlainPassword {
    fn plain_password(&self) -> Option<&SecretString>;

    fn set_plain_password(&mut self, password: SecretString);

    /// 平文パスワードを取り出す（フィールドは None になる）
    fn take_plain_password(&mut self) -> Option<SecretString>;

    fn set_password_hash(&mut self, hash: String);
}

/// パスワードリセットトークンを保持できるエンティティ
pub trait ResetTokenHolder {
    fn account_id(&self) -> Uuid;

    fn pending_reset(&self) -> Option<&PendingReset>;

    fn set_pending_reset(&mut self, reset: Option<PendingReset>);
}

#[derive(Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip)]
    pub password_hash: Option<String>,
    #[serde(skip)]
    plain_password: Option<SecretString>,
    #[serde(skip)]
    reset: Option<PendingReset>,
    pub roles: Vec<String>,
    pub active: bool,
    /// 楽観ロック用バージョン（保存ごとに加算）
    pub version: u64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn new(email: impl Into<String>) -> Self {
        Self::new_at(email, OffsetDateTime::now_utc())
    }

    /// 作成日時を指定して作成（注入された Clock の時刻を使う）
    pub fn new_at(email: impl Into<String>, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash: None,
            plain_password: None,
            reset: None,
            roles: Vec::new(),
            active: false,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// 保存済みトークンのハッシュ
    pub fn reset_token(&self) -> Option<&str> {
        self.reset.as_ref().map(|r| r.token_hash.as_str())
    }

    pub fn reset_token_requested_at(&self) -> Option<OffsetDateTime> {
        self.reset.as_ref().map(|r| r.requested_at)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

// パスワードハッシュ・トークンハッシュはログに出力しない
impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &self.password_hash.as_ref().map(|_| "[REDACTED]"))
            .field("plain_password", &self.plain_password)
            .field("reset", &self.reset)
            .field("roles", &self.roles)
            .field("active", &self.active)
            .field("version", &self.version)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

// 平文パスワードは複製しない
impl Clone for User {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            email: self.email.clone(),
            password_hash: self.password_hash.clone(),
            plain_password: None,
            reset: self.reset.clone(),
            roles: self.roles.clone(),
            active: self.active,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl HasPlainPassword for User {
    fn plain_password(&self) -> Option<&SecretString> {
        self.plain_password.as_ref()
    }

    fn set_plain_password(&mut self, password: SecretString) {
        self.plain_password = Some(password);
    }

    fn take_plain_password(&mut self) -> Option<SecretString> {
        self.plain_password.take()
    }

    fn set_password_hash(&mut self, hash: String) {
        self.password_hash = Some(hash);
    }
}

impl ResetTokenHolder for User {
    fn account_id(&self) -> Uuid {
        self.id
    }

    fn pending_reset(&self) -> Option<&PendingReset> {
        self.reset.as_ref()
    }

    fn set_pending_reset(&mut self, reset: Option<PendingReset>) {
        self.reset = reset;
    }
}
