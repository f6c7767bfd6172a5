use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("リセット要求の間隔が短すぎます（{retry_after_secs}秒後に再試行）")]
    Throttled { retry_after_secs: i64 },

    #[error("リセットトークンが発行されていません")]
    TokenMissing,

    #[error("リセットトークンが一致しません")]
    TokenMismatch,

    #[error("リセットトークンの有効期限が切れています")]
    TokenExpired,

    #[error("パスワードエンコーダーが未登録: {0}")]
    NoEncoderForType(&'static str),

    #[error("バリデーションエラー: {0}")]
    Validation(String),

    #[error("ユーザーが見つかりません: {0}")]
    AccountNotFound(Uuid),

    #[error("このメールアドレスは既に使用されています")]
    EmailAlreadyExists,

    #[error("ユーザーは他の処理で更新されています")]
    StaleWrite,

    #[error("設定エラー")]
    Config(#[from] envy::Error),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// リセットフローの失敗か（ユーザーへの再入力要求で回復可能）
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Throttled { .. }
                | Self::TokenMissing
                | Self::TokenMismatch
                | Self::TokenExpired
                | Self::Validation(_)
                | Self::EmailAlreadyExists
                | Self::StaleWrite
        )
    }

    /// ユーザー向けメッセージに変換
    ///
    /// # Security
    /// トークン・ハッシュはメッセージに含めない
    pub fn user_message(&self) -> String {
        match self {
            Self::Throttled { retry_after_secs } => format!(
                "しばらくしてから再度お試しください（{}秒後）",
                retry_after_secs
            ),
            // 存在有無・不一致・期限切れを区別しない（情報漏洩防止）
            Self::TokenMissing | Self::TokenMismatch | Self::TokenExpired => {
                "無効または期限切れのリンクです".to_string()
            }
            Self::Validation(msg) => msg.clone(),
            Self::AccountNotFound(_) => "無効なリクエストです".to_string(),
            Self::EmailAlreadyExists => "このメールアドレスは既に使用されています".to_string(),
            Self::StaleWrite => "もう一度お試しください".to_string(),
            Self::NoEncoderForType(type_name) => {
                tracing::error!(type_name = %type_name, "パスワードエンコーダー未登録");
                "内部エラーが発生しました".to_string()
            }
            Self::Config(e) => {
                tracing::error!(error = ?e, "設定エラー");
                "内部エラーが発生しました".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = ?e, "内部エラー");
                "内部エラーが発生しました".to_string()
            }
        }
    }
}
