use std::collections::HashSet;

use serde::Deserialize;

use crate::error::AppError;
use crate::services::password_reset::ResetPolicy;

#[derive(Debug, Deserialize)]
pub struct Config {
    // パスワードリセット設定
    #[serde(default)]
    pub password_reset_url_base: Option<String>,
    #[serde(default = "default_password_reset_token_ttl_secs")]
    pub password_reset_token_ttl_secs: i64,
    /// 同一ユーザーへのトークン再発行を禁止する秒数
    #[serde(default = "default_password_reset_cooldown_secs")]
    pub password_reset_cooldown_secs: i64,

    /// ユーザープロバイダー名（カンマ区切り）
    #[serde(default = "default_user_providers")]
    pub user_providers: Vec<String>,
}

const DEFAULT_PASSWORD_RESET_TOKEN_TTL_SECS: i64 = 3600;
const DEFAULT_PASSWORD_RESET_COOLDOWN_SECS: i64 = 300;
const DEFAULT_USER_PROVIDER: &str = "main";

fn default_password_reset_token_ttl_secs() -> i64 {
    DEFAULT_PASSWORD_RESET_TOKEN_TTL_SECS
}

fn default_password_reset_cooldown_secs() -> i64 {
    DEFAULT_PASSWORD_RESET_COOLDOWN_SECS
}

fn default_user_providers() -> Vec<String> {
    vec![DEFAULT_USER_PROVIDER.to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            password_reset_url_base: None,
            password_reset_token_ttl_secs: DEFAULT_PASSWORD_RESET_TOKEN_TTL_SECS,
            password_reset_cooldown_secs: DEFAULT_PASSWORD_RESET_COOLDOWN_SECS,
            user_providers: default_user_providers(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        Ok(envy::from_env()?)
    }

    /// 起動時の設定検証
    pub fn validate(&self) -> Result<(), AppError> {
        if self.password_reset_token_ttl_secs <= 0 {
            return Err(AppError::Validation(
                "password_reset_token_ttl_secs は1以上で指定してください".to_string(),
            ));
        }
        if self.password_reset_cooldown_secs < 0 {
            return Err(AppError::Validation(
                "password_reset_cooldown_secs は0以上で指定してください".to_string(),
            ));
        }
        if self.user_providers.iter().any(|p| p.trim().is_empty()) {
            return Err(AppError::Validation(
                "user_providers に空の名前は指定できません".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.user_providers.iter().find(|p| !seen.insert(p.trim())) {
            return Err(AppError::Validation(format!(
                "user_providers に同じ名前が重複しています: {}",
                dup
            )));
        }
        Ok(())
    }

    pub fn reset_policy(&self) -> ResetPolicy {
        ResetPolicy {
            cooldown_secs: self.password_reset_cooldown_secs,
            token_ttl_secs: self.password_reset_token_ttl_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, envy::Error> {
        envy::from_iter(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_defaults_when_env_is_empty() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.password_reset_token_ttl_secs, 3600);
        assert_eq!(config.password_reset_cooldown_secs, 300);
        assert_eq!(config.user_providers, vec!["main".to_string()]);
        assert!(config.password_reset_url_base.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_values_from_env() {
        let config = from_pairs(&[
            ("PASSWORD_RESET_TOKEN_TTL_SECS", "600"),
            ("PASSWORD_RESET_COOLDOWN_SECS", "60"),
            ("PASSWORD_RESET_URL_BASE", "https://example.com/reset"),
            ("USER_PROVIDERS", "main,admin"),
        ])
        .unwrap();

        let policy = config.reset_policy();
        assert_eq!(policy.token_ttl_secs, 600);
        assert_eq!(policy.cooldown_secs, 60);
        assert_eq!(config.user_providers, vec!["main", "admin"]);
        assert_eq!(
            config.password_reset_url_base.as_deref(),
            Some("https://example.com/reset")
        );
    }

    #[test]
    fn test_validate_rejects_non_positive_ttl() {
        let config = Config {
            password_reset_token_ttl_secs: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_negative_cooldown() {
        let config = Config {
            password_reset_cooldown_secs: -1,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_providers() {
        let config = from_pairs(&[("USER_PROVIDERS", "main,admin,main")]).unwrap();
        assert!(matches!(config.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let result = from_pairs(&[("PASSWORD_RESET_TOKEN_TTL_SECS", "soon")]);
        assert!(result.is_err());
    }
}
