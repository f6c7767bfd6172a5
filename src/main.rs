use shq_users::{config::Config, state::AppState, telemetry::init_tracing};

fn main() -> anyhow::Result<()> {
    // ログ初期化（JSON形式、環境変数でレベル制御）
    init_tracing();

    tracing::info!("shq-users 起動中...");

    // 設定読み込み
    let config = Config::load().map_err(|e| {
        tracing::error!(error = ?e, "設定の読み込みに失敗");
        anyhow::anyhow!("Failed to load config: {}", e)
    })?;

    tracing::info!(
        cooldown_secs = config.password_reset_cooldown_secs,
        token_ttl_secs = config.password_reset_token_ttl_secs,
        "設定読み込み完了"
    );

    // AppState 構築（設定検証・エンコーダー登録検証を含む）
    let state = AppState::new(config).map_err(|e| {
        tracing::error!(error = ?e, "AppState の構築に失敗");
        anyhow::anyhow!("Failed to create AppState: {}", e)
    })?;

    for provider in state.users.providers() {
        tracing::info!(provider = %provider, "ユーザープロバイダー準備完了");
    }

    Ok(())
}
