use time::OffsetDateTime;

/// 現在時刻の取得元
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// 固定時刻を返す Clock（テスト・バッチ処理用）
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub OffsetDateTime);

impl FixedClock {
    /// UNIX エポックからの秒数で作成
    pub fn at_secs(secs: i64) -> Self {
        Self(OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(secs))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}
