use crate::domain::LoanEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Result;

/// アウトボックスの未発行エントリ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    /// 書き込み順の連番
    pub id: i64,
    pub event: LoanEvent,
    pub created_at: DateTime<Utc>,
}

/// アウトボックスポート
#[async_trait]
pub trait LoanOutbox: Send + Sync {
    /// 未発行のエントリを書き込み順に返す
    async fn pending(&self, limit: usize) -> Result<Vec<OutboxEntry>>;

    /// 発行済みにする
    async fn mark_published(&self, ids: &[i64]) -> Result<()>;
}
