pub mod catalog_client;
pub mod event_bus;
pub mod inventory_repository;
pub mod loan_outbox;
pub mod loan_repository;
pub mod member_directory;

pub use catalog_client::*;
pub use event_bus::*;
pub use inventory_repository::*;
pub use loan_outbox::*;
pub use loan_repository::*;
pub use member_directory::*;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// ポート共通のエラー
///
/// アダプター（Postgres・HTTP・インメモリ）はこの分類に変換して返す。
#[derive(Debug, Error)]
pub enum PortError {
    /// 対象が存在しない
    #[error("{0}")]
    NotFound(String),

    /// 状態の競合（楽観的ロック・状態遷移違反）
    #[error("{0}")]
    Conflict(String),

    /// 呼び出し側の入力が不正
    #[error("{0}")]
    InvalidArgument(String),

    /// リモート呼び出しのタイムアウト
    #[error("Remote call timed out")]
    Timeout,

    /// バックエンドに到達できない・予期しない応答
    #[error("Backend unavailable: {0}")]
    Unavailable(#[source] BoxError),
}

impl PortError {
    pub fn unavailable(err: impl Into<BoxError>) -> Self {
        PortError::Unavailable(err.into())
    }

    /// リトライで回復しうる障害か
    pub fn is_transient(&self) -> bool {
        matches!(self, PortError::Timeout | PortError::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, PortError>;
