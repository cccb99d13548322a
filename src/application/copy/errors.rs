use crate::domain::{
    BookId, CopyTransitionError, EditionCopyId, EditionId, InvalidId,
};
use crate::ports::PortError;
use thiserror::Error;

/// 在庫管理アプリケーション層のエラー
#[derive(Debug, Error)]
pub enum InventoryApplicationError {
    /// 入力が不正（0以下のIDなど）
    #[error("{0}")]
    InvalidArgument(String),

    #[error("An edition copy with the id {0} could not be found")]
    CopyNotFound(EditionCopyId),

    #[error("An edition with the id {0} could not be found")]
    EditionNotFound(EditionId),

    #[error("A book with the id {0} could not be found")]
    BookNotFound(BookId),

    /// 状態遷移の違反
    #[error(transparent)]
    Transition(#[from] CopyTransitionError),

    /// 読み取り後に別の更新が先行した（compare-and-setに負けた）
    #[error("The edition copy with id {0} was modified concurrently")]
    ConcurrentModification(EditionCopyId),

    /// リポジトリのエラー
    #[error("Inventory repository error")]
    Repository(#[source] PortError),
}

impl InventoryApplicationError {
    /// リトライで回復しうるか
    pub fn is_transient(&self) -> bool {
        match self {
            InventoryApplicationError::ConcurrentModification(_) => true,
            InventoryApplicationError::Repository(err) => err.is_transient(),
            _ => false,
        }
    }
}

impl From<InvalidId> for InventoryApplicationError {
    fn from(err: InvalidId) -> Self {
        InventoryApplicationError::InvalidArgument(err.to_string())
    }
}

/// アプリケーション層の Result型
pub type Result<T> = std::result::Result<T, InventoryApplicationError>;
