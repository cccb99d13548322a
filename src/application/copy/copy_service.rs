use crate::domain::{
    self, Book, BookId, CopyOperation, CopyTransitionError, Edition, EditionCopy, EditionCopyId,
    EditionId, LoanEvent, commands::AddCopy,
};
use crate::ports::InventoryRepository;
use std::sync::Arc;

use super::errors::{InventoryApplicationError, Result};

/// 在庫サービスの依存関係
#[derive(Clone)]
pub struct InventoryDependencies {
    pub repository: Arc<dyn InventoryRepository>,
}

/// 操作の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyUpdate {
    /// 状態を変更した
    Applied(EditionCopy),
    /// 既に目的の状態だった（冪等なno-op）
    Unchanged(EditionCopy),
}

impl CopyUpdate {
    pub fn copy(&self) -> &EditionCopy {
        match self {
            CopyUpdate::Applied(copy) | CopyUpdate::Unchanged(copy) => copy,
        }
    }
}

async fn load_copy(deps: &InventoryDependencies, copy_id: EditionCopyId) -> Result<EditionCopy> {
    deps.repository
        .find_copy(copy_id)
        .await
        .map_err(InventoryApplicationError::Repository)?
        .ok_or(InventoryApplicationError::CopyNotFound(copy_id))
}

/// 状態遷移を適用して保存する
///
/// 保存は読み取った時点の状態を条件としたcompare-and-set。
/// 競合に負けた場合は`ConcurrentModification`を返す。
async fn transition_copy(
    deps: &InventoryDependencies,
    copy_id: EditionCopyId,
    operation: CopyOperation,
) -> Result<EditionCopy> {
    let current = load_copy(deps, copy_id).await?;
    let updated = domain::copy::apply(&current, operation)?;

    let swapped = deps
        .repository
        .compare_and_set_status(copy_id, current.status, updated.status)
        .await
        .map_err(InventoryApplicationError::Repository)?;

    if !swapped {
        return Err(InventoryApplicationError::ConcurrentModification(copy_id));
    }

    tracing::info!(
        copy_id = %copy_id,
        from = %current.status,
        to = %updated.status,
        "Edition copy status changed"
    );

    Ok(updated)
}

/// コピーを取得する
pub async fn get_copy(deps: &InventoryDependencies, copy_id: EditionCopyId) -> Result<EditionCopy> {
    load_copy(deps, copy_id).await
}

/// 版を取得する
pub async fn get_edition(deps: &InventoryDependencies, edition_id: EditionId) -> Result<Edition> {
    deps.repository
        .find_edition(edition_id)
        .await
        .map_err(InventoryApplicationError::Repository)?
        .ok_or(InventoryApplicationError::EditionNotFound(edition_id))
}

/// 書籍を取得する
pub async fn get_book(deps: &InventoryDependencies, book_id: BookId) -> Result<Book> {
    deps.repository
        .find_book(book_id)
        .await
        .map_err(InventoryApplicationError::Repository)?
        .ok_or(InventoryApplicationError::BookNotFound(book_id))
}

/// 版に属するコピーの一覧
pub async fn list_copies(
    deps: &InventoryDependencies,
    edition_id: EditionId,
) -> Result<Vec<EditionCopy>> {
    get_edition(deps, edition_id).await?;

    deps.repository
        .find_copies_by_edition(edition_id)
        .await
        .map_err(InventoryApplicationError::Repository)
}

/// 版に新しいコピーを追加する（AVAILABLE、バーコードを発行）
pub async fn add_copy(deps: &InventoryDependencies, cmd: AddCopy) -> Result<EditionCopy> {
    // 1. 版の存在確認
    get_edition(deps, cmd.edition_id).await?;

    // 2. 採番してコピーを作成
    let copy_id = deps
        .repository
        .next_copy_id()
        .await
        .map_err(InventoryApplicationError::Repository)?;
    let copy = EditionCopy::acquire(copy_id, cmd.edition_id, cmd.acquired_at);

    // 3. 保存
    deps.repository
        .insert_copy(&copy)
        .await
        .map_err(InventoryApplicationError::Repository)?;

    tracing::info!(copy_id = %copy.copy_id, edition_id = %copy.edition_id, barcode = %copy.barcode, "Edition copy added");

    Ok(copy)
}

/// コピーを貸出中にする
///
/// 既に貸出中、または紛失済みの場合はConflict。
pub async fn borrow_copy(deps: &InventoryDependencies, copy_id: EditionCopyId) -> Result<EditionCopy> {
    transition_copy(deps, copy_id, CopyOperation::MarkBorrowed).await
}

/// コピーを貸出可能に戻す
///
/// 既に貸出可能、または紛失済みの場合はConflict。
pub async fn return_copy(deps: &InventoryDependencies, copy_id: EditionCopyId) -> Result<EditionCopy> {
    transition_copy(deps, copy_id, CopyOperation::MarkAvailable).await
}

/// コピーを紛失扱いにする（直接のクライアント向け）
///
/// 既に紛失済みの場合はConflict。
pub async fn mark_copy_lost(
    deps: &InventoryDependencies,
    copy_id: EditionCopyId,
) -> Result<EditionCopy> {
    transition_copy(deps, copy_id, CopyOperation::MarkLost).await
}

/// 貸出イベントを適用する（イベント購読側向け）
///
/// 既に目的の状態にある場合は変更せずに`Unchanged`を返す。
/// 紛失済みコピーを動かすイベントは`CopyTransitionError::Terminal`。
pub async fn apply_loan_event(deps: &InventoryDependencies, event: &LoanEvent) -> Result<CopyUpdate> {
    let copy_id = event.context.edition_copy_id;
    let operation = CopyOperation::for_event(event.event_type);

    match transition_copy(deps, copy_id, operation).await {
        Ok(copy) => Ok(CopyUpdate::Applied(copy)),
        Err(InventoryApplicationError::Transition(CopyTransitionError::AlreadyInState(_))) => {
            let copy = load_copy(deps, copy_id).await?;
            Ok(CopyUpdate::Unchanged(copy))
        }
        Err(err) => Err(err),
    }
}
