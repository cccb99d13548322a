use crate::domain::{Book, BookId, CopyStatus, Edition, EditionCopy, EditionCopyId, EditionId};
use async_trait::async_trait;

use super::Result;

/// 在庫リポジトリポート
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    async fn next_copy_id(&self) -> Result<EditionCopyId>;

    async fn insert_copy(&self, copy: &EditionCopy) -> Result<()>;

    async fn find_copy(&self, copy_id: EditionCopyId) -> Result<Option<EditionCopy>>;

    async fn find_copies_by_edition(&self, edition_id: EditionId) -> Result<Vec<EditionCopy>>;

    /// 現在の状態が`expected`の場合のみ`new_status`に更新する
    ///
    /// 更新した場合はtrue。状態が変わっていた（競合に負けた）場合はfalse。
    async fn compare_and_set_status(
        &self,
        copy_id: EditionCopyId,
        expected: CopyStatus,
        new_status: CopyStatus,
    ) -> Result<bool>;

    async fn find_edition(&self, edition_id: EditionId) -> Result<Option<Edition>>;

    async fn find_book(&self, book_id: BookId) -> Result<Option<Book>>;
}
