use crate::domain::{Book, BookId, Edition, EditionCopy, EditionCopyId, EditionId};
use async_trait::async_trait;

use super::Result;

/// 在庫サービスポート（貸出側から見た同期インターフェース）
///
/// 実装はプロセス内呼び出しとHTTPの2種類。
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn get_copy(&self, copy_id: EditionCopyId) -> Result<EditionCopy>;

    async fn get_edition(&self, edition_id: EditionId) -> Result<Edition>;

    async fn get_book(&self, book_id: BookId) -> Result<Book>;

    /// コピーを貸出中にする（直接伝播モード）
    async fn borrow_copy(&self, copy_id: EditionCopyId) -> Result<EditionCopy>;

    /// コピーを貸出可能に戻す（直接伝播モード）
    async fn return_copy(&self, copy_id: EditionCopyId) -> Result<EditionCopy>;

    /// コピーを紛失扱いにする（直接伝播モード）
    async fn mark_copy_lost(&self, copy_id: EditionCopyId) -> Result<EditionCopy>;
}
