use crate::application::copy::{self, InventoryApplicationError, InventoryDependencies};
use crate::domain::{Book, BookId, Edition, EditionCopy, EditionCopyId, EditionId};
use crate::ports::{CatalogClient, PortError, Result};
use async_trait::async_trait;

/// 在庫アプリケーション層を同じプロセス内で直接呼び出すCatalogClient
pub struct LocalCatalogClient {
    inventory: InventoryDependencies,
}

impl LocalCatalogClient {
    pub fn new(inventory: InventoryDependencies) -> Self {
        Self { inventory }
    }
}

impl From<InventoryApplicationError> for PortError {
    fn from(err: InventoryApplicationError) -> Self {
        match err {
            InventoryApplicationError::CopyNotFound(_)
            | InventoryApplicationError::EditionNotFound(_)
            | InventoryApplicationError::BookNotFound(_) => PortError::NotFound(err.to_string()),
            InventoryApplicationError::InvalidArgument(message) => {
                PortError::InvalidArgument(message)
            }
            InventoryApplicationError::Transition(_)
            | InventoryApplicationError::ConcurrentModification(_) => {
                PortError::Conflict(err.to_string())
            }
            InventoryApplicationError::Repository(source) => source,
        }
    }
}

#[async_trait]
impl CatalogClient for LocalCatalogClient {
    async fn get_copy(&self, copy_id: EditionCopyId) -> Result<EditionCopy> {
        Ok(copy::get_copy(&self.inventory, copy_id).await?)
    }

    async fn get_edition(&self, edition_id: EditionId) -> Result<Edition> {
        Ok(copy::get_edition(&self.inventory, edition_id).await?)
    }

    async fn get_book(&self, book_id: BookId) -> Result<Book> {
        Ok(copy::get_book(&self.inventory, book_id).await?)
    }

    async fn borrow_copy(&self, copy_id: EditionCopyId) -> Result<EditionCopy> {
        Ok(copy::borrow_copy(&self.inventory, copy_id).await?)
    }

    async fn return_copy(&self, copy_id: EditionCopyId) -> Result<EditionCopy> {
        Ok(copy::return_copy(&self.inventory, copy_id).await?)
    }

    async fn mark_copy_lost(&self, copy_id: EditionCopyId) -> Result<EditionCopy> {
        Ok(copy::mark_copy_lost(&self.inventory, copy_id).await?)
    }
}
