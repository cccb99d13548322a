use crate::domain::{
    Barcode, Book, BookFormat, BookId, CopyStatus, Edition, EditionCopy, EditionCopyId, EditionId,
};
use crate::ports::{InventoryRepository as InventoryRepositoryTrait, PortError, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use super::{invalid_data, storage_error};

fn map_row_to_copy(row: &PgRow) -> Result<EditionCopy> {
    let status: String = row.try_get("status").map_err(storage_error)?;
    let barcode: String = row.try_get("barcode").map_err(storage_error)?;

    Ok(EditionCopy {
        copy_id: EditionCopyId::from_raw(row.try_get("copy_id").map_err(storage_error)?),
        barcode: Barcode::new(barcode),
        status: status.parse::<CopyStatus>().map_err(invalid_data)?,
        edition_id: EditionId::from_raw(row.try_get("edition_id").map_err(storage_error)?),
        acquired_at: row.try_get("acquired_at").map_err(storage_error)?,
    })
}

fn map_row_to_edition(row: &PgRow) -> Result<Edition> {
    let format: String = row.try_get("format").map_err(storage_error)?;

    Ok(Edition {
        edition_id: EditionId::from_raw(row.try_get("edition_id").map_err(storage_error)?),
        book_id: BookId::from_raw(row.try_get("book_id").map_err(storage_error)?),
        isbn: row.try_get("isbn").map_err(storage_error)?,
        publisher: row.try_get("publisher").map_err(storage_error)?,
        publication_year: row.try_get("publication_year").map_err(storage_error)?,
        edition: row.try_get("edition").map_err(storage_error)?,
        format: format.parse::<BookFormat>().map_err(invalid_data)?,
    })
}

/// InventoryRepositoryのPostgreSQL実装
pub struct InventoryRepository {
    pool: PgPool,
}

impl InventoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InventoryRepositoryTrait for InventoryRepository {
    async fn next_copy_id(&self) -> Result<EditionCopyId> {
        let id: i64 = sqlx::query_scalar(
            "SELECT nextval(pg_get_serial_sequence('edition_copies', 'copy_id'))",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(EditionCopyId::from_raw(id))
    }

    async fn insert_copy(&self, copy: &EditionCopy) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO edition_copies (copy_id, barcode, status, edition_id, acquired_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(copy.copy_id.value())
        .bind(copy.barcode.as_str())
        .bind(copy.status.as_str())
        .bind(copy.edition_id.value())
        .bind(copy.acquired_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    async fn find_copy(&self, copy_id: EditionCopyId) -> Result<Option<EditionCopy>> {
        let row = sqlx::query(
            r#"
            SELECT copy_id, barcode, status, edition_id, acquired_at
            FROM edition_copies
            WHERE copy_id = $1
            "#,
        )
        .bind(copy_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.as_ref().map(map_row_to_copy).transpose()
    }

    async fn find_copies_by_edition(&self, edition_id: EditionId) -> Result<Vec<EditionCopy>> {
        let rows = sqlx::query(
            r#"
            SELECT copy_id, barcode, status, edition_id, acquired_at
            FROM edition_copies
            WHERE edition_id = $1
            ORDER BY copy_id ASC
            "#,
        )
        .bind(edition_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.iter().map(map_row_to_copy).collect()
    }

    /// 条件付き更新：UPDATE ... WHERE status = 期待値
    async fn compare_and_set_status(
        &self,
        copy_id: EditionCopyId,
        expected: CopyStatus,
        new_status: CopyStatus,
    ) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE edition_copies
            SET status = $3
            WHERE copy_id = $1 AND status = $2
            "#,
        )
        .bind(copy_id.value())
        .bind(expected.as_str())
        .bind(new_status.as_str())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if updated.rows_affected() == 1 {
            return Ok(true);
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM edition_copies WHERE copy_id = $1)")
                .bind(copy_id.value())
                .fetch_one(&self.pool)
                .await
                .map_err(storage_error)?;

        if exists {
            Ok(false)
        } else {
            Err(PortError::NotFound(format!(
                "An edition copy with the id {} could not be found",
                copy_id
            )))
        }
    }

    async fn find_edition(&self, edition_id: EditionId) -> Result<Option<Edition>> {
        let row = sqlx::query(
            r#"
            SELECT edition_id, book_id, isbn, publisher, publication_year, edition, format
            FROM editions
            WHERE edition_id = $1
            "#,
        )
        .bind(edition_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.as_ref().map(map_row_to_edition).transpose()
    }

    async fn find_book(&self, book_id: BookId) -> Result<Option<Book>> {
        let row = sqlx::query("SELECT book_id, title, author FROM books WHERE book_id = $1")
            .bind(book_id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.map(|row| -> Result<Book> {
            Ok(Book {
                book_id: BookId::from_raw(row.try_get("book_id").map_err(storage_error)?),
                title: row.try_get("title").map_err(storage_error)?,
                author: row.try_get("author").map_err(storage_error)?,
            })
        })
        .transpose()
    }
}
