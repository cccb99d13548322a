use crate::domain::{
    Barcode, Borrower, EditionCopyId, Loan, LoanEvent, LoanId, LoanStatus, LoanedCopy, MemberId,
};
use crate::ports::{
    LoanOutbox, LoanRepository as LoanRepositoryTrait, OutboxEntry, PortError, Result,
};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use super::{invalid_data, storage_error};

/// PostgreSQLの行データをLoanに変換する
fn map_row_to_loan(row: &PgRow) -> Result<Loan> {
    let status_str: String = row.try_get("status").map_err(storage_error)?;
    let status = status_str.parse::<LoanStatus>().map_err(invalid_data)?;

    let renewal_count: i32 = row.try_get("renewal_count").map_err(storage_error)?;
    let renewal_count = u32::try_from(renewal_count)
        .map_err(|_| invalid_data(format!("renewal_count out of range: {renewal_count}")))?;

    let barcode: String = row.try_get("barcode").map_err(storage_error)?;

    Ok(Loan {
        loan_id: LoanId::from_raw(row.try_get("loan_id").map_err(storage_error)?),
        borrower: Borrower {
            member_id: MemberId::from_raw(row.try_get("member_id").map_err(storage_error)?),
            first_name: row.try_get("first_name").map_err(storage_error)?,
            last_name: row.try_get("last_name").map_err(storage_error)?,
        },
        copy: LoanedCopy {
            edition_copy_id: EditionCopyId::from_raw(
                row.try_get("edition_copy_id").map_err(storage_error)?,
            ),
            barcode: Barcode::new(barcode),
            book_title: row.try_get("book_title").map_err(storage_error)?,
            author: row.try_get("author").map_err(storage_error)?,
            edition: row.try_get("edition").map_err(storage_error)?,
        },
        loan_date: row.try_get("loan_date").map_err(storage_error)?,
        due_date: row.try_get("due_date").map_err(storage_error)?,
        return_date: row.try_get("return_date").map_err(storage_error)?,
        status,
        renewal_count,
        version: row.try_get("version").map_err(storage_error)?,
    })
}

const SELECT_LOAN: &str = r#"
    SELECT
        loan_id, member_id, first_name, last_name,
        edition_copy_id, barcode, book_title, author, edition,
        loan_date, due_date, return_date, status, renewal_count, version
    FROM loans
"#;

/// LoanRepositoryとLoanOutboxのPostgreSQL実装
///
/// 貸出の更新とアウトボックスへの書き込みは同じトランザクションで行う。
pub struct LoanRepository {
    pool: PgPool,
}

impl LoanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn append_outbox(tx: &mut Transaction<'_, Postgres>, event: &LoanEvent) -> Result<()> {
        let payload = serde_json::to_value(event).map_err(PortError::unavailable)?;

        sqlx::query(
            r#"
            INSERT INTO loan_outbox (loan_id, event_type, payload)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(event.context.loan_id.value())
        .bind(event.event_type.as_str())
        .bind(payload)
        .execute(&mut **tx)
        .await
        .map_err(storage_error)?;

        Ok(())
    }
}

#[async_trait]
impl LoanRepositoryTrait for LoanRepository {
    async fn next_id(&self) -> Result<LoanId> {
        let id: i64 = sqlx::query_scalar("SELECT nextval(pg_get_serial_sequence('loans', 'loan_id'))")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(LoanId::from_raw(id))
    }

    async fn insert(&self, loan: &Loan, event: Option<&LoanEvent>) -> Result<Loan> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        sqlx::query(
            r#"
            INSERT INTO loans (
                loan_id, member_id, first_name, last_name,
                edition_copy_id, barcode, book_title, author, edition,
                loan_date, due_date, return_date, status, renewal_count, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, 1)
            "#,
        )
        .bind(loan.loan_id.value())
        .bind(loan.borrower.member_id.value())
        .bind(&loan.borrower.first_name)
        .bind(&loan.borrower.last_name)
        .bind(loan.copy.edition_copy_id.value())
        .bind(loan.copy.barcode.as_str())
        .bind(&loan.copy.book_title)
        .bind(&loan.copy.author)
        .bind(&loan.copy.edition)
        .bind(loan.loan_date)
        .bind(loan.due_date)
        .bind(loan.return_date)
        .bind(loan.status.as_str())
        .bind(loan.renewal_count as i32)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        if let Some(event) = event {
            Self::append_outbox(&mut tx, event).await?;
        }

        tx.commit().await.map_err(storage_error)?;

        Ok(Loan {
            version: 1,
            ..loan.clone()
        })
    }

    /// 楽観的ロック：WHERE version = 読み取った値
    async fn update(&self, loan: &Loan, event: Option<&LoanEvent>) -> Result<Loan> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let updated = sqlx::query(
            r#"
            UPDATE loans
            SET due_date = $3,
                return_date = $4,
                status = $5,
                renewal_count = $6,
                version = version + 1,
                updated_at = now()
            WHERE loan_id = $1 AND version = $2
            "#,
        )
        .bind(loan.loan_id.value())
        .bind(loan.version)
        .bind(loan.due_date)
        .bind(loan.return_date)
        .bind(loan.status.as_str())
        .bind(loan.renewal_count as i32)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        if updated.rows_affected() == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM loans WHERE loan_id = $1)")
                    .bind(loan.loan_id.value())
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(storage_error)?;

            return Err(if exists {
                PortError::Conflict(format!(
                    "The loan with id {} was modified concurrently",
                    loan.loan_id
                ))
            } else {
                PortError::NotFound(format!(
                    "The loan with id {} could not be found",
                    loan.loan_id
                ))
            });
        }

        if let Some(event) = event {
            Self::append_outbox(&mut tx, event).await?;
        }

        tx.commit().await.map_err(storage_error)?;

        Ok(Loan {
            version: loan.version + 1,
            ..loan.clone()
        })
    }

    async fn find_by_id(&self, loan_id: LoanId) -> Result<Option<Loan>> {
        let row = sqlx::query(&format!("{SELECT_LOAN} WHERE loan_id = $1"))
            .bind(loan_id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.as_ref().map(map_row_to_loan).transpose()
    }
}

#[async_trait]
impl LoanOutbox for LoanRepository {
    async fn pending(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, payload, created_at
            FROM loan_outbox
            WHERE published_at IS NULL
            ORDER BY id ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.iter()
            .map(|row| {
                let payload: serde_json::Value = row.try_get("payload").map_err(storage_error)?;
                let event: LoanEvent =
                    serde_json::from_value(payload).map_err(|e| invalid_data(e.to_string()))?;

                Ok(OutboxEntry {
                    id: row.try_get("id").map_err(storage_error)?,
                    event,
                    created_at: row.try_get("created_at").map_err(storage_error)?,
                })
            })
            .collect()
    }

    async fn mark_published(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        sqlx::query("UPDATE loan_outbox SET published_at = now() WHERE id = ANY($1)")
            .bind(ids.to_vec())
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(())
    }
}
