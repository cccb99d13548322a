use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    Barcode, Book, BookId, Edition, EditionCopy, EditionCopyId, EditionId, Loan,
};

// ============================================================================
// 貸出サービス
// ============================================================================

/// POST /loans のリクエスト
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLoanRequest {
    pub edition_copy_id: i64,
    pub member_id: i64,
}

/// 貸出レスポンス
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanResponse {
    pub loan_id: i64,
    pub member_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub edition_copy_id: i64,
    pub barcode: String,
    pub book_title: String,
    pub author: String,
    pub edition: String,
    pub loan_date: NaiveDate,
    pub due_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub status: String,
    pub renewal_count: u32,
}

impl From<Loan> for LoanResponse {
    fn from(loan: Loan) -> Self {
        Self {
            loan_id: loan.loan_id.value(),
            member_id: loan.borrower.member_id.value(),
            first_name: loan.borrower.first_name,
            last_name: loan.borrower.last_name,
            edition_copy_id: loan.copy.edition_copy_id.value(),
            barcode: loan.copy.barcode.as_str().to_string(),
            book_title: loan.copy.book_title,
            author: loan.copy.author,
            edition: loan.copy.edition,
            loan_date: loan.loan_date,
            due_date: loan.due_date,
            return_date: loan.return_date,
            status: loan.status.as_str().to_string(),
            renewal_count: loan.renewal_count,
        }
    }
}

// ============================================================================
// 在庫サービス
//
// HTTPのCatalogClientも同じ型でデコードする。
// ============================================================================

/// コピーのレスポンス
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyResponse {
    pub copy_id: i64,
    pub barcode: String,
    pub status: String,
    pub edition_id: i64,
    pub acquired_at: DateTime<Utc>,
}

impl From<EditionCopy> for CopyResponse {
    fn from(copy: EditionCopy) -> Self {
        Self {
            copy_id: copy.copy_id.value(),
            barcode: copy.barcode.as_str().to_string(),
            status: copy.status.as_str().to_string(),
            edition_id: copy.edition_id.value(),
            acquired_at: copy.acquired_at,
        }
    }
}

impl TryFrom<CopyResponse> for EditionCopy {
    type Error = String;

    fn try_from(response: CopyResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            copy_id: EditionCopyId::parse(response.copy_id).map_err(|e| e.to_string())?,
            barcode: Barcode::new(response.barcode),
            status: response.status.parse()?,
            edition_id: EditionId::parse(response.edition_id).map_err(|e| e.to_string())?,
            acquired_at: response.acquired_at,
        })
    }
}

/// POST /editions/:id/copies のリクエスト（受け入れ日時は省略時に現在時刻）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddCopyRequest {
    pub acquired_at: Option<DateTime<Utc>>,
}

/// 版のレスポンス
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditionResponse {
    pub edition_id: i64,
    pub book_id: i64,
    pub isbn: String,
    pub publisher: String,
    pub publication_year: i32,
    pub edition: String,
    pub format: String,
}

impl From<Edition> for EditionResponse {
    fn from(edition: Edition) -> Self {
        Self {
            edition_id: edition.edition_id.value(),
            book_id: edition.book_id.value(),
            isbn: edition.isbn,
            publisher: edition.publisher,
            publication_year: edition.publication_year,
            edition: edition.edition,
            format: edition.format.as_str().to_string(),
        }
    }
}

impl TryFrom<EditionResponse> for Edition {
    type Error = String;

    fn try_from(response: EditionResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            edition_id: EditionId::parse(response.edition_id).map_err(|e| e.to_string())?,
            book_id: BookId::parse(response.book_id).map_err(|e| e.to_string())?,
            isbn: response.isbn,
            publisher: response.publisher,
            publication_year: response.publication_year,
            edition: response.edition,
            format: response.format.parse()?,
        })
    }
}

/// 書籍のレスポンス
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookResponse {
    pub book_id: i64,
    pub title: String,
    pub author: String,
}

impl From<Book> for BookResponse {
    fn from(book: Book) -> Self {
        Self {
            book_id: book.book_id.value(),
            title: book.title,
            author: book.author,
        }
    }
}

impl TryFrom<BookResponse> for Book {
    type Error = String;

    fn try_from(response: BookResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            book_id: BookId::parse(response.book_id).map_err(|e| e.to_string())?,
            title: response.title,
            author: response.author,
        })
    }
}

// ============================================================================
// 共通
// ============================================================================

/// エラーレスポンス
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub path: String,
    pub error_code: String,
}

impl ErrorResponse {
    pub fn new(
        error_code: impl Into<String>,
        message: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            path: path.into(),
            error_code: error_code.into(),
        }
    }
}
