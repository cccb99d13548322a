pub mod inventory_repository;
pub mod loan_repository;

// パブリックに型を再エクスポート
pub use inventory_repository::InventoryRepository as PostgresInventoryRepository;
pub use loan_repository::LoanRepository as PostgresLoanRepository;

use crate::ports::PortError;

const UNIQUE_VIOLATION: &str = "23505";

/// sqlxのエラーをポートのエラーに変換する
fn storage_error(err: sqlx::Error) -> PortError {
    let unique_violation = err
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION);

    if unique_violation {
        PortError::Conflict(err.to_string())
    } else {
        PortError::unavailable(err)
    }
}

/// 保存済みの値がドメインの型に変換できない
fn invalid_data(message: impl Into<String>) -> PortError {
    PortError::unavailable(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message.into(),
    ))
}
