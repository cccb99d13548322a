use crate::domain::{EditionCopyId, ErrorKind, InvalidId, LoanId, LoanTransitionError};
use crate::ports::PortError;
use thiserror::Error;

/// 貸出管理アプリケーション層のエラー
#[derive(Debug, Error)]
pub enum LoanApplicationError {
    /// 入力が不正（0以下のID、0以下の貸出期間など）
    #[error("{0}")]
    InvalidArgument(String),

    /// 貸出が見つからない
    #[error("The loan with id {0} could not be found")]
    LoanNotFound(LoanId),

    /// 他サービスのリソース（コピー・版・書籍・会員）が見つからない
    #[error("{0}")]
    ResourceNotFound(String),

    /// 貸出対象のコピーが貸出可能でない
    #[error("The copy of the book requested is unavailable (copy {0})")]
    CopyUnavailable(EditionCopyId),

    /// 状態遷移の違反・延長上限・楽観的ロックの競合
    #[error("{0}")]
    Conflict(String),

    /// 前提となる値が未設定
    #[error("{0}")]
    InvalidState(String),

    /// 他サービスが時間内に応答しなかった
    #[error("The {service} service did not respond in time")]
    DownstreamTimeout { service: &'static str },

    /// 他サービスのエラー
    #[error("The {service} service failed")]
    Downstream {
        service: &'static str,
        #[source]
        source: PortError,
    },

    /// 貸出リポジトリのエラー
    #[error("Loan repository error")]
    Repository(#[source] PortError),
}

impl From<LoanTransitionError> for LoanApplicationError {
    fn from(err: LoanTransitionError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::Conflict => LoanApplicationError::Conflict(message),
            ErrorKind::InvalidState => LoanApplicationError::InvalidState(message),
            ErrorKind::InvalidArgument => LoanApplicationError::InvalidArgument(message),
        }
    }
}

impl From<InvalidId> for LoanApplicationError {
    fn from(err: InvalidId) -> Self {
        LoanApplicationError::InvalidArgument(err.to_string())
    }
}

/// アプリケーション層の Result型
pub type Result<T> = std::result::Result<T, LoanApplicationError>;
