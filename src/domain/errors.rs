use chrono::NaiveDate;
use thiserror::Error;

use super::{CopyOperation, CopyStatus, LoanId, LoanOperation, LoanStatus};

/// エラーの分類
///
/// アプリケーション層・API層はこの分類でステータスコードを決める。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 状態遷移が不正
    Conflict,
    /// 前提となる値が未設定
    InvalidState,
    /// 引数が不正
    InvalidArgument,
}

/// 貸出の状態遷移エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoanTransitionError {
    /// 貸出日が未設定のまま返却期限を計算しようとした
    #[error("The loan date has not been set")]
    MissingLoanDate,

    /// 貸出期間が0以下
    #[error("The loan period must be a positive number of days (got {0})")]
    NonPositivePeriod(i64),

    /// 返却期限が日付の表現範囲を超える
    #[error("The due date {days} days after {from} is out of range")]
    DueDateOutOfRange { from: NaiveDate, days: i64 },

    /// 既に返却済み
    #[error("The loan with id {0} has already been returned")]
    AlreadyReturned(LoanId),

    /// 紛失扱いの貸出は操作できない
    #[error("The loan with id {0} is marked as lost")]
    AlreadyLost(LoanId),

    /// 延長できない状態
    #[error("Only loans with status BORROWED or RENEWED can be {operation} (loan {loan_id} is {status})")]
    NotActive {
        loan_id: LoanId,
        status: LoanStatus,
        operation: LoanOperation,
    },

    /// 延長回数の上限に達している
    #[error("The maximum number of renewals ({limit}) has been reached for loan {loan_id}")]
    RenewalLimitReached { loan_id: LoanId, limit: u32 },

    /// 返却期限前の紛失登録（延滞を前提とする運用の場合のみ）
    #[error("The loan with id {0} is not overdue and cannot be marked as lost")]
    NotOverdue(LoanId),
}

impl LoanTransitionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoanTransitionError::MissingLoanDate => ErrorKind::InvalidState,
            LoanTransitionError::NonPositivePeriod(_)
            | LoanTransitionError::DueDateOutOfRange { .. } => ErrorKind::InvalidArgument,
            LoanTransitionError::AlreadyReturned(_)
            | LoanTransitionError::AlreadyLost(_)
            | LoanTransitionError::NotActive { .. }
            | LoanTransitionError::RenewalLimitReached { .. }
            | LoanTransitionError::NotOverdue(_) => ErrorKind::Conflict,
        }
    }
}

/// 蔵書コピーの状態遷移エラー
///
/// 呼び出し元によって扱いが変わる：
/// - 直接のクライアント：どちらもConflict
/// - イベント購読側：`AlreadyInState`は冪等なno-op、`Terminal`はデッドレター
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CopyTransitionError {
    /// 既に目的の状態にある
    #[error("{}", already_in_state_message(.0))]
    AlreadyInState(CopyStatus),

    /// 紛失済み（終端状態）のため変更不可
    #[error("This edition copy is lost. Its status cannot be changed (attempted: {0})")]
    Terminal(CopyOperation),
}

fn already_in_state_message(status: &CopyStatus) -> &'static str {
    match status {
        CopyStatus::Available => "This edition copy is already available.",
        CopyStatus::Loaned => "This edition copy is already on loan.",
        CopyStatus::Lost => "The edition copy is already marked as lost.",
    }
}

impl CopyTransitionError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Conflict
    }
}
