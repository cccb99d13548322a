use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{EditionCopyId, EditionId, LoanId, MemberId};

/// コマンド：貸出を作成する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLoan {
    pub edition_copy_id: EditionCopyId,
    pub member_id: MemberId,
    pub loaned_on: NaiveDate,
}

/// コマンド：貸出を延長する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewLoan {
    pub loan_id: LoanId,
}

/// コマンド：貸出を返却する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLoan {
    pub loan_id: LoanId,
    pub returned_on: NaiveDate,
}

/// コマンド：貸出を紛失扱いにする
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkLoanLost {
    pub loan_id: LoanId,
    pub reported_on: NaiveDate,
}

/// コマンド：版に新しいコピーを追加する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddCopy {
    pub edition_id: EditionId,
    pub acquired_at: DateTime<Utc>,
}
