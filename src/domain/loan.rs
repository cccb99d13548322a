use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{
    Barcode, EditionCopyId, LoanEvent, LoanEventType, LoanId, LoanTransitionError, MemberId,
};

// ============================================================================
// 状態と遷移表
// ============================================================================

/// 貸出ステータス
///
/// BORROWED（初期）→ RENEWED → RETURNED（終端）
///                           → LOST（終端）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    /// 貸出中
    Borrowed,
    /// 延長済み（貸出中）
    Renewed,
    /// 返却済み
    Returned,
    /// 紛失
    Lost,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Borrowed => "BORROWED",
            LoanStatus::Renewed => "RENEWED",
            LoanStatus::Returned => "RETURNED",
            LoanStatus::Lost => "LOST",
        }
    }

    /// 貸出中（BORROWEDまたはRENEWED）か
    pub fn is_active(&self) -> bool {
        matches!(self, LoanStatus::Borrowed | LoanStatus::Renewed)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BORROWED" => Ok(LoanStatus::Borrowed),
            "RENEWED" => Ok(LoanStatus::Renewed),
            "RETURNED" => Ok(LoanStatus::Returned),
            "LOST" => Ok(LoanStatus::Lost),
            _ => Err(format!("Invalid loan status: {}", s)),
        }
    }
}

/// 貸出に対する操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanOperation {
    Renew,
    Return,
    MarkLost,
}

impl fmt::Display for LoanOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            LoanOperation::Renew => "renewed",
            LoanOperation::Return => "returned",
            LoanOperation::MarkLost => "marked as lost",
        };
        f.write_str(verb)
    }
}

/// 遷移表：(現在の状態, 操作) → 次の状態
///
/// すべての組み合わせを列挙する。新しい状態や操作を追加した場合は
/// コンパイラが未処理の組み合わせを検出する。
pub fn transition(
    loan_id: LoanId,
    status: LoanStatus,
    operation: LoanOperation,
) -> Result<LoanStatus, LoanTransitionError> {
    use LoanOperation::*;
    use LoanStatus::*;

    match (status, operation) {
        (Borrowed, Renew) | (Renewed, Renew) => Ok(Renewed),
        (Returned, Renew) | (Lost, Renew) => Err(LoanTransitionError::NotActive {
            loan_id,
            status,
            operation,
        }),

        (Borrowed, Return) | (Renewed, Return) => Ok(Returned),
        (Returned, Return) => Err(LoanTransitionError::AlreadyReturned(loan_id)),
        (Lost, Return) => Err(LoanTransitionError::AlreadyLost(loan_id)),

        (Borrowed, MarkLost) | (Renewed, MarkLost) => Ok(Lost),
        (Lost, MarkLost) => Err(LoanTransitionError::AlreadyLost(loan_id)),
        // RETURNEDは終端。return_dateはRETURNEDの場合のみ設定される
        (Returned, MarkLost) => Err(LoanTransitionError::AlreadyReturned(loan_id)),
    }
}

// ============================================================================
// Loan集約
// ============================================================================

/// 借り手のスナップショット（会員サービスから取得した時点の値）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Borrower {
    pub member_id: MemberId,
    pub first_name: String,
    pub last_name: String,
}

/// 貸出対象コピーのスナップショット（在庫サービスから取得した時点の値）
///
/// 書籍側が後から変更されても既存の貸出には反映されない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanedCopy {
    pub edition_copy_id: EditionCopyId,
    pub barcode: Barcode,
    pub book_title: String,
    pub author: String,
    pub edition: String,
}

/// Loan集約 - 1冊のコピーの1回の貸出
///
/// 不変条件：
/// - due_date >= loan_date
/// - return_dateはstatusがRETURNEDの場合のみ設定される
/// - renewal_countは延長成功時のみ増える
///
/// 監査記録のため物理削除はしない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub loan_id: LoanId,
    pub borrower: Borrower,
    pub copy: LoanedCopy,
    pub loan_date: NaiveDate,
    pub due_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub status: LoanStatus,
    pub renewal_count: u32,

    /// 楽観的ロック用のバージョン（リポジトリが更新時に増やす）
    pub version: i32,
}

/// 純粋関数：返却期限を計算する
///
/// # エラー
/// - 貸出日が未設定の場合は`MissingLoanDate`
/// - 貸出期間が0以下の場合は`NonPositivePeriod`
/// - 返却期限が日付の範囲を超える場合は`DueDateOutOfRange`
pub fn calculate_due_date(
    loan_date: Option<NaiveDate>,
    loan_period_days: i64,
) -> Result<NaiveDate, LoanTransitionError> {
    let loan_date = loan_date.ok_or(LoanTransitionError::MissingLoanDate)?;
    add_days(loan_date, loan_period_days)
}

fn add_days(date: NaiveDate, days: i64) -> Result<NaiveDate, LoanTransitionError> {
    if days <= 0 {
        return Err(LoanTransitionError::NonPositivePeriod(days));
    }
    date.checked_add_days(Days::new(days as u64))
        .ok_or(LoanTransitionError::DueDateOutOfRange { from: date, days })
}

/// 純粋関数：貸出を開始する
///
/// 状態はBORROWED、延長回数は0。
/// 副作用なし。新しいLoanとLOAN_CREATEDイベントを返す。
pub fn open_loan(
    loan_id: LoanId,
    borrower: Borrower,
    copy: LoanedCopy,
    loan_date: NaiveDate,
    loan_period_days: i64,
) -> Result<(Loan, LoanEvent), LoanTransitionError> {
    let due_date = calculate_due_date(Some(loan_date), loan_period_days)?;

    let loan = Loan {
        loan_id,
        borrower,
        copy,
        loan_date,
        due_date,
        return_date: None,
        status: LoanStatus::Borrowed,
        renewal_count: 0,
        version: 0,
    };
    let event = LoanEvent::for_loan(LoanEventType::LoanCreated, &loan);

    Ok((loan, event))
}

/// 延長回数の上限チェック
///
/// 上限の設定値はオーケストレーターが持つため、延長の前に呼び出す。
pub fn ensure_renewal_allowed(loan: &Loan, renewal_limit: u32) -> Result<(), LoanTransitionError> {
    if loan.renewal_count >= renewal_limit {
        return Err(LoanTransitionError::RenewalLimitReached {
            loan_id: loan.loan_id,
            limit: renewal_limit,
        });
    }
    Ok(())
}

/// 純粋関数：貸出を延長する
///
/// - BORROWEDまたはRENEWEDのみ（それ以外はConflict）
/// - 返却期限 += 貸出期間
/// - renewal_count += 1
///
/// コピーの状態は変わらないためイベントは発行しない。
pub fn renew_loan(loan: &Loan, loan_period_days: i64) -> Result<Loan, LoanTransitionError> {
    let status = transition(loan.loan_id, loan.status, LoanOperation::Renew)?;
    let due_date = add_days(loan.due_date, loan_period_days)?;

    Ok(Loan {
        due_date,
        status,
        renewal_count: loan.renewal_count + 1,
        ..loan.clone()
    })
}

/// 純粋関数：貸出を返却する
///
/// 延滞していても返却は受け付ける。
/// 副作用なし。新しいLoanとLOAN_RETURNEDイベントを返す。
pub fn return_loan(
    loan: &Loan,
    returned_on: NaiveDate,
) -> Result<(Loan, LoanEvent), LoanTransitionError> {
    let status = transition(loan.loan_id, loan.status, LoanOperation::Return)?;

    let returned = Loan {
        status,
        return_date: Some(returned_on),
        ..loan.clone()
    };
    let event = LoanEvent::for_loan(LoanEventType::LoanReturned, &returned);

    Ok((returned, event))
}

/// 純粋関数：貸出を紛失扱いにする
///
/// `require_overdue`がtrueの場合、返却期限を過ぎていない貸出は紛失扱いにできない。
/// 副作用なし。新しいLoanとLOAN_MARKED_LOSTイベントを返す。
pub fn mark_lost(
    loan: &Loan,
    today: NaiveDate,
    require_overdue: bool,
) -> Result<(Loan, LoanEvent), LoanTransitionError> {
    let status = transition(loan.loan_id, loan.status, LoanOperation::MarkLost)?;

    if require_overdue && !is_overdue(loan, today) {
        return Err(LoanTransitionError::NotOverdue(loan.loan_id));
    }

    let lost = Loan {
        status,
        ..loan.clone()
    };
    let event = LoanEvent::for_loan(LoanEventType::LoanMarkedLost, &lost);

    Ok((lost, event))
}

/// 純粋関数：延滞判定
pub fn is_overdue(loan: &Loan, today: NaiveDate) -> bool {
    loan.status.is_active() && today > loan.due_date
}
