use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Barcode, CopyTransitionError, EditionCopyId, EditionId, LoanEventType};

/// 蔵書コピーの貸出可否ステータス
///
/// LOSTは終端状態で、他のどの規則よりも先に判定される。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CopyStatus {
    Available,
    Loaned,
    Lost,
}

impl CopyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CopyStatus::Available => "AVAILABLE",
            CopyStatus::Loaned => "LOANED",
            CopyStatus::Lost => "LOST",
        }
    }
}

impl fmt::Display for CopyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CopyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(CopyStatus::Available),
            "LOANED" => Ok(CopyStatus::Loaned),
            "LOST" => Ok(CopyStatus::Lost),
            _ => Err(format!("Invalid copy status: {}", s)),
        }
    }
}

/// 蔵書コピーに対する操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOperation {
    MarkBorrowed,
    MarkAvailable,
    MarkLost,
}

impl CopyOperation {
    /// 貸出イベントに対応する操作
    pub fn for_event(event_type: LoanEventType) -> Self {
        match event_type {
            LoanEventType::LoanCreated => CopyOperation::MarkBorrowed,
            LoanEventType::LoanReturned => CopyOperation::MarkAvailable,
            LoanEventType::LoanMarkedLost => CopyOperation::MarkLost,
        }
    }

    /// 操作が成功した場合の状態
    pub fn target_status(&self) -> CopyStatus {
        match self {
            CopyOperation::MarkBorrowed => CopyStatus::Loaned,
            CopyOperation::MarkAvailable => CopyStatus::Available,
            CopyOperation::MarkLost => CopyStatus::Lost,
        }
    }
}

impl fmt::Display for CopyOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CopyOperation::MarkBorrowed => "borrow",
            CopyOperation::MarkAvailable => "return",
            CopyOperation::MarkLost => "mark lost",
        };
        f.write_str(name)
    }
}

/// 遷移表：(現在の状態, 操作) → 次の状態
///
/// 紛失済みコピーの再紛失は`AlreadyInState`として返す。
/// 直接のクライアントはConflict、イベント購読側はno-opとして扱う。
pub fn transition(
    status: CopyStatus,
    operation: CopyOperation,
) -> Result<CopyStatus, CopyTransitionError> {
    use CopyOperation::*;
    use CopyStatus::*;

    match (status, operation) {
        (Lost, MarkLost) => Err(CopyTransitionError::AlreadyInState(Lost)),
        (Lost, MarkBorrowed) | (Lost, MarkAvailable) => {
            Err(CopyTransitionError::Terminal(operation))
        }

        (Available, MarkBorrowed) => Ok(Loaned),
        (Loaned, MarkBorrowed) => Err(CopyTransitionError::AlreadyInState(Loaned)),

        (Loaned, MarkAvailable) => Ok(Available),
        (Available, MarkAvailable) => Err(CopyTransitionError::AlreadyInState(Available)),

        (Available, MarkLost) | (Loaned, MarkLost) => Ok(Lost),
    }
}

/// 蔵書コピー集約 - 版に属する1冊の物理（またはデジタル）コピー
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditionCopy {
    pub copy_id: EditionCopyId,
    pub barcode: Barcode,
    pub status: CopyStatus,
    pub edition_id: EditionId,
    pub acquired_at: DateTime<Utc>,
}

impl EditionCopy {
    /// 新しく受け入れたコピー（AVAILABLE、バーコードを発行）
    pub fn acquire(copy_id: EditionCopyId, edition_id: EditionId, acquired_at: DateTime<Utc>) -> Self {
        Self {
            copy_id,
            barcode: Barcode::generate(),
            status: CopyStatus::Available,
            edition_id,
            acquired_at,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == CopyStatus::Available
    }
}

/// 純粋関数：操作を適用した新しいコピーを返す
pub fn apply(copy: &EditionCopy, operation: CopyOperation) -> Result<EditionCopy, CopyTransitionError> {
    let status = transition(copy.status, operation)?;
    Ok(EditionCopy {
        status,
        ..copy.clone()
    })
}
