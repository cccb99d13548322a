use crate::domain::{Loan, LoanEvent, LoanId};
use async_trait::async_trait;

use super::Result;

/// 貸出リポジトリポート
///
/// 貸出の保存とアウトボックスへのイベント書き込みを同じトランザクションで行う。
/// イベントはコミット後にアウトボックスリレーが発行する。
#[async_trait]
pub trait LoanRepository: Send + Sync {
    /// 新しい貸出IDを採番する
    async fn next_id(&self) -> Result<LoanId>;

    /// 新しい貸出を保存する（versionは1になる）
    ///
    /// 同じコピーに有効な貸出（BORROWED/RENEWED）が既にある場合は`PortError::Conflict`。
    /// コピーの状態が在庫側に反映される前の二重貸出はここで止める。
    async fn insert(&self, loan: &Loan, event: Option<&LoanEvent>) -> Result<Loan>;

    /// 既存の貸出を更新する
    ///
    /// `loan.version`が保存済みの値と一致しない場合は`PortError::Conflict`。
    /// 成功時はversionを1つ進めた貸出を返す。
    async fn update(&self, loan: &Loan, event: Option<&LoanEvent>) -> Result<Loan>;

    async fn find_by_id(&self, loan_id: LoanId) -> Result<Option<Loan>>;
}
