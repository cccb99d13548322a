use crate::domain::{self, Borrower, Loan, LoanEvent, LoanId, LoanedCopy, commands::*};
use crate::ports::*;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::errors::{LoanApplicationError, Result};
use super::outbox_relay::OutboxRelay;

const INVENTORY_SERVICE: &str = "inventory";
const MEMBER_SERVICE: &str = "member";

/// 貸出の運用ルール
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanPolicy {
    /// 貸出期間（日）。延長1回あたりの延長日数も同じ
    pub loan_period_days: i64,
    /// 延長回数の上限
    pub renewal_limit: u32,
    /// 紛失登録に延滞を必要とするか
    pub lost_requires_overdue: bool,
    /// 他サービス呼び出しのタイムアウト
    pub remote_call_timeout: Duration,
}

impl Default for LoanPolicy {
    fn default() -> Self {
        Self {
            loan_period_days: 14,
            renewal_limit: 3,
            lost_requires_overdue: false,
            remote_call_timeout: Duration::from_secs(2),
        }
    }
}

/// サービスの依存関係
///
/// データ構造として定義し、振る舞いは持たない。
/// 各ユースケースは依存関係を引数として受け取る関数として実装する。
#[derive(Clone)]
pub struct ServiceDependencies {
    pub loan_repository: Arc<dyn LoanRepository>,
    pub catalog: Arc<dyn CatalogClient>,
    pub member_directory: Arc<dyn MemberDirectory>,
    /// コピーの状態変更を在庫サービスに届けるリレー（イベント発行または直接コマンド）
    pub outbox_relay: Arc<OutboxRelay>,
    pub policy: LoanPolicy,
}

/// 他サービス呼び出しをタイムアウト付きで実行し、エラーを分類する
async fn call_remote<T>(
    service: &'static str,
    timeout: Duration,
    call: impl Future<Output = std::result::Result<T, PortError>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(PortError::NotFound(message))) => Err(LoanApplicationError::ResourceNotFound(message)),
        Ok(Err(PortError::Timeout)) | Err(_) => {
            tracing::warn!(service, timeout_ms = timeout.as_millis() as u64, "Remote call timed out");
            Err(LoanApplicationError::DownstreamTimeout { service })
        }
        Ok(Err(source)) => Err(LoanApplicationError::Downstream { service, source }),
    }
}

async fn load_loan(deps: &ServiceDependencies, loan_id: LoanId) -> Result<Loan> {
    deps.loan_repository
        .find_by_id(loan_id)
        .await
        .map_err(LoanApplicationError::Repository)?
        .ok_or(LoanApplicationError::LoanNotFound(loan_id))
}

fn map_write_error(err: PortError) -> LoanApplicationError {
    match err {
        PortError::Conflict(message) => LoanApplicationError::Conflict(message),
        other => LoanApplicationError::Repository(other),
    }
}

/// コミット後にコピーの状態変更を伝える
///
/// 失敗してもロールバックはしない。
/// アウトボックスに残ったエントリはリレーの定期フラッシュで再送される。
async fn propagate(deps: &ServiceDependencies, event: &LoanEvent) {
    if let Err(err) = deps.outbox_relay.flush().await {
        tracing::warn!(
            loan_id = %event.context.loan_id,
            copy_id = %event.context.edition_copy_id,
            event_type = %event.event_type,
            error = %err,
            "Post-commit copy status update failed, outbox relay will retry"
        );
    }
}

/// 貸出を作成する
///
/// 手順：
/// 1. コピーを取得し、AVAILABLEでなければ`CopyUnavailable`
/// 2. 会員を取得
/// 3. 版と書籍を取得し、書名・著者・版の表記をスナップショットとして保持
/// 4. BORROWEDの貸出とアウトボックスのエントリを保存
///    （同じコピーに有効な貸出が既にあれば`CopyUnavailable`）
/// 5. コミット後にコピーの状態変更を伝える
///
/// 1〜3のいずれかが失敗した場合は何も書き込まない。
pub async fn create_loan(deps: &ServiceDependencies, cmd: CreateLoan) -> Result<Loan> {
    let timeout = deps.policy.remote_call_timeout;

    // 1. コピーの貸出可否確認
    let copy = call_remote(
        INVENTORY_SERVICE,
        timeout,
        deps.catalog.get_copy(cmd.edition_copy_id),
    )
    .await?;

    if !copy.is_available() {
        return Err(LoanApplicationError::CopyUnavailable(cmd.edition_copy_id));
    }

    // 2. 会員の存在確認
    let member = call_remote(
        MEMBER_SERVICE,
        timeout,
        deps.member_directory.get_member(cmd.member_id),
    )
    .await?;

    // 3. 版と書籍のスナップショット
    let edition = call_remote(
        INVENTORY_SERVICE,
        timeout,
        deps.catalog.get_edition(copy.edition_id),
    )
    .await?;
    let book = call_remote(INVENTORY_SERVICE, timeout, deps.catalog.get_book(edition.book_id)).await?;

    // 4. 貸出の作成と保存
    let loan_id = deps
        .loan_repository
        .next_id()
        .await
        .map_err(LoanApplicationError::Repository)?;

    let borrower = Borrower {
        member_id: member.member_id,
        first_name: member.first_name,
        last_name: member.last_name,
    };
    let loaned_copy = LoanedCopy {
        edition_copy_id: copy.copy_id,
        barcode: copy.barcode,
        book_title: book.title,
        author: book.author,
        edition: edition.edition,
    };

    let (loan, event) = domain::loan::open_loan(
        loan_id,
        borrower,
        loaned_copy,
        cmd.loaned_on,
        deps.policy.loan_period_days,
    )?;

    // 在庫側に未反映の貸出がある場合もここで弾かれる
    let saved = deps
        .loan_repository
        .insert(&loan, Some(&event))
        .await
        .map_err(|err| match err {
            PortError::Conflict(message) => {
                tracing::info!(copy_id = %cmd.edition_copy_id, reason = %message, "Copy already has an active loan");
                LoanApplicationError::CopyUnavailable(cmd.edition_copy_id)
            }
            other => LoanApplicationError::Repository(other),
        })?;

    tracing::info!(
        loan_id = %saved.loan_id,
        member_id = %saved.borrower.member_id,
        copy_id = %saved.copy.edition_copy_id,
        due_date = %saved.due_date,
        "Loan created"
    );

    // 5. コミット後の伝播
    propagate(deps, &event).await;

    Ok(saved)
}

/// 貸出を延長する
///
/// 延長回数が上限に達している場合、または返却済み・紛失の場合はConflict。
/// コピーの状態は変わらないためイベントは発行しない。
pub async fn renew_loan(deps: &ServiceDependencies, cmd: RenewLoan) -> Result<Loan> {
    let loan = load_loan(deps, cmd.loan_id).await?;

    domain::loan::ensure_renewal_allowed(&loan, deps.policy.renewal_limit)?;
    let renewed = domain::loan::renew_loan(&loan, deps.policy.loan_period_days)?;

    let saved = deps
        .loan_repository
        .update(&renewed, None)
        .await
        .map_err(map_write_error)?;

    tracing::info!(
        loan_id = %saved.loan_id,
        renewal_count = saved.renewal_count,
        due_date = %saved.due_date,
        "Loan renewed"
    );

    Ok(saved)
}

/// 貸出を返却する
pub async fn return_loan(deps: &ServiceDependencies, cmd: ReturnLoan) -> Result<Loan> {
    let loan = load_loan(deps, cmd.loan_id).await?;

    let (returned, event) = domain::loan::return_loan(&loan, cmd.returned_on)?;

    let saved = deps
        .loan_repository
        .update(&returned, Some(&event))
        .await
        .map_err(map_write_error)?;

    tracing::info!(loan_id = %saved.loan_id, copy_id = %saved.copy.edition_copy_id, "Loan returned");

    propagate(deps, &event).await;

    Ok(saved)
}

/// 貸出を紛失扱いにする
pub async fn mark_loan_lost(deps: &ServiceDependencies, cmd: MarkLoanLost) -> Result<Loan> {
    let loan = load_loan(deps, cmd.loan_id).await?;

    let (lost, event) =
        domain::loan::mark_lost(&loan, cmd.reported_on, deps.policy.lost_requires_overdue)?;

    let saved = deps
        .loan_repository
        .update(&lost, Some(&event))
        .await
        .map_err(map_write_error)?;

    tracing::info!(loan_id = %saved.loan_id, copy_id = %saved.copy.edition_copy_id, "Loan marked as lost");

    propagate(deps, &event).await;

    Ok(saved)
}

/// 貸出を取得する
pub async fn find_loan(deps: &ServiceDependencies, loan_id: LoanId) -> Result<Loan> {
    load_loan(deps, loan_id).await
}
