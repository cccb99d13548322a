use async_trait::async_trait;
use library_loans::adapters::local::LocalCatalogClient;
use library_loans::application::copy::ConsumeOutcome;
use library_loans::application::loan::{
    LoanApplicationError, LoanPolicy, OutboxRelay, ServiceDependencies, create_loan, find_loan,
    mark_loan_lost, renew_loan, return_loan,
};
use library_loans::domain::commands::*;
use library_loans::domain::*;
use library_loans::ports::{CatalogClient, PortError, Result as PortResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

mod common;

use common::{COPY_ID, MEMBER_ID, TOPIC, TestLibrary, date};

fn create_cmd(copy_id: EditionCopyId) -> CreateLoan {
    CreateLoan {
        edition_copy_id: copy_id,
        member_id: MEMBER_ID,
        loaned_on: date(2025, 3, 1),
    }
}

// ============================================================================
// 貸出作成
// ============================================================================

#[tokio::test]
async fn test_create_loan_and_propagate_copy_status() {
    // Arrange
    let library = TestLibrary::new();

    // Act
    let loan = create_loan(&library.deps, create_cmd(COPY_ID)).await.unwrap();

    // Assert: 貸出のスナップショット
    assert_eq!(loan.status, LoanStatus::Borrowed);
    assert_eq!(loan.loan_date, date(2025, 3, 1));
    assert_eq!(loan.due_date, date(2025, 3, 15));
    assert_eq!(loan.renewal_count, 0);
    assert_eq!(loan.return_date, None);
    assert_eq!(loan.copy.barcode.as_str(), "LIB-123");
    assert_eq!(loan.copy.book_title, "Dune");
    assert_eq!(loan.copy.author, "Frank Herbert");
    assert_eq!(loan.copy.edition, "First Edition");
    assert_eq!(loan.borrower.first_name, "Paul");

    // コミット後にイベントが発行されている
    let records = library.broker.records(TOPIC);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, "123");
    assert_eq!(records[0].header("eventType"), Some("loan-created"));
    assert_eq!(library.loans.unpublished_count(), 0);

    // 購読側が処理するまでコピーはAVAILABLEのまま
    assert_eq!(library.copy_status(COPY_ID), Some(CopyStatus::Available));

    let outcomes = library.deliver().await;
    assert_eq!(outcomes, vec![ConsumeOutcome::Applied]);
    assert_eq!(library.copy_status(COPY_ID), Some(CopyStatus::Loaned));
}

#[tokio::test]
async fn test_create_loan_for_loaned_copy_is_rejected() {
    let library = TestLibrary::new();
    create_loan(&library.deps, create_cmd(COPY_ID)).await.unwrap();
    library.deliver().await;

    let result = create_loan(&library.deps, create_cmd(COPY_ID)).await;

    assert!(matches!(
        result,
        Err(LoanApplicationError::CopyUnavailable(id)) if id == COPY_ID
    ));
    assert_eq!(library.loans.loan_count(), 1);
}

#[tokio::test]
async fn test_second_loan_before_copy_status_arrives_is_rejected() {
    // Arrange: 1件目のLOAN_CREATEDはまだ在庫側に届いていない
    let library = TestLibrary::new();
    let chani = MemberId::from_raw(8);
    library.members.add_member(chani, "Chani", "Kynes");
    let first = create_loan(&library.deps, create_cmd(COPY_ID)).await.unwrap();
    assert_eq!(library.copy_status(COPY_ID), Some(CopyStatus::Available));

    // Act
    let second = create_loan(
        &library.deps,
        CreateLoan {
            member_id: chani,
            ..create_cmd(COPY_ID)
        },
    )
    .await;

    // Assert
    assert!(matches!(
        second,
        Err(LoanApplicationError::CopyUnavailable(id)) if id == COPY_ID
    ));
    assert_eq!(library.loans.loan_count(), 1);
    assert_eq!(library.deliver().await, vec![ConsumeOutcome::Applied]);

    // 返却後は同じコピーを貸し出せ、コピーの状態と貸出が一致する
    return_loan(
        &library.deps,
        ReturnLoan {
            loan_id: first.loan_id,
            returned_on: date(2025, 3, 5),
        },
    )
    .await
    .unwrap();
    library.deliver().await;
    assert_eq!(library.copy_status(COPY_ID), Some(CopyStatus::Available));

    let next = create_loan(
        &library.deps,
        CreateLoan {
            member_id: chani,
            ..create_cmd(COPY_ID)
        },
    )
    .await
    .unwrap();
    assert_eq!(next.borrower.member_id, chani);
    library.deliver().await;
    assert_eq!(library.copy_status(COPY_ID), Some(CopyStatus::Loaned));
}

#[tokio::test]
async fn test_create_loan_with_unknown_member_writes_nothing() {
    let library = TestLibrary::new();

    let cmd = CreateLoan {
        member_id: MemberId::from_raw(8),
        ..create_cmd(COPY_ID)
    };
    let result = create_loan(&library.deps, cmd).await;

    assert!(matches!(result, Err(LoanApplicationError::ResourceNotFound(_))));
    assert_eq!(library.loans.loan_count(), 0);
    assert_eq!(library.loans.unpublished_count(), 0);
    assert!(library.broker.records(TOPIC).is_empty());
}

#[tokio::test]
async fn test_create_loan_with_unknown_copy_is_not_found() {
    let library = TestLibrary::new();

    let result = create_loan(&library.deps, create_cmd(EditionCopyId::from_raw(999))).await;

    assert!(matches!(result, Err(LoanApplicationError::ResourceNotFound(_))));
    assert_eq!(library.loans.loan_count(), 0);
}

#[tokio::test]
async fn test_persistence_failure_leaves_no_trace() {
    let library = TestLibrary::new();
    library.loans.fail_next_writes(1);

    let result = create_loan(&library.deps, create_cmd(COPY_ID)).await;

    assert!(matches!(result, Err(LoanApplicationError::Repository(_))));
    assert_eq!(library.loans.loan_count(), 0);
    assert_eq!(library.loans.unpublished_count(), 0);
    assert!(library.broker.records(TOPIC).is_empty());
    assert_eq!(library.copy_status(COPY_ID), Some(CopyStatus::Available));
}

#[tokio::test]
async fn test_publish_failure_is_recovered_by_relay() {
    // Arrange: コミット後の発行が失敗する
    let library = TestLibrary::new();
    library.broker.fail_next_publishes(1);

    // Act: 貸出自体は成功する
    let loan = create_loan(&library.deps, create_cmd(COPY_ID)).await.unwrap();

    // Assert: イベントはアウトボックスに残っている
    assert_eq!(loan.status, LoanStatus::Borrowed);
    assert_eq!(library.loans.unpublished_count(), 1);
    assert!(library.broker.records(TOPIC).is_empty());

    // リレーの再送で収束する
    assert_eq!(library.relay.flush().await.unwrap(), 1);
    assert_eq!(library.loans.unpublished_count(), 0);

    library.deliver().await;
    assert_eq!(library.copy_status(COPY_ID), Some(CopyStatus::Loaned));
}

// ============================================================================
// 延長
// ============================================================================

#[tokio::test]
async fn test_renew_loan_until_limit() {
    let library = TestLibrary::new();
    let loan = create_loan(&library.deps, create_cmd(COPY_ID)).await.unwrap();
    let published_before = library.broker.records(TOPIC).len();

    for expected_count in 1..=3 {
        let renewed = renew_loan(&library.deps, RenewLoan { loan_id: loan.loan_id })
            .await
            .unwrap();
        assert_eq!(renewed.status, LoanStatus::Renewed);
        assert_eq!(renewed.renewal_count, expected_count);
    }

    let loan = find_loan(&library.deps, loan.loan_id).await.unwrap();
    assert_eq!(loan.due_date, date(2025, 3, 1) + chrono::Days::new(14 * 4));

    // 上限到達
    let result = renew_loan(&library.deps, RenewLoan { loan_id: loan.loan_id }).await;
    assert!(matches!(result, Err(LoanApplicationError::Conflict(_))));

    // 延長はコピーの状態を変えないのでイベントを発行しない
    assert_eq!(library.broker.records(TOPIC).len(), published_before);
}

#[tokio::test]
async fn test_renew_unknown_loan_is_not_found() {
    let library = TestLibrary::new();

    let result = renew_loan(
        &library.deps,
        RenewLoan {
            loan_id: LoanId::from_raw(42),
        },
    )
    .await;

    assert!(matches!(
        result,
        Err(LoanApplicationError::LoanNotFound(id)) if id == LoanId::from_raw(42)
    ));
}

// ============================================================================
// 返却・紛失
// ============================================================================

#[tokio::test]
async fn test_return_loan_makes_copy_available_again() {
    let library = TestLibrary::new();
    let loan = create_loan(&library.deps, create_cmd(COPY_ID)).await.unwrap();
    library.deliver().await;

    let returned = return_loan(
        &library.deps,
        ReturnLoan {
            loan_id: loan.loan_id,
            returned_on: date(2025, 3, 10),
        },
    )
    .await
    .unwrap();

    assert_eq!(returned.status, LoanStatus::Returned);
    assert_eq!(returned.return_date, Some(date(2025, 3, 10)));

    library.deliver().await;
    assert_eq!(library.copy_status(COPY_ID), Some(CopyStatus::Available));

    // 二重返却は競合
    let again = return_loan(
        &library.deps,
        ReturnLoan {
            loan_id: loan.loan_id,
            returned_on: date(2025, 3, 11),
        },
    )
    .await;
    assert!(matches!(again, Err(LoanApplicationError::Conflict(_))));
}

#[tokio::test]
async fn test_mark_lost_then_return_is_conflict() {
    let library = TestLibrary::new();
    let loan = create_loan(&library.deps, create_cmd(COPY_ID)).await.unwrap();
    library.deliver().await;

    let lost = mark_loan_lost(
        &library.deps,
        MarkLoanLost {
            loan_id: loan.loan_id,
            reported_on: date(2025, 3, 5),
        },
    )
    .await
    .unwrap();
    assert_eq!(lost.status, LoanStatus::Lost);

    library.deliver().await;
    assert_eq!(library.copy_status(COPY_ID), Some(CopyStatus::Lost));

    let result = return_loan(
        &library.deps,
        ReturnLoan {
            loan_id: loan.loan_id,
            returned_on: date(2025, 3, 6),
        },
    )
    .await;
    assert!(matches!(result, Err(LoanApplicationError::Conflict(_))));

    // 紛失したコピーは貸し出せない
    let result = create_loan(&library.deps, create_cmd(COPY_ID)).await;
    assert!(matches!(result, Err(LoanApplicationError::CopyUnavailable(_))));
}

#[tokio::test]
async fn test_mark_lost_requires_overdue_when_configured() {
    let mut library = TestLibrary::new();
    library.deps.policy = LoanPolicy {
        lost_requires_overdue: true,
        ..LoanPolicy::default()
    };
    let loan = create_loan(&library.deps, create_cmd(COPY_ID)).await.unwrap();

    let early = mark_loan_lost(
        &library.deps,
        MarkLoanLost {
            loan_id: loan.loan_id,
            reported_on: date(2025, 3, 10),
        },
    )
    .await;
    assert!(matches!(early, Err(LoanApplicationError::Conflict(_))));

    let overdue = mark_loan_lost(
        &library.deps,
        MarkLoanLost {
            loan_id: loan.loan_id,
            reported_on: date(2025, 4, 1),
        },
    )
    .await
    .unwrap();
    assert_eq!(overdue.status, LoanStatus::Lost);
}

// ============================================================================
// 直接呼び出しモード
// ============================================================================

#[tokio::test]
async fn test_direct_mode_updates_copy_synchronously() {
    let library = TestLibrary::direct();

    let loan = create_loan(&library.deps, create_cmd(COPY_ID)).await.unwrap();
    assert_eq!(library.copy_status(COPY_ID), Some(CopyStatus::Loaned));

    return_loan(
        &library.deps,
        ReturnLoan {
            loan_id: loan.loan_id,
            returned_on: date(2025, 3, 2),
        },
    )
    .await
    .unwrap();
    assert_eq!(library.copy_status(COPY_ID), Some(CopyStatus::Available));

    // アウトボックスは空になり、ブローカーは使わない
    assert_eq!(library.loans.unpublished_count(), 0);
    assert!(library.broker.records(TOPIC).is_empty());
}

/// 最初のn回のコピー更新コマンドがタイムアウトする在庫サービス
struct FlakyCommands {
    inner: LocalCatalogClient,
    failing: AtomicUsize,
}

impl FlakyCommands {
    fn take_failure(&self) -> PortResult<()> {
        let remaining = self.failing.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing.store(remaining - 1, Ordering::SeqCst);
            return Err(PortError::Timeout);
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogClient for FlakyCommands {
    async fn get_copy(&self, copy_id: EditionCopyId) -> PortResult<EditionCopy> {
        self.inner.get_copy(copy_id).await
    }

    async fn get_edition(&self, edition_id: EditionId) -> PortResult<Edition> {
        self.inner.get_edition(edition_id).await
    }

    async fn get_book(&self, book_id: BookId) -> PortResult<Book> {
        self.inner.get_book(book_id).await
    }

    async fn borrow_copy(&self, copy_id: EditionCopyId) -> PortResult<EditionCopy> {
        self.take_failure()?;
        self.inner.borrow_copy(copy_id).await
    }

    async fn return_copy(&self, copy_id: EditionCopyId) -> PortResult<EditionCopy> {
        self.take_failure()?;
        self.inner.return_copy(copy_id).await
    }

    async fn mark_copy_lost(&self, copy_id: EditionCopyId) -> PortResult<EditionCopy> {
        self.take_failure()?;
        self.inner.mark_copy_lost(copy_id).await
    }
}

#[tokio::test]
async fn test_direct_mode_command_failure_is_recovered_by_relay() {
    // Arrange: コミット後のコマンドが1回タイムアウトする
    let library = TestLibrary::direct();
    let catalog = Arc::new(FlakyCommands {
        inner: LocalCatalogClient::new(library.inventory.clone()),
        failing: AtomicUsize::new(1),
    });
    let relay = Arc::new(OutboxRelay::commands(
        library.loans.clone(),
        catalog.clone(),
        Duration::from_secs(1),
    ));
    let deps = ServiceDependencies {
        catalog,
        outbox_relay: relay.clone(),
        ..library.deps.clone()
    };

    // Act: 貸出自体は成功する
    let loan = create_loan(&deps, create_cmd(COPY_ID)).await.unwrap();

    // Assert: コマンドはアウトボックスに残っている
    assert_eq!(loan.status, LoanStatus::Borrowed);
    assert_eq!(library.copy_status(COPY_ID), Some(CopyStatus::Available));
    assert_eq!(library.loans.unpublished_count(), 1);

    // 定期フラッシュで収束する
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(relay.clone().run(Duration::from_millis(10), shutdown_rx));

    let converged = tokio::time::timeout(Duration::from_secs(5), async {
        while library.copy_status(COPY_ID) != Some(CopyStatus::Loaned) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(converged.is_ok());
    assert_eq!(library.loans.unpublished_count(), 0);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    // 返却も同じ経路で伝わる
    return_loan(
        &deps,
        ReturnLoan {
            loan_id: loan.loan_id,
            returned_on: date(2025, 3, 2),
        },
    )
    .await
    .unwrap();
    assert_eq!(library.copy_status(COPY_ID), Some(CopyStatus::Available));
}

// ============================================================================
// タイムアウト
// ============================================================================

/// 応答しない在庫サービス
struct UnresponsiveCatalog;

#[async_trait]
impl CatalogClient for UnresponsiveCatalog {
    async fn get_copy(&self, _copy_id: EditionCopyId) -> PortResult<EditionCopy> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Err(PortError::Timeout)
    }

    async fn get_edition(&self, edition_id: EditionId) -> PortResult<Edition> {
        Err(PortError::NotFound(format!("edition {edition_id}")))
    }

    async fn get_book(&self, book_id: BookId) -> PortResult<Book> {
        Err(PortError::NotFound(format!("book {book_id}")))
    }

    async fn borrow_copy(&self, copy_id: EditionCopyId) -> PortResult<EditionCopy> {
        Err(PortError::NotFound(format!("copy {copy_id}")))
    }

    async fn return_copy(&self, copy_id: EditionCopyId) -> PortResult<EditionCopy> {
        Err(PortError::NotFound(format!("copy {copy_id}")))
    }

    async fn mark_copy_lost(&self, copy_id: EditionCopyId) -> PortResult<EditionCopy> {
        Err(PortError::NotFound(format!("copy {copy_id}")))
    }
}

#[tokio::test(start_paused = true)]
async fn test_unresponsive_inventory_times_out() {
    let library = TestLibrary::new();
    let deps = ServiceDependencies {
        catalog: Arc::new(UnresponsiveCatalog),
        policy: LoanPolicy {
            remote_call_timeout: Duration::from_millis(500),
            ..LoanPolicy::default()
        },
        ..library.deps.clone()
    };

    let result = create_loan(&deps, create_cmd(COPY_ID)).await;

    assert!(matches!(
        result,
        Err(LoanApplicationError::DownstreamTimeout { service: "inventory" })
    ));
    assert_eq!(library.loans.loan_count(), 0);
}
