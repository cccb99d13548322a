use library_loans::application::copy::subscriber::{
    HEADER_DLT_FAILURE_KIND, HEADER_DLT_ORIGINAL_OFFSET, HEADER_DLT_ORIGINAL_PARTITION,
    HEADER_DLT_ORIGINAL_TOPIC,
};
use library_loans::application::copy::{ConsumeOutcome, handle_record, spawn_consumers};
use library_loans::domain::*;
use library_loans::ports::{ConsumerRecord, EventPublisher, OutboundRecord};
use std::time::Duration;
use tokio::sync::watch;

mod common;

use common::{COPY_ID, MEMBER_ID, TOPIC, TestLibrary, fast_retry};

const DLT: &str = "loan-events.DLT";

fn event(event_type: LoanEventType, copy_id: EditionCopyId) -> LoanEvent {
    LoanEvent {
        event_type,
        context: LoanEventContext {
            loan_id: LoanId::from_raw(1),
            member_id: MEMBER_ID,
            edition_copy_id: copy_id,
        },
    }
}

fn record(payload: Vec<u8>, partition: u32, offset: u64) -> ConsumerRecord {
    ConsumerRecord {
        topic: TOPIC.to_string(),
        partition,
        offset,
        key: COPY_ID.to_string(),
        payload,
        headers: vec![("eventType".to_string(), "loan-created".to_string())],
    }
}

fn event_record(event: LoanEvent) -> ConsumerRecord {
    record(event.encode().unwrap(), 0, 0)
}

// ============================================================================
// デッドレター
// ============================================================================

#[tokio::test]
async fn test_malformed_payload_goes_to_dead_letter_topic() {
    // Arrange
    let library = TestLibrary::new();
    let malformed = record(b"{\"eventType\": ".to_vec(), 1, 5);

    // Act
    let outcome = handle_record(&library.subscriber, &malformed).await.unwrap();

    // Assert
    assert!(matches!(
        outcome,
        ConsumeOutcome::DeadLettered { ref topic, .. } if topic == DLT
    ));

    let dead_letters = library.broker.records(DLT);
    assert_eq!(dead_letters.len(), 1);

    let dead = &dead_letters[0];
    assert_eq!(dead.partition, 1);
    assert_eq!(dead.key, "123");
    assert_eq!(dead.payload, malformed.payload);
    assert_eq!(dead.header("eventType"), Some("loan-created"));
    assert_eq!(dead.header(HEADER_DLT_ORIGINAL_TOPIC), Some(TOPIC));
    assert_eq!(dead.header(HEADER_DLT_ORIGINAL_PARTITION), Some("1"));
    assert_eq!(dead.header(HEADER_DLT_ORIGINAL_OFFSET), Some("5"));
    assert_eq!(dead.header(HEADER_DLT_FAILURE_KIND), Some("unprocessable"));

    // コピーは変わらない
    assert_eq!(library.copy_status(COPY_ID), Some(CopyStatus::Available));
}

#[tokio::test]
async fn test_unknown_event_type_is_not_retried() {
    let library = TestLibrary::new();
    let payload = br#"{"eventType":"LOAN_EXTENDED","context":{"loanId":1,"memberId":7,"editionCopyId":123}}"#;

    let outcome = handle_record(&library.subscriber, &record(payload.to_vec(), 0, 0))
        .await
        .unwrap();

    match outcome {
        ConsumeOutcome::DeadLettered { topic, reason } => {
            assert_eq!(topic, DLT);
            assert!(reason.contains("LOAN_EXTENDED"));
        }
        other => panic!("expected dead letter, got {other:?}"),
    }
    assert_eq!(library.copy_status(COPY_ID), Some(CopyStatus::Available));
}

#[tokio::test]
async fn test_event_for_unknown_copy_goes_to_dead_letter_topic() {
    let library = TestLibrary::new();

    let outcome = handle_record(
        &library.subscriber,
        &event_record(event(LoanEventType::LoanCreated, EditionCopyId::from_raw(999))),
    )
    .await
    .unwrap();

    assert!(matches!(outcome, ConsumeOutcome::DeadLettered { .. }));
    assert_eq!(
        library.broker.records(DLT)[0].header(HEADER_DLT_FAILURE_KIND),
        Some("unprocessable")
    );
}

#[tokio::test]
async fn test_event_moving_lost_copy_goes_to_dead_letter_topic() {
    let library = TestLibrary::new();
    let lost = library
        .inventory_repository
        .add_copy(library.edition.edition_id, CopyStatus::Lost);

    let outcome = handle_record(
        &library.subscriber,
        &event_record(event(LoanEventType::LoanReturned, lost.copy_id)),
    )
    .await
    .unwrap();

    assert!(matches!(outcome, ConsumeOutcome::DeadLettered { .. }));
    assert_eq!(library.copy_status(lost.copy_id), Some(CopyStatus::Lost));
}

#[tokio::test]
async fn test_retries_exhausted_goes_to_dead_letter_topic() {
    let mut library = TestLibrary::new();
    library.subscriber.retry = fast_retry(2);
    library.inventory_repository.fail_next_operations(10);

    let outcome = handle_record(
        &library.subscriber,
        &event_record(event(LoanEventType::LoanCreated, COPY_ID)),
    )
    .await
    .unwrap();

    assert!(matches!(outcome, ConsumeOutcome::DeadLettered { .. }));
    assert_eq!(
        library.broker.records(DLT)[0].header(HEADER_DLT_FAILURE_KIND),
        Some("retries-exhausted")
    );
}

// ============================================================================
// 冪等性とリトライ
// ============================================================================

#[tokio::test]
async fn test_redelivered_event_is_skipped() {
    let library = TestLibrary::new();
    let created = event_record(event(LoanEventType::LoanCreated, COPY_ID));

    let first = handle_record(&library.subscriber, &created).await.unwrap();
    let second = handle_record(&library.subscriber, &created).await.unwrap();

    assert_eq!(first, ConsumeOutcome::Applied);
    assert_eq!(second, ConsumeOutcome::Skipped);
    assert_eq!(library.copy_status(COPY_ID), Some(CopyStatus::Loaned));
    assert!(library.broker.records(DLT).is_empty());
}

#[tokio::test]
async fn test_lost_event_for_lost_copy_is_skipped() {
    let library = TestLibrary::new();
    let lost = library
        .inventory_repository
        .add_copy(library.edition.edition_id, CopyStatus::Lost);

    let outcome = handle_record(
        &library.subscriber,
        &event_record(event(LoanEventType::LoanMarkedLost, lost.copy_id)),
    )
    .await
    .unwrap();

    assert_eq!(outcome, ConsumeOutcome::Skipped);
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let library = TestLibrary::new();
    library.inventory_repository.fail_next_operations(2);

    let outcome = handle_record(
        &library.subscriber,
        &event_record(event(LoanEventType::LoanCreated, COPY_ID)),
    )
    .await
    .unwrap();

    assert_eq!(outcome, ConsumeOutcome::Applied);
    assert_eq!(library.copy_status(COPY_ID), Some(CopyStatus::Loaned));
    assert!(library.broker.records(DLT).is_empty());
}

#[tokio::test]
async fn test_lost_compare_and_set_is_retried() {
    let library = TestLibrary::new();
    library.inventory_repository.lose_next_compare_and_set();

    let outcome = handle_record(
        &library.subscriber,
        &event_record(event(LoanEventType::LoanCreated, COPY_ID)),
    )
    .await
    .unwrap();

    assert_eq!(outcome, ConsumeOutcome::Applied);
    assert_eq!(library.copy_status(COPY_ID), Some(CopyStatus::Loaned));
}

// ============================================================================
// コンシューマータスク
// ============================================================================

#[tokio::test]
async fn test_consumers_apply_published_events_in_order() {
    let library = TestLibrary::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handles = spawn_consumers(
        library.subscriber.clone(),
        library.broker.as_ref(),
        &[TOPIC.to_string()],
        shutdown_rx,
    )
    .await
    .unwrap();
    assert_eq!(handles.len(), 3);

    // 同じコピーへの貸出→返却→紛失は同じパーティションで順に処理される
    for event_type in [
        LoanEventType::LoanCreated,
        LoanEventType::LoanReturned,
        LoanEventType::LoanMarkedLost,
    ] {
        let loan_event = event(event_type, COPY_ID);
        library
            .broker
            .publish(OutboundRecord::new(
                TOPIC,
                loan_event.partition_key(),
                loan_event.encode().unwrap(),
            ))
            .await
            .unwrap();
    }

    let converged = tokio::time::timeout(Duration::from_secs(5), async {
        while library.copy_status(COPY_ID) != Some(CopyStatus::Lost) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(converged.is_ok());

    shutdown_tx.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
    assert!(library.broker.records(DLT).is_empty());
}

#[tokio::test]
async fn test_consumer_holds_partition_until_dead_letter_is_published() {
    let library = TestLibrary::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handles = spawn_consumers(
        library.subscriber.clone(),
        library.broker.as_ref(),
        &[TOPIC.to_string()],
        shutdown_rx,
    )
    .await
    .unwrap();

    // 壊れたレコードの後に、同じコピーの正常なイベントが続く
    library
        .broker
        .publish(OutboundRecord::new(TOPIC, COPY_ID.to_string(), b"not json".to_vec()))
        .await
        .unwrap();
    let created = event(LoanEventType::LoanCreated, COPY_ID);
    library
        .broker
        .publish(OutboundRecord::new(
            TOPIC,
            created.partition_key(),
            created.encode().unwrap(),
        ))
        .await
        .unwrap();

    // 1回目の処理ではデッドレターへの発行がリトライ上限まで失敗する
    library.broker.fail_next_publishes(6);

    let converged = tokio::time::timeout(Duration::from_secs(5), async {
        while library.copy_status(COPY_ID) != Some(CopyStatus::Loaned) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(converged.is_ok());

    // 壊れたレコードは失われずにデッドレターに届いている
    let dead_letters = library.broker.records(DLT);
    assert_eq!(dead_letters.len(), 1);
    assert_eq!(dead_letters[0].payload, b"not json".to_vec());

    shutdown_tx.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
}
