use crate::application::retry::{RetryPolicy, retry_with_predicate};
use crate::domain::{LoanEvent, dead_letter_topic};
use crate::ports::{
    ConsumerRecord, EventPublisher, EventSubscriber, OutboundRecord, PartitionStream, PortError,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::copy_service::{CopyUpdate, InventoryDependencies, apply_loan_event};
use super::errors::InventoryApplicationError;

pub const HEADER_EVENT_TYPE: &str = "eventType";
pub const HEADER_DLT_ORIGINAL_TOPIC: &str = "dlt-original-topic";
pub const HEADER_DLT_ORIGINAL_PARTITION: &str = "dlt-original-partition";
pub const HEADER_DLT_ORIGINAL_OFFSET: &str = "dlt-original-offset";
pub const HEADER_DLT_EXCEPTION_MESSAGE: &str = "dlt-exception-message";
pub const HEADER_DLT_FAILURE_KIND: &str = "dlt-failure-kind";

/// 購読側の依存関係
#[derive(Clone)]
pub struct SubscriberDependencies {
    pub inventory: InventoryDependencies,
    /// デッドレタートピックへの発行先
    pub dead_letters: Arc<dyn EventPublisher>,
    pub retry: RetryPolicy,
}

/// 1レコードの処理結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// コピーの状態を変更した
    Applied,
    /// 既に目的の状態だった
    Skipped,
    /// デッドレタートピックに送った
    DeadLettered { topic: String, reason: String },
}

/// デッドレターに送る理由の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    /// リトライしても回復しない
    Unprocessable,
    /// リトライ上限に達した
    RetriesExhausted,
}

impl FailureKind {
    fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Unprocessable => "unprocessable",
            FailureKind::RetriesExhausted => "retries-exhausted",
        }
    }
}

/// 貸出イベントを1件処理する
///
/// - デコードできない・未知の種類・IDが不正 → リトライせずデッドレター
/// - 目的の状態に既にある → no-op
/// - 存在しないコピー・紛失済みコピーを動かすイベント → リトライせずデッドレター
/// - 一時的な障害（ストア停止・競合） → バックオフ付きでリトライし、上限でデッドレター
///
/// エラーを返すのはデッドレターへの発行自体が失敗した場合のみ。
pub async fn handle_record(
    deps: &SubscriberDependencies,
    record: &ConsumerRecord,
) -> Result<ConsumeOutcome, PortError> {
    let event = match LoanEvent::decode(&record.payload) {
        Ok(event) => event,
        Err(err) => {
            return dead_letter(deps, record, FailureKind::Unprocessable, &err.to_string()).await;
        }
    };

    let result = retry_with_predicate(
        &deps.retry,
        || apply_loan_event(&deps.inventory, &event),
        InventoryApplicationError::is_transient,
    )
    .await;

    match result {
        Ok(CopyUpdate::Applied(copy)) => {
            tracing::info!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                event_type = %event.event_type,
                copy_id = %copy.copy_id,
                status = %copy.status,
                "Loan event applied"
            );
            Ok(ConsumeOutcome::Applied)
        }
        Ok(CopyUpdate::Unchanged(copy)) => {
            tracing::debug!(
                event_type = %event.event_type,
                copy_id = %copy.copy_id,
                status = %copy.status,
                "Copy already in target status, skipping"
            );
            Ok(ConsumeOutcome::Skipped)
        }
        Err(err) => {
            let kind = if err.is_transient() {
                FailureKind::RetriesExhausted
            } else {
                FailureKind::Unprocessable
            };
            dead_letter(deps, record, kind, &err.to_string()).await
        }
    }
}

/// 元のキー・パーティション・ペイロードのままデッドレタートピックに送る
async fn dead_letter(
    deps: &SubscriberDependencies,
    record: &ConsumerRecord,
    kind: FailureKind,
    reason: &str,
) -> Result<ConsumeOutcome, PortError> {
    let topic = dead_letter_topic(&record.topic);

    let mut outbound = OutboundRecord::new(&topic, &record.key, record.payload.clone())
        .with_partition(record.partition);
    outbound.headers = record.headers.clone();
    let outbound = outbound
        .with_header(HEADER_DLT_ORIGINAL_TOPIC, &record.topic)
        .with_header(HEADER_DLT_ORIGINAL_PARTITION, record.partition.to_string())
        .with_header(HEADER_DLT_ORIGINAL_OFFSET, record.offset.to_string())
        .with_header(HEADER_DLT_EXCEPTION_MESSAGE, reason)
        .with_header(HEADER_DLT_FAILURE_KIND, kind.as_str());

    retry_with_predicate(
        &deps.retry,
        || deps.dead_letters.publish(outbound.clone()),
        PortError::is_transient,
    )
    .await?;

    tracing::warn!(
        topic = %record.topic,
        dead_letter_topic = %topic,
        partition = record.partition,
        offset = record.offset,
        key = %record.key,
        failure = kind.as_str(),
        reason,
        "Loan event routed to dead-letter topic"
    );

    Ok(ConsumeOutcome::DeadLettered {
        topic,
        reason: reason.to_string(),
    })
}

/// 購読したトピックの各パーティションに1タスクずつ割り当てる
pub async fn spawn_consumers(
    deps: SubscriberDependencies,
    subscriber: &dyn EventSubscriber,
    topics: &[String],
    shutdown: watch::Receiver<bool>,
) -> Result<Vec<JoinHandle<()>>, PortError> {
    let mut handles = Vec::new();

    for topic in topics {
        for stream in subscriber.subscribe(topic).await? {
            tracing::info!(topic = %stream.topic, partition = stream.partition, "Starting loan event consumer");
            handles.push(tokio::spawn(consume_partition(
                deps.clone(),
                stream,
                shutdown.clone(),
            )));
        }
    }

    Ok(handles)
}

async fn consume_partition(
    deps: SubscriberDependencies,
    mut stream: PartitionStream,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            next = stream.records.next() => {
                let Some(record) = next else { break };
                if !settle_record(&deps, &record, &mut shutdown).await {
                    break;
                }
            }
        }
    }

    tracing::info!(topic = %stream.topic, partition = stream.partition, "Loan event consumer stopped");
}

/// レコードが適用されるかデッドレターに届くまで処理し直す
///
/// デッドレターへの発行に失敗している間はパーティションを先に進めない。
/// 停止要求を受けた場合はfalseを返す。
async fn settle_record(
    deps: &SubscriberDependencies,
    record: &ConsumerRecord,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let mut attempt = 0;

    loop {
        let err = match handle_record(deps, record).await {
            Ok(_) => return true,
            Err(err) => err,
        };

        let delay = deps.retry.delay_for_attempt(attempt);
        tracing::error!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Failed to dead-letter loan event, holding partition"
        );
        attempt += 1;

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => return false,
        }
    }
}
