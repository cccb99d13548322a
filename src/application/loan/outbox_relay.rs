use crate::application::copy::subscriber::HEADER_EVENT_TYPE;
use crate::domain::{CopyOperation, LoanEvent, TopicRouting};
use crate::ports::{
    CatalogClient, EventPublisher, LoanOutbox, OutboundRecord, OutboxEntry, PortError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};

/// 1回の読み出しで扱うエントリ数
const DEFAULT_BATCH_SIZE: usize = 100;

/// アウトボックスのエントリの届け先
pub enum RelayTarget {
    /// 貸出イベントとしてブローカーに発行する
    Events {
        publisher: Arc<dyn EventPublisher>,
        routing: TopicRouting,
    },
    /// 在庫サービスのコマンドを直接呼ぶ
    Commands {
        catalog: Arc<dyn CatalogClient>,
        timeout: Duration,
    },
}

/// アウトボックスリレー
///
/// コミット済みのアウトボックスエントリを書き込み順に届け、発行済みにする。
/// 一時的な失敗の時点で止まり、残りは次回のフラッシュで再送する。
/// 同じコピーのイベントが先行イベントを追い越すことはない。
pub struct OutboxRelay {
    outbox: Arc<dyn LoanOutbox>,
    target: RelayTarget,
    batch_size: usize,
    flush_lock: Mutex<()>,
}

impl OutboxRelay {
    /// イベントを発行するリレー
    pub fn new(
        outbox: Arc<dyn LoanOutbox>,
        publisher: Arc<dyn EventPublisher>,
        routing: TopicRouting,
    ) -> Self {
        Self::with_target(outbox, RelayTarget::Events { publisher, routing })
    }

    /// 在庫サービスのコマンドを呼ぶリレー
    pub fn commands(
        outbox: Arc<dyn LoanOutbox>,
        catalog: Arc<dyn CatalogClient>,
        timeout: Duration,
    ) -> Self {
        Self::with_target(outbox, RelayTarget::Commands { catalog, timeout })
    }

    pub fn with_target(outbox: Arc<dyn LoanOutbox>, target: RelayTarget) -> Self {
        Self {
            outbox,
            target,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_lock: Mutex::new(()),
        }
    }

    fn to_record(routing: &TopicRouting, event: &LoanEvent) -> Result<OutboundRecord, PortError> {
        let payload = event.encode().map_err(PortError::unavailable)?;
        let topic = routing.topic_for(event.event_type);

        Ok(OutboundRecord::new(topic, event.partition_key(), payload)
            .with_header(HEADER_EVENT_TYPE, event.event_type.header_value()))
    }

    /// エントリを1件届ける
    ///
    /// Errを返すのは再試行で回復しうる失敗のみ。
    async fn deliver(&self, entry: &OutboxEntry) -> Result<(), PortError> {
        match &self.target {
            RelayTarget::Events { publisher, routing } => {
                let record = Self::to_record(routing, &entry.event)?;
                publisher.publish(record).await.map(|_| ())
            }
            RelayTarget::Commands { catalog, timeout } => {
                send_command(catalog.as_ref(), *timeout, &entry.event).await
            }
        }
    }

    /// 未発行のエントリをすべて届ける
    ///
    /// 戻り値は届けた件数。同時に呼ばれた場合は直列化される。
    pub async fn flush(&self) -> Result<usize, PortError> {
        let _guard = self.flush_lock.lock().await;
        let mut total = 0;

        loop {
            let entries = self.outbox.pending(self.batch_size).await?;
            if entries.is_empty() {
                break;
            }

            let mut published = Vec::with_capacity(entries.len());
            for entry in &entries {
                if let Err(err) = self.deliver(entry).await {
                    tracing::warn!(
                        outbox_id = entry.id,
                        event_type = %entry.event.event_type,
                        loan_id = %entry.event.context.loan_id,
                        error = %err,
                        "Failed to relay loan event, will retry"
                    );
                    self.outbox.mark_published(&published).await?;
                    return Err(err);
                }

                published.push(entry.id);
            }

            self.outbox.mark_published(&published).await?;
            total += published.len();

            if entries.len() < self.batch_size {
                break;
            }
        }

        if total > 0 {
            tracing::debug!(relayed = total, "Outbox flushed");
        }

        Ok(total)
    }

    /// 定期的にフラッシュする（shutdownがtrueになるまで）
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.flush().await {
                        tracing::warn!(error = %err, "Outbox relay flush failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Outbox relay stopped");
    }
}

/// イベントに対応するコピーのコマンドを呼ぶ
///
/// タイムアウトと一時的な障害はErrを返して再送を待つ。
/// 拒否（Conflict等）は再送しても通らないため、コピーが既に目的の状態なら
/// 適用済みとして扱い、そうでなければログに残して先に進む。
async fn send_command(
    catalog: &dyn CatalogClient,
    timeout: Duration,
    event: &LoanEvent,
) -> Result<(), PortError> {
    let copy_id = event.context.edition_copy_id;
    let operation = CopyOperation::for_event(event.event_type);

    let call = async {
        match operation {
            CopyOperation::MarkBorrowed => catalog.borrow_copy(copy_id).await,
            CopyOperation::MarkAvailable => catalog.return_copy(copy_id).await,
            CopyOperation::MarkLost => catalog.mark_copy_lost(copy_id).await,
        }
    };

    let rejection = match tokio::time::timeout(timeout, call).await {
        Ok(Ok(_)) => return Ok(()),
        Ok(Err(err)) if err.is_transient() => return Err(err),
        Err(_) => return Err(PortError::Timeout),
        Ok(Err(err)) => err,
    };

    // 前回タイムアウトした呼び出しが実は適用されていた場合
    let current = tokio::time::timeout(timeout, catalog.get_copy(copy_id)).await;
    match current {
        Ok(Ok(copy)) if copy.status == operation.target_status() => {
            tracing::debug!(copy_id = %copy_id, status = %copy.status, "Copy command already applied");
            Ok(())
        }
        Ok(Err(err)) if err.is_transient() => Err(err),
        Err(_) => Err(PortError::Timeout),
        _ => {
            tracing::error!(
                loan_id = %event.context.loan_id,
                copy_id = %copy_id,
                event_type = %event.event_type,
                error = %rejection,
                "Copy command rejected, entry will not be retried"
            );
            Ok(())
        }
    }
}
