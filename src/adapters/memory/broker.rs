use crate::ports::{
    ConsumerRecord, EventPublisher, EventSubscriber, OutboundRecord, PartitionStream, PortError,
    RecordMetadata, Result,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use tokio::sync::mpsc;

use super::lock;

/// パーティションごとに保持するレコード数の既定値
const DEFAULT_RETENTION: usize = 10_000;

#[derive(Default)]
struct Partition {
    log: VecDeque<ConsumerRecord>,
    next_offset: u64,
    subscribers: Vec<mpsc::UnboundedSender<ConsumerRecord>>,
}

#[derive(Default)]
struct State {
    topics: HashMap<String, Vec<Partition>>,
    failing_publishes: usize,
}

/// プロセス内のパーティション付きメッセージブローカー
///
/// - トピックは初回利用時に固定のパーティション数で作られる
/// - レコードはキーのハッシュでパーティションに振り分けられる
/// - パーティションごとに発行順で配信し、直近`retention`件のログを保持する
/// - 購読開始時は保持しているログの先頭から配信する
///
/// 永続化はしないため、プロセスの再起動で未配信のレコードは失われる。
/// 発行済みのエントリはアウトボックス側では再送されない点に注意。
pub struct InMemoryBroker {
    partitions: u32,
    retention: usize,
    state: Mutex<State>,
}

impl InMemoryBroker {
    pub fn new(partitions: u32) -> Self {
        Self::with_retention(partitions, DEFAULT_RETENTION)
    }

    /// パーティションごとの保持件数を指定する（古いものから捨てる）
    pub fn with_retention(partitions: u32, retention: usize) -> Self {
        Self {
            partitions: partitions.max(1),
            retention: retention.max(1),
            state: Mutex::new(State::default()),
        }
    }

    pub fn partitions(&self) -> u32 {
        self.partitions
    }

    /// キーからパーティションを決める
    pub fn partition_for(&self, key: &str) -> u32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % u64::from(self.partitions)) as u32
    }

    /// 次のn回の発行を失敗させる
    pub fn fail_next_publishes(&self, count: usize) {
        lock(&self.state).failing_publishes = count;
    }

    /// トピックに保持されているレコード（パーティション順、オフセット順）
    pub fn records(&self, topic: &str) -> Vec<ConsumerRecord> {
        lock(&self.state)
            .topics
            .get(topic)
            .map(|partitions| {
                partitions
                    .iter()
                    .flat_map(|partition| partition.log.iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn topic<'a>(&self, state: &'a mut State, topic: &str) -> &'a mut Vec<Partition> {
        let partitions = self.partitions;
        state.topics.entry(topic.to_string()).or_insert_with(|| {
            (0..partitions).map(|_| Partition::default()).collect()
        })
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(3)
    }
}

#[async_trait]
impl EventPublisher for InMemoryBroker {
    async fn publish(&self, record: OutboundRecord) -> Result<RecordMetadata> {
        let partition = match record.partition {
            Some(partition) if partition >= self.partitions => {
                return Err(PortError::InvalidArgument(format!(
                    "Partition {} does not exist (topic {} has {})",
                    partition, record.topic, self.partitions
                )));
            }
            Some(partition) => partition,
            None => self.partition_for(&record.key),
        };

        let mut state = lock(&self.state);
        if state.failing_publishes > 0 {
            state.failing_publishes -= 1;
            return Err(PortError::unavailable("injected broker failure"));
        }

        let retention = self.retention;
        let slot = &mut self.topic(&mut state, &record.topic)[partition as usize];
        let offset = slot.next_offset;
        slot.next_offset += 1;
        let delivered = ConsumerRecord {
            topic: record.topic,
            partition,
            offset,
            key: record.key,
            payload: record.payload,
            headers: record.headers,
        };

        slot.subscribers
            .retain(|subscriber| subscriber.send(delivered.clone()).is_ok());
        slot.log.push_back(delivered);
        while slot.log.len() > retention {
            slot.log.pop_front();
        }

        Ok(RecordMetadata { partition, offset })
    }
}

#[async_trait]
impl EventSubscriber for InMemoryBroker {
    async fn subscribe(&self, topic: &str) -> Result<Vec<PartitionStream>> {
        let mut state = lock(&self.state);
        let partitions = self.topic(&mut state, topic);

        let streams = partitions
            .iter_mut()
            .enumerate()
            .map(|(index, partition)| {
                let (sender, receiver) = mpsc::unbounded_channel();
                for record in &partition.log {
                    // 受信側はまだ生きているので送信は失敗しない
                    let _ = sender.send(record.clone());
                }
                partition.subscribers.push(sender);

                let records = futures::stream::unfold(receiver, |mut receiver| async move {
                    receiver.recv().await.map(|record| (record, receiver))
                })
                .boxed();

                PartitionStream {
                    topic: topic.to_string(),
                    partition: index as u32,
                    records,
                }
            })
            .collect();

        Ok(streams)
    }
}
