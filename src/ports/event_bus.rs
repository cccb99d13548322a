use async_trait::async_trait;
use futures::stream::BoxStream;

use super::Result;

/// 発行するレコード
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
    pub headers: Vec<(String, String)>,
    /// 明示的なパーティション（Noneの場合はキーのハッシュで決まる）
    pub partition: Option<u32>,
}

impl OutboundRecord {
    pub fn new(topic: impl Into<String>, key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
            payload,
            headers: Vec::new(),
            partition: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_partition(mut self, partition: u32) -> Self {
        self.partition = Some(partition);
        self
    }
}

/// 発行結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMetadata {
    pub partition: u32,
    pub offset: u64,
}

/// 購読側が受け取るレコード
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerRecord {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub key: String,
    pub payload: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl ConsumerRecord {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// 1パーティション分のレコードストリーム
pub struct PartitionStream {
    pub topic: String,
    pub partition: u32,
    pub records: BoxStream<'static, ConsumerRecord>,
}

/// イベント発行ポート
///
/// 同じキーのレコードは同じパーティションに入り、発行順に配信される。
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, record: OutboundRecord) -> Result<RecordMetadata>;
}

/// イベント購読ポート
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// トピックの全パーティションを購読する
    ///
    /// 配信はat-least-once。ストリームはパーティションごとに独立している。
    async fn subscribe(&self, topic: &str) -> Result<Vec<PartitionStream>>;
}
