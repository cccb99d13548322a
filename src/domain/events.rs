use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::{EditionCopyId, LoanId, MemberId, loan::Loan};

/// 貸出イベントの種類
///
/// ペイロードには常に`eventType`として含まれる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanEventType {
    LoanCreated,
    LoanReturned,
    LoanMarkedLost,
}

impl LoanEventType {
    pub const ALL: [LoanEventType; 3] = [
        LoanEventType::LoanCreated,
        LoanEventType::LoanReturned,
        LoanEventType::LoanMarkedLost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanEventType::LoanCreated => "LOAN_CREATED",
            LoanEventType::LoanReturned => "LOAN_RETURNED",
            LoanEventType::LoanMarkedLost => "LOAN_MARKED_LOST",
        }
    }

    /// レコードヘッダーに載せる値
    pub fn header_value(&self) -> &'static str {
        match self {
            LoanEventType::LoanCreated => "loan-created",
            LoanEventType::LoanReturned => "loan-returned",
            LoanEventType::LoanMarkedLost => "loan-marked-lost",
        }
    }
}

impl fmt::Display for LoanEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event_type| event_type.as_str() == s)
            .ok_or_else(|| format!("Unknown event type: {}", s))
    }
}

/// イベントの文脈（どの貸出・会員・コピーに関するものか）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanEventContext {
    pub loan_id: LoanId,
    pub member_id: MemberId,
    pub edition_copy_id: EditionCopyId,
}

/// 貸出イベント - コミット済みの状態遷移1回につき1件
///
/// 配信はat-least-once。購読側は`edition_copy_id`と目標状態で冪等に処理する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanEvent {
    pub event_type: LoanEventType,
    pub context: LoanEventContext,
}

/// ペイロードのデコードエラー
///
/// いずれもリトライしても回復しないため、購読側はデッドレターに送る。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventDecodeError {
    #[error("Malformed loan event payload: {0}")]
    Malformed(String),

    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    #[error("Invalid loan event context: {0}")]
    InvalidContext(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLoanEvent {
    event_type: String,
    context: RawLoanEventContext,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLoanEventContext {
    loan_id: i64,
    member_id: i64,
    edition_copy_id: i64,
}

impl LoanEvent {
    /// 貸出の現在値からイベントを組み立てる
    pub fn for_loan(event_type: LoanEventType, loan: &Loan) -> Self {
        Self {
            event_type,
            context: LoanEventContext {
                loan_id: loan.loan_id,
                member_id: loan.borrower.member_id,
                edition_copy_id: loan.copy.edition_copy_id,
            },
        }
    }

    /// パーティションキー（同じコピーのイベントは同じパーティションに入る）
    pub fn partition_key(&self) -> String {
        self.context.edition_copy_id.to_string()
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// ペイロードをデコードする
    ///
    /// 構造の検証、種類の判定、IDの検証の順に行う。
    pub fn decode(payload: &[u8]) -> Result<Self, EventDecodeError> {
        let raw: RawLoanEvent = serde_json::from_slice(payload)
            .map_err(|e| EventDecodeError::Malformed(e.to_string()))?;

        let event_type = raw
            .event_type
            .parse::<LoanEventType>()
            .map_err(|_| EventDecodeError::UnknownEventType(raw.event_type.clone()))?;

        let invalid = |e: super::InvalidId| EventDecodeError::InvalidContext(e.to_string());
        let context = LoanEventContext {
            loan_id: LoanId::parse(raw.context.loan_id).map_err(invalid)?,
            member_id: MemberId::parse(raw.context.member_id).map_err(invalid)?,
            edition_copy_id: EditionCopyId::parse(raw.context.edition_copy_id).map_err(invalid)?,
        };

        Ok(Self {
            event_type,
            context,
        })
    }
}

/// トピックの割り当て方
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicRouting {
    /// すべての種類を1つのトピックに流す
    Single { topic: String },
    /// 種類ごとにトピックを分ける
    PerEventType {
        created: String,
        returned: String,
        lost: String,
    },
}

impl TopicRouting {
    pub fn single(topic: impl Into<String>) -> Self {
        TopicRouting::Single {
            topic: topic.into(),
        }
    }

    pub fn per_event_type() -> Self {
        TopicRouting::PerEventType {
            created: "loan-created".to_string(),
            returned: "loan-returned".to_string(),
            lost: "loan-lost".to_string(),
        }
    }

    pub fn topic_for(&self, event_type: LoanEventType) -> &str {
        match self {
            TopicRouting::Single { topic } => topic,
            TopicRouting::PerEventType {
                created,
                returned,
                lost,
            } => match event_type {
                LoanEventType::LoanCreated => created,
                LoanEventType::LoanReturned => returned,
                LoanEventType::LoanMarkedLost => lost,
            },
        }
    }

    /// 購読すべきトピックの一覧
    pub fn topics(&self) -> Vec<String> {
        match self {
            TopicRouting::Single { topic } => vec![topic.clone()],
            TopicRouting::PerEventType {
                created,
                returned,
                lost,
            } => vec![created.clone(), returned.clone(), lost.clone()],
        }
    }
}

impl Default for TopicRouting {
    fn default() -> Self {
        TopicRouting::single("loan-events")
    }
}

/// デッドレタートピック名
pub fn dead_letter_topic(topic: &str) -> String {
    format!("{topic}.DLT")
}
