//! 環境変数からの設定読み込み

use crate::application::loan::LoanPolicy;
use crate::application::retry::RetryPolicy;
use crate::domain::TopicRouting;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Incompatible(String),
}

/// コピー状態の伝播方法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationMode {
    Events,
    Direct,
}

impl FromStr for PropagationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "events" => Ok(PropagationMode::Events),
            "direct" => Ok(PropagationMode::Direct),
            _ => Err("expected `events` or `direct`".to_string()),
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// 未設定の場合はインメモリのストアで動く
    pub database_url: Option<String>,
    pub port: u16,
    pub database_max_connections: u32,
    pub loan_policy: LoanPolicy,
    pub book_service_url: Option<String>,
    pub member_service_url: Option<String>,
    pub propagation: PropagationMode,
    pub topic_routing: TopicRouting,
    pub event_partitions: u32,
    /// プロセス内ブローカーがパーティションごとに保持するレコード数
    pub event_log_retention: usize,
    pub outbox_poll_interval: Duration,
    pub consumer_retry: RetryPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意の取得関数から読み込む
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars { lookup: &lookup };

        let loan_period_days: i64 = vars.parse("LOAN_PERIOD_DAYS", 14)?;
        if loan_period_days <= 0 {
            return Err(ConfigError::Invalid {
                name: "LOAN_PERIOD_DAYS",
                value: loan_period_days.to_string(),
                reason: "must be a positive number of days".to_string(),
            });
        }

        let event_partitions: u32 = vars.parse("EVENT_PARTITIONS", 3)?;
        if event_partitions == 0 {
            return Err(ConfigError::Invalid {
                name: "EVENT_PARTITIONS",
                value: "0".to_string(),
                reason: "at least one partition is required".to_string(),
            });
        }

        let event_log_retention: usize = vars.parse("EVENT_LOG_RETENTION", 10_000)?;
        if event_log_retention == 0 {
            return Err(ConfigError::Invalid {
                name: "EVENT_LOG_RETENTION",
                value: "0".to_string(),
                reason: "at least one record must be retained".to_string(),
            });
        }

        let topic_routing = match vars.get("LOAN_EVENT_TOPIC_MODE").as_deref() {
            None | Some("single") => {
                TopicRouting::single(vars.get("LOAN_EVENT_TOPIC").unwrap_or_else(|| "loan-events".into()))
            }
            Some("per-type") => TopicRouting::per_event_type(),
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOAN_EVENT_TOPIC_MODE",
                    value: other.to_string(),
                    reason: "expected `single` or `per-type`".to_string(),
                });
            }
        };

        let config = Self {
            database_url: vars.get("DATABASE_URL"),
            port: vars.parse("PORT", 3000)?,
            database_max_connections: vars.parse("DATABASE_MAX_CONNECTIONS", 5)?,
            loan_policy: LoanPolicy {
                loan_period_days,
                renewal_limit: vars.parse("RENEWAL_LIMIT", 3)?,
                lost_requires_overdue: vars.parse("LOAN_LOST_REQUIRES_OVERDUE", false)?,
                remote_call_timeout: Duration::from_millis(vars.parse("REMOTE_CALL_TIMEOUT_MS", 2000)?),
            },
            book_service_url: vars.get("BOOK_SERVICE_URL"),
            member_service_url: vars.get("MEMBER_SERVICE_URL"),
            propagation: vars.parse("COPY_STATUS_PROPAGATION", PropagationMode::Events)?,
            topic_routing,
            event_partitions,
            event_log_retention,
            outbox_poll_interval: Duration::from_millis(vars.parse("OUTBOX_POLL_INTERVAL_MS", 1000)?),
            consumer_retry: RetryPolicy::new(
                vars.parse("CONSUMER_MAX_RETRIES", 3)?,
                Duration::from_millis(vars.parse("CONSUMER_RETRY_INITIAL_DELAY_MS", 100)?),
            ),
        };

        // 同梱のブローカーはプロセス内のため、在庫サービスが別プロセスだと購読側に届かない
        if config.propagation == PropagationMode::Events && config.book_service_url.is_some() {
            return Err(ConfigError::Incompatible(
                "COPY_STATUS_PROPAGATION=events requires the in-process inventory service; \
                 unset BOOK_SERVICE_URL or use COPY_STATUS_PROPAGATION=direct"
                    .to_string(),
            ));
        }

        Ok(config)
    }
}

struct Vars<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Vars<'_> {
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|value| !value.trim().is_empty())
    }

    fn parse<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            None => Ok(default),
            Some(value) => {
                let parsed = value.trim().parse::<T>();
                parsed.map_err(|e| ConfigError::Invalid {
                    name,
                    reason: e.to_string(),
                    value,
                })
            }
        }
    }
}
