//! 실시간 구독 키와 스트림 제어 메시지.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 구독 키 (symbol, interval).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionKey {
    pub symbol: String,
    pub interval: String,
}

impl SubscriptionKey {
    pub fn new(symbol: impl Into<String>, interval: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            interval: interval.into(),
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.symbol, self.interval)
    }
}

/// 스트림 제어 동작.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamAction {
    Subscribe,
    Unsubscribe,
    Pause,
    Resume,
}

/// 업스트림 스트림으로 보내는 제어 메시지.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamControl {
    pub action: StreamAction,
    pub symbol: String,
    pub interval: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl StreamControl {
    /// 구독 키에 대한 제어 메시지를 만듭니다.
    pub fn for_key(action: StreamAction, key: &SubscriptionKey) -> Self {
        Self {
            action,
            symbol: key.symbol.clone(),
            interval: key.interval.clone(),
            options: HashMap::new(),
        }
    }

    pub fn subscribe(key: &SubscriptionKey) -> Self {
        Self::for_key(StreamAction::Subscribe, key)
    }

    pub fn unsubscribe(key: &SubscriptionKey) -> Self {
        Self::for_key(StreamAction::Unsubscribe, key)
    }
}
