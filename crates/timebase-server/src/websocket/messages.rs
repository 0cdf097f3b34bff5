//! WebSocket 메시지 타입.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use timebase_core::{Interval, SubscriptionKey, TimeSeriesPoint};

/// WebSocket 에러.
#[derive(Debug, Error)]
pub enum WsError {
    #[error("잘못된 메시지 형식: {0}")]
    InvalidMessage(String),
    #[error("잘못된 구독 요청: {0}")]
    InvalidSubscription(String),
    #[error("직렬화 실패: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl WsError {
    /// 클라이언트에 전달할 에러 코드.
    pub fn code(&self) -> &'static str {
        match self {
            WsError::InvalidMessage(_) => "INVALID_MESSAGE",
            WsError::InvalidSubscription(_) => "INVALID_SUBSCRIPTION",
            WsError::SerializationError(_) => "INTERNAL",
        }
    }
}

// ==================== 클라이언트 → 서버 메시지 ====================

/// 클라이언트에서 서버로 보내는 메시지.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// 실시간 포인트 구독
    Subscribe { symbol: String, interval: String },
    /// 구독 해제
    Unsubscribe { symbol: String, interval: String },
    /// 핑 (연결 유지)
    Ping,
}

impl ClientMessage {
    /// JSON 문자열에서 파싱.
    pub fn from_json(json: &str) -> Result<Self, WsError> {
        serde_json::from_str(json).map_err(|e| WsError::InvalidMessage(e.to_string()))
    }
}

/// 구독 요청을 정규화된 키로 변환합니다.
///
/// 심볼은 대문자로 맞추고, 인터벌은 알려진 값이어야 합니다.
pub fn subscription_key(symbol: &str, interval: &str) -> Result<SubscriptionKey, WsError> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(WsError::InvalidSubscription("빈 심볼".to_string()));
    }
    let interval: Interval = interval
        .parse()
        .map_err(|e: timebase_core::CoreError| WsError::InvalidSubscription(e.to_string()))?;
    Ok(SubscriptionKey::new(symbol.to_uppercase(), interval.as_str()))
}

// ==================== 서버 → 클라이언트 메시지 ====================

/// 서버에서 클라이언트로 보내는 메시지.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// 연결 직후 환영 메시지
    Welcome { version: String, timestamp: i64 },
    /// 실시간 포인트
    Point { data: TimeSeriesPoint },
    Subscribed { symbol: String, interval: String },
    Unsubscribed { symbol: String, interval: String },
    Pong { timestamp: i64 },
    Error { code: String, message: String },
}

impl ServerMessage {
    /// JSON 문자열로 직렬화.
    pub fn to_json(&self) -> Result<String, WsError> {
        serde_json::to_string(self).map_err(WsError::from)
    }

    /// 에러 메시지 생성 헬퍼.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn subscribed(key: &SubscriptionKey) -> Self {
        ServerMessage::Subscribed {
            symbol: key.symbol.clone(),
            interval: key.interval.clone(),
        }
    }

    pub fn unsubscribed(key: &SubscriptionKey) -> Self {
        ServerMessage::Unsubscribed {
            symbol: key.symbol.clone(),
            interval: key.interval.clone(),
        }
    }
}

impl From<&WsError> for ServerMessage {
    fn from(e: &WsError) -> Self {
        ServerMessage::error(e.code(), e.to_string())
    }
}
