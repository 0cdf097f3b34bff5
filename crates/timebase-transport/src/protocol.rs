//! 프로바이더 와이어 프로토콜.
//!
//! WebSocket 텍스트 프레임에 JSON envelope를 실어 보냅니다.
//! 하나의 연결 위에서 여러 호출이 `id`로 다중화됩니다.
//!
//! ```text
//! client → provider  {"id": 7, "message": {"type": "get_capabilities"}}
//! provider → client  {"id": 7, "message": {"type": "capabilities", "name": ..., ...}}
//!
//! client → provider  {"id": 8, "message": {"type": "get_historical_data", "symbol": "AAPL", ...}}
//! provider → client  {"id": 8, "message": {"type": "data", "point": {...}}}   (0..n회)
//! provider → client  {"id": 8, "message": {"type": "end"}}
//!
//! client → provider  {"id": 9, "message": {"type": "stream_open"}}
//! client → provider  {"id": 9, "message": {"type": "stream_control", "action": "SUBSCRIBE", ...}}
//! provider → client  {"id": 9, "message": {"type": "data", "point": {...}}}   (계속)
//! client → provider  {"id": 9, "message": {"type": "stream_close"}}          (송신 방향 종료)
//! client → provider  {"id": 9, "message": {"type": "cancel"}}                (양방향 종료)
//! ```
//!
//! 에러는 `{"type": "error", "code": ..., "message": ...}`이며,
//! 코드 `UNAVAILABLE`은 소프트 실패로 취급됩니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use timebase_core::{CapabilityDescriptor, HealthReport, StreamControl, SymbolInfo, TimeSeriesPoint};

/// 호출 ID와 메시지를 묶는 envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<M> {
    pub id: u64,
    pub message: M,
}

/// 클라이언트 → 프로바이더 메시지.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    GetCapabilities,
    GetHistoricalData(HistoricalRequest),
    HealthCheck,
    GetSymbols,
    StreamOpen,
    StreamControl(StreamControl),
    /// 송신 방향만 닫음. 프로바이더는 수신 방향을 계속 보낼 수 있음
    StreamClose,
    /// 호출 취소
    Cancel,
}

/// 과거 데이터 요청.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRequest {
    pub symbol: String,
    pub interval: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl HistoricalRequest {
    pub fn new(
        symbol: impl Into<String>,
        interval: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            interval: interval.into(),
            start_time,
            end_time,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// 프로바이더 → 클라이언트 메시지.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderMessage {
    Capabilities(CapabilityDescriptor),
    Data { point: WirePoint },
    Symbols { symbols: Vec<SymbolInfo> },
    Health(HealthReport),
    End,
    Error { code: String, message: String },
}

impl ProviderMessage {
    /// 로그용 메시지 타입 이름.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderMessage::Capabilities(_) => "capabilities",
            ProviderMessage::Data { .. } => "data",
            ProviderMessage::Symbols { .. } => "symbols",
            ProviderMessage::Health(_) => "health",
            ProviderMessage::End => "end",
            ProviderMessage::Error { .. } => "error",
        }
    }
}

/// 프로바이더가 보내는 OHLCV 포인트.
///
/// 프로바이더는 자신의 slug만 알고 카탈로그 ID는 모르므로,
/// 수신 측에서 `into_point`로 프로바이더 ID를 채웁니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WirePoint {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub interval: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl WirePoint {
    pub fn into_point(self, provider_id: Uuid) -> TimeSeriesPoint {
        TimeSeriesPoint {
            timestamp: self.timestamp,
            symbol: self.symbol,
            provider_id,
            interval: self.interval,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            metadata: self.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timebase_core::{StreamAction, SubscriptionKey};

    #[test]
    fn test_client_message_wire_format() {
        let envelope = Envelope {
            id: 3,
            message: ClientMessage::GetCapabilities,
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["message"]["type"], "get_capabilities");

        let control = ClientMessage::StreamControl(StreamControl::subscribe(&SubscriptionKey::new(
            "AAPL", "1m",
        )));
        let json = serde_json::to_value(&control).unwrap();
        assert_eq!(json["type"], "stream_control");
        assert_eq!(json["action"], "SUBSCRIBE");
    }

    #[test]
    fn test_provider_message_parse() {
        let data: Envelope<ProviderMessage> = serde_json::from_str(
            r#"{"id": 8, "message": {"type": "data", "point": {
                "symbol": "AAPL", "timestamp": "2024-01-02T00:00:00Z",
                "open": 185.0, "high": 186.1, "low": 183.9, "close": 185.6,
                "volume": 1000000, "interval": "1d", "provider": "yahoo-finance"
            }}}"#,
        )
        .unwrap();
        assert_eq!(data.id, 8);
        match data.message {
            ProviderMessage::Data { point } => {
                let provider_id = Uuid::new_v4();
                let point = point.into_point(provider_id);
                assert_eq!(point.provider_id, provider_id);
                assert_eq!(point.volume, 1_000_000.0);
            }
            other => panic!("unexpected message: {:?}", other),
        }

        let error: ProviderMessage =
            serde_json::from_str(r#"{"type": "error", "code": "UNAVAILABLE", "message": "down"}"#)
                .unwrap();
        assert!(matches!(error, ProviderMessage::Error { .. }));
    }

    #[test]
    fn test_stream_control_roundtrip_action() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type": "stream_control", "action": "RESUME", "symbol": "X", "interval": "1m"}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::StreamControl(control) => assert_eq!(control.action, StreamAction::Resume),
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
