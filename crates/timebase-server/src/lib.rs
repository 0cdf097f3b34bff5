//! TimeBase 서비스.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - 실시간 구독 멀티플렉서와 브로드캐스터
//! - 프로바이더 헬스 모니터
//! - 헬스 체크, Prometheus 메트릭, WebSocket 게이트웨이
//!
//! # 모듈 구성
//!
//! - [`state`]: 애플리케이션 공유 상태 (AppState)
//! - [`streaming`]: 멀티플렉서, 브로드캐스터
//! - [`tasks`]: 백그라운드 태스크
//! - [`routes`]: HTTP 엔드포인트
//! - [`websocket`]: 실시간 WebSocket 게이트웨이
//! - [`metrics`]: Prometheus 메트릭 수집
//! - [`middleware`]: HTTP 미들웨어

pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod streaming;
pub mod tasks;
pub mod websocket;

#[cfg(test)]
mod test_support;

pub use metrics::setup_metrics_recorder;
pub use middleware::metrics_layer;
pub use routes::create_router;
pub use state::{AppState, Stores};
pub use streaming::{
    Broadcaster, ChannelSink, DeliveryError, ListenerId, MultiplexerConfig, MultiplexerSnapshot,
    PointSink, StreamMultiplexer,
};
pub use tasks::{start_health_monitor, HealthMonitor, ProviderHealth};
pub use websocket::{websocket_handler, ClientMessage, ServerMessage, Session, WsError};
