//! 프로바이더 전송 계층.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - 프로바이더 와이어 프로토콜 (WebSocket 위의 JSON envelope)
//! - 엔드포인트별 연결 풀 (연결 재사용, 닫힌 연결 교체)
//! - `ProviderTransport` trait: capability, 과거 데이터, 헬스, 심볼, 실시간 스트림
//! - `ProviderClient`: WebSocket 기반 구현

pub mod client;
pub mod connection;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod traits;

pub use client::ProviderClient;
pub use connection::{Call, CallSender, ProviderConnection};
pub use error::*;
pub use pool::ConnectionPool;
pub use protocol::{ClientMessage, Envelope, HistoricalRequest, ProviderMessage, WirePoint};
pub use traits::*;
