//! 실시간 스트리밍.
//!
//! - [`multiplexer`]: 다운스트림 구독을 프로바이더별 업스트림 스트림 하나로 묶음
//! - [`broadcaster`]: 업스트림 포인트를 심볼별 리스너에 전달

pub mod broadcaster;
pub mod multiplexer;

pub use broadcaster::{Broadcaster, ChannelSink, DeliveryError, ListenerId, PointSink};
pub use multiplexer::{MultiplexerConfig, MultiplexerSnapshot, StreamMultiplexer};
