//! 실시간 포인트 WebSocket 게이트웨이.
//!
//! # 메시지 형식
//!
//! 모든 메시지는 JSON 형식으로 교환됩니다.
//!
//! ## 클라이언트 → 서버
//!
//! ```json
//! {"type": "subscribe", "symbol": "AAPL", "interval": "1m"}
//! {"type": "unsubscribe", "symbol": "AAPL", "interval": "1m"}
//! {"type": "ping"}
//! ```
//!
//! ## 서버 → 클라이언트
//!
//! ```json
//! {"type": "point", "data": {...}}
//! {"type": "subscribed", "symbol": "AAPL", "interval": "1m"}
//! {"type": "pong", "timestamp": 1714555800000}
//! ```

pub mod handler;
pub mod messages;

pub use handler::{websocket_handler, Session};
pub use messages::{subscription_key, ClientMessage, ServerMessage, WsError};
