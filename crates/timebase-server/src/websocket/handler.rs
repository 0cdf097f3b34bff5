//! WebSocket 연결 handler.
//!
//! 세션마다 (symbol, interval) 구독 집합을 유지하고, 구독/해제를 멀티플렉서에 전달합니다.
//! 포인트는 심볼 단위 브로드캐스터 리스너로 받아 세션이 구독한 인터벌만 전송합니다.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use timebase_core::{SubscriptionKey, TimeSeriesPoint};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::messages::{subscription_key, ClientMessage, ServerMessage, WsError};
use crate::metrics::{
    decrement_websocket_connections, increment_websocket_connections, record_websocket_points,
};
use crate::state::AppState;
use crate::streaming::{Broadcaster, ChannelSink, ListenerId, StreamMultiplexer};

/// WebSocket 업그레이드 핸들러.
///
/// # 엔드포인트
///
/// `GET /ws`
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// 세션 구독 상태.
///
/// 세션이 끝나면(drop) 남은 구독을 모두 해제합니다.
pub struct Session {
    id: Uuid,
    multiplexer: Arc<StreamMultiplexer>,
    broadcaster: Arc<Broadcaster>,
    keys: HashSet<SubscriptionKey>,
    /// 심볼별 브로드캐스터 리스너
    listeners: HashMap<String, ListenerId>,
    sink: ChannelSink,
}

impl Session {
    /// 세션과 포인트 수신 채널을 생성합니다.
    pub fn new(
        multiplexer: Arc<StreamMultiplexer>,
        broadcaster: Arc<Broadcaster>,
    ) -> (Self, mpsc::UnboundedReceiver<TimeSeriesPoint>) {
        let (sink, points) = ChannelSink::channel();
        let session = Self {
            id: Uuid::new_v4(),
            multiplexer,
            broadcaster,
            keys: HashSet::new(),
            listeners: HashMap::new(),
            sink,
        };
        (session, points)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn subscriptions(&self) -> &HashSet<SubscriptionKey> {
        &self.keys
    }

    /// 클라이언트 메시지를 처리하고 응답을 반환합니다.
    pub fn handle_message(&mut self, msg: ClientMessage) -> ServerMessage {
        let result = match msg {
            ClientMessage::Subscribe { symbol, interval } => self.subscribe(&symbol, &interval),
            ClientMessage::Unsubscribe { symbol, interval } => {
                self.unsubscribe(&symbol, &interval)
            }
            ClientMessage::Ping => Ok(ServerMessage::Pong {
                timestamp: Utc::now().timestamp_millis(),
            }),
        };
        result.unwrap_or_else(|e| {
            warn!(session_id = %self.id, error = %e, "잘못된 구독 요청");
            ServerMessage::from(&e)
        })
    }

    /// 세션이 구독한 키의 포인트인지 확인합니다.
    pub fn wants(&self, point: &TimeSeriesPoint) -> bool {
        self.keys.contains(&SubscriptionKey::new(
            point.symbol.to_uppercase(),
            point.interval.as_str(),
        ))
    }

    fn subscribe(&mut self, symbol: &str, interval: &str) -> Result<ServerMessage, WsError> {
        let key = subscription_key(symbol, interval)?;

        if self.keys.insert(key.clone()) {
            if !self.listeners.contains_key(&key.symbol) {
                let id = self
                    .broadcaster
                    .register(&key.symbol, Arc::new(self.sink.clone()));
                self.listeners.insert(key.symbol.clone(), id);
            }
            self.multiplexer.subscribe(&key.symbol, &key.interval);
            debug!(session_id = %self.id, key = %key, "구독");
        }

        Ok(ServerMessage::subscribed(&key))
    }

    fn unsubscribe(&mut self, symbol: &str, interval: &str) -> Result<ServerMessage, WsError> {
        let key = subscription_key(symbol, interval)?;

        if self.keys.remove(&key) {
            self.multiplexer.unsubscribe(&key.symbol, &key.interval);
            self.release_listener(&key.symbol);
            debug!(session_id = %self.id, key = %key, "구독 해제");
        }

        Ok(ServerMessage::unsubscribed(&key))
    }

    /// 심볼의 마지막 키가 해제되면 리스너를 해제합니다.
    fn release_listener(&mut self, symbol: &str) {
        if self.keys.iter().any(|k| k.symbol == symbol) {
            return;
        }
        if let Some(id) = self.listeners.remove(symbol) {
            self.broadcaster.unregister(id);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for key in self.keys.drain() {
            self.multiplexer.unsubscribe(&key.symbol, &key.interval);
        }
        for (_, id) in self.listeners.drain() {
            self.broadcaster.unregister(id);
        }
    }
}

async fn send_message<S>(sender: &mut S, msg: &ServerMessage) -> bool
where
    S: futures::Sink<Message> + Unpin,
{
    match msg.to_json() {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "메시지 직렬화 실패");
            true
        }
    }
}

/// WebSocket 연결 처리.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut session, mut points) =
        Session::new(state.multiplexer.clone(), state.broadcaster.clone());
    let session_id = session.id();
    info!(session_id = %session_id, "WebSocket connected");
    increment_websocket_connections();

    let (mut sender, mut receiver) = socket.split();

    let welcome = ServerMessage::Welcome {
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().timestamp_millis(),
    };
    let mut open = send_message(&mut sender, &welcome).await;

    while open {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let reply = match ClientMessage::from_json(&text) {
                        Ok(msg) => session.handle_message(msg),
                        Err(e) => {
                            warn!(session_id = %session_id, error = %e, "잘못된 메시지");
                            ServerMessage::from(&e)
                        }
                    };
                    open = send_message(&mut sender, &reply).await;
                }
                Some(Ok(Message::Binary(_))) => {
                    let reply = ServerMessage::error("INVALID_MESSAGE", "binary frames are not supported");
                    open = send_message(&mut sender, &reply).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(session_id = %session_id, "Close message received");
                    open = false;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(session_id = %session_id, error = %e, "WebSocket receive error");
                    open = false;
                }
            },
            Some(point) = points.recv() => {
                if session.wants(&point) {
                    open = send_message(&mut sender, &ServerMessage::Point { data: point }).await;
                    record_websocket_points(1);
                }
            }
        }
    }

    let subscriptions = session.subscriptions().len();
    drop(session);
    decrement_websocket_connections();

    info!(session_id = %session_id, subscriptions, "WebSocket disconnected");
}
