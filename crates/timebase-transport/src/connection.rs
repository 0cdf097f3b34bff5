//! 프로바이더 WebSocket 연결.
//!
//! 하나의 연결 위에서 여러 호출을 `id`로 다중화합니다.
//! 송신은 unbounded 큐를 거쳐 writer 태스크가 처리하므로,
//! 느린 소켓 쓰기가 호출자나 취소 경로를 막지 않습니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{TransportError, TransportResult};
use crate::protocol::{ClientMessage, Envelope, ProviderMessage};

type RouteSender = mpsc::UnboundedSender<TransportResult<ProviderMessage>>;
type Routes = Arc<Mutex<HashMap<u64, RouteSender>>>;

fn lock_routes(routes: &Routes) -> MutexGuard<'_, HashMap<u64, RouteSender>> {
    routes.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 열린 프로바이더 연결.
pub struct ProviderConnection {
    endpoint: String,
    outbound: mpsc::UnboundedSender<Message>,
    routes: Routes,
    next_id: AtomicU64,
    closed: CancellationToken,
}

impl ProviderConnection {
    /// 엔드포인트에 연결하고 reader/writer 태스크를 시작합니다.
    ///
    /// 연결 실패와 타임아웃은 모두 `Unavailable`입니다.
    pub async fn connect(endpoint: &str, timeout: Duration) -> TransportResult<Arc<Self>> {
        debug!(endpoint = %endpoint, "프로바이더 연결 시도");

        let (ws, _) = tokio::time::timeout(timeout, connect_async(endpoint))
            .await
            .map_err(|_| TransportError::Unavailable(format!("connect timeout: {}", endpoint)))?
            .map_err(|e| TransportError::Unavailable(format!("{}: {}", endpoint, e)))?;

        let (mut sink, mut stream) = ws.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let closed = CancellationToken::new();

        // writer
        let writer_closed = closed.clone();
        let writer_endpoint = endpoint.to_string();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_closed.cancelled() => break,
                    msg = outbound_rx.recv() => match msg {
                        Some(msg) => {
                            if let Err(e) = sink.send(msg).await {
                                warn!(endpoint = %writer_endpoint, error = %e, "프레임 전송 실패");
                                writer_closed.cancel();
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            let _ = sink.close().await;
        });

        // reader
        let reader_closed = closed.clone();
        let reader_routes = Arc::clone(&routes);
        let reader_endpoint = endpoint.to_string();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = reader_closed.cancelled() => break,
                    frame = stream.next() => frame,
                };
                match frame {
                    Some(Ok(Message::Text(text))) => dispatch(&reader_routes, &text),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(endpoint = %reader_endpoint, error = %e, "프레임 수신 실패");
                        break;
                    }
                }
            }

            reader_closed.cancel();
            let pending: Vec<RouteSender> =
                lock_routes(&reader_routes).drain().map(|(_, tx)| tx).collect();
            for tx in pending {
                let _ = tx.send(Err(TransportError::Unavailable(
                    "connection closed".to_string(),
                )));
            }
            info!(endpoint = %reader_endpoint, "프로바이더 연결 종료");
        });

        info!(endpoint = %endpoint, "프로바이더 연결됨");

        Ok(Arc::new(Self {
            endpoint: endpoint.to_string(),
            outbound,
            routes,
            next_id: AtomicU64::new(1),
            closed,
        }))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 연결이 닫혔는지 확인.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// 연결을 닫습니다.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// 새 호출을 엽니다. 응답은 반환된 `Call`로만 라우팅됩니다.
    pub fn open_call(self: &Arc<Self>) -> TransportResult<Call> {
        if self.is_closed() {
            return Err(TransportError::Unavailable(format!(
                "connection closed: {}",
                self.endpoint
            )));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        lock_routes(&self.routes).insert(id, tx);

        Ok(Call {
            id,
            rx,
            conn: Arc::clone(self),
        })
    }

    fn send_frame(&self, id: u64, message: &ClientMessage) -> TransportResult<()> {
        let text = serde_json::to_string(&Envelope { id, message })?;
        self.outbound
            .send(Message::Text(text))
            .map_err(|_| TransportError::Unavailable("connection closed".to_string()))
    }
}

impl Drop for ProviderConnection {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

fn dispatch(routes: &Routes, text: &str) {
    let raw: Envelope<serde_json::Value> = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "envelope 파싱 실패, 프레임 무시");
            return;
        }
    };

    let message = serde_json::from_value::<ProviderMessage>(raw.message)
        .map_err(|e| TransportError::Protocol(format!("undecodable message: {}", e)));

    match lock_routes(routes).get(&raw.id) {
        Some(tx) => {
            let _ = tx.send(message);
        }
        None => debug!(call_id = raw.id, "라우트 없는 프레임 무시"),
    }
}

/// 진행 중인 호출.
///
/// drop 시 라우트가 제거되어 이후 도착하는 프레임은 버려집니다.
pub struct Call {
    id: u64,
    rx: mpsc::UnboundedReceiver<TransportResult<ProviderMessage>>,
    conn: Arc<ProviderConnection>,
}

impl Call {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 이 호출의 ID로 메시지를 보냅니다.
    pub fn send(&self, message: &ClientMessage) -> TransportResult<()> {
        self.conn.send_frame(self.id, message)
    }

    /// 다른 태스크에서 송신할 수 있는 핸들.
    pub fn sender(&self) -> CallSender {
        CallSender {
            id: self.id,
            conn: Arc::clone(&self.conn),
        }
    }

    /// 다음 메시지를 받습니다.
    ///
    /// 에러 프레임은 `Err`로 변환되고, 연결 종료는 `Unavailable`입니다.
    pub async fn recv(&mut self) -> TransportResult<ProviderMessage> {
        let next = tokio::select! {
            biased;
            next = self.rx.recv() => next,
            _ = self.conn.closed.cancelled() => None,
        };
        match next {
            Some(Ok(ProviderMessage::Error { code, message })) => {
                Err(TransportError::from_remote(code, message))
            }
            Some(result) => result,
            None => Err(TransportError::Unavailable(format!(
                "connection closed: {}",
                self.conn.endpoint
            ))),
        }
    }
}

impl Drop for Call {
    fn drop(&mut self) {
        lock_routes(&self.conn.routes).remove(&self.id);
    }
}

/// 호출의 송신 전용 핸들.
#[derive(Clone)]
pub struct CallSender {
    id: u64,
    conn: Arc<ProviderConnection>,
}

impl CallSender {
    pub fn send(&self, message: &ClientMessage) -> TransportResult<()> {
        self.conn.send_frame(self.id, message)
    }
}
