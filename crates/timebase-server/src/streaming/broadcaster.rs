//! 실시간 포인트 브로드캐스터.
//!
//! 업스트림에서 받은 포인트를 심볼별로 등록된 다운스트림 리스너에 전달합니다.
//! 심볼 매칭은 대소문자를 구분하지 않습니다.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use timebase_core::TimeSeriesPoint;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// 리스너 식별자.
pub type ListenerId = u64;

/// 전달 실패.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// 리스너가 닫힘 (등록 해제 대상)
    #[error("listener closed")]
    Closed,

    #[error("delivery failed: {0}")]
    Failed(String),
}

/// 다운스트림 리스너.
pub trait PointSink: Send + Sync {
    fn deliver(&self, point: &TimeSeriesPoint) -> Result<(), DeliveryError>;

    /// 닫힌 리스너는 다음 발행 시 정리됩니다.
    fn is_closed(&self) -> bool {
        false
    }
}

/// 채널 기반 리스너 (WebSocket 세션용).
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TimeSeriesPoint>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<TimeSeriesPoint>) -> Self {
        Self { tx }
    }

    /// 리스너와 수신 채널을 함께 생성합니다.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TimeSeriesPoint>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl PointSink for ChannelSink {
    fn deliver(&self, point: &TimeSeriesPoint) -> Result<(), DeliveryError> {
        self.tx
            .send(point.clone())
            .map_err(|_| DeliveryError::Closed)
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

struct Listener {
    id: ListenerId,
    sink: Arc<dyn PointSink>,
}

/// 심볼별 리스너 레지스트리.
#[derive(Default)]
pub struct Broadcaster {
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
    next_id: AtomicU64,
}

fn symbol_key(symbol: &str) -> String {
    symbol.to_uppercase()
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// 심볼에 리스너를 등록합니다.
    pub fn register(&self, symbol: &str, sink: Arc<dyn PointSink>) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(symbol_key(symbol))
            .or_default()
            .push(Listener { id, sink });
        debug!(symbol, listener_id = id, "리스너 등록");
        id
    }

    /// 리스너를 해제합니다. 등록되어 있었으면 `true`.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = false;
        listeners.retain(|_, group| {
            let before = group.len();
            group.retain(|listener| listener.id != id);
            removed |= group.len() != before;
            !group.is_empty()
        });
        removed
    }

    /// 심볼에 등록된 리스너 수.
    pub fn listener_count(&self, symbol: &str) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&symbol_key(symbol))
            .map_or(0, Vec::len)
    }

    /// 포인트를 해당 심볼의 모든 리스너에 전달합니다.
    ///
    /// 한 리스너의 실패나 패닉은 기록 후 건너뜁니다. 전달된 리스너 수를 반환합니다.
    pub fn publish_one(&self, point: &TimeSeriesPoint) -> usize {
        let key = symbol_key(&point.symbol);
        let targets: Vec<(ListenerId, Arc<dyn PointSink>)> = {
            let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
            match listeners.get(&key) {
                Some(group) => group
                    .iter()
                    .map(|listener| (listener.id, Arc::clone(&listener.sink)))
                    .collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, sink) in targets {
            if sink.is_closed() {
                closed.push(id);
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| sink.deliver(point))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(DeliveryError::Closed)) => closed.push(id),
                Ok(Err(e)) => {
                    warn!(symbol = %key, listener_id = id, error = %e, "포인트 전달 실패");
                }
                Err(_) => {
                    error!(symbol = %key, listener_id = id, "리스너 패닉, 건너뜀");
                }
            }
        }

        if !closed.is_empty() {
            self.prune(&key, &closed);
        }

        delivered
    }

    /// 심볼별로 묶어 가장 최근 포인트만 전달합니다.
    ///
    /// 같은 타임스탬프면 배치에서 나중에 나온 포인트를 사용합니다.
    pub fn publish_batch(&self, points: &[TimeSeriesPoint]) -> usize {
        let mut latest: HashMap<String, &TimeSeriesPoint> = HashMap::new();
        for point in points {
            latest
                .entry(symbol_key(&point.symbol))
                .and_modify(|current| {
                    if point.timestamp >= current.timestamp {
                        *current = point;
                    }
                })
                .or_insert(point);
        }

        latest.values().map(|point| self.publish_one(point)).sum()
    }

    fn prune(&self, key: &str, closed: &[ListenerId]) {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(group) = listeners.get_mut(key) {
            group.retain(|listener| !closed.contains(&listener.id));
            if group.is_empty() {
                listeners.remove(key);
            }
        }
        debug!(symbol = key, pruned = closed.len(), "닫힌 리스너 정리");
    }
}
