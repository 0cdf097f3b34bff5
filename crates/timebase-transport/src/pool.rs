//! 엔드포인트별 연결 풀.
//!
//! 엔드포인트마다 하나의 연결만 유지합니다. 동시에 처음 사용되더라도
//! `OnceCell`이 연결 생성을 한 번으로 제한합니다. 닫힌 연결은 다음 사용 시 교체됩니다.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::debug;

use crate::connection::ProviderConnection;
use crate::error::{TransportError, TransportResult};

type Slot = Arc<OnceCell<Arc<ProviderConnection>>>;

/// 엔드포인트 → 연결 맵.
pub struct ConnectionPool {
    connect_timeout: Duration,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ConnectionPool {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 엔드포인트의 연결을 가져오거나 새로 엽니다.
    pub async fn get(&self, endpoint: &str) -> TransportResult<Arc<ProviderConnection>> {
        // 닫힌 연결을 만나면 한 번 교체 후 재시도
        for _ in 0..2 {
            let slot = Arc::clone(self.slots().entry(endpoint.to_string()).or_default());

            let conn = slot
                .get_or_try_init(|| ProviderConnection::connect(endpoint, self.connect_timeout))
                .await;

            match conn {
                Ok(conn) if !conn.is_closed() => return Ok(Arc::clone(conn)),
                Ok(_) => {
                    debug!(endpoint = %endpoint, "닫힌 연결 제거");
                    self.evict(endpoint, &slot);
                }
                Err(e) => {
                    self.evict(endpoint, &slot);
                    return Err(e);
                }
            }
        }

        Err(TransportError::Unavailable(format!(
            "connection closed: {}",
            endpoint
        )))
    }

    /// 슬롯이 아직 같은 셀일 때만 제거합니다.
    fn evict(&self, endpoint: &str, slot: &Slot) {
        let mut slots = self.slots();
        if slots
            .get(endpoint)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            slots.remove(endpoint);
        }
    }

    /// 열린 연결 수.
    pub fn open_connections(&self) -> usize {
        self.slots()
            .values()
            .filter(|slot| slot.get().is_some_and(|conn| !conn.is_closed()))
            .count()
    }

    /// 모든 연결을 닫고 풀을 비웁니다.
    pub fn close_all(&self) {
        let drained: Vec<Slot> = self.slots().drain().map(|(_, slot)| slot).collect();
        for slot in drained {
            if let Some(conn) = slot.get() {
                conn.close();
            }
        }
    }
}
