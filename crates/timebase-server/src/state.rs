//! 애플리케이션 상태 관리.
//!
//! 모든 HTTP 핸들러와 WebSocket 세션에서 공유되는 상태를 정의합니다.
//! 카탈로그, 코디네이터, 멀티플렉서, 브로드캐스터, 헬스 모니터를 한곳에서 조립합니다.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use timebase_core::AppConfig;
use timebase_data::{
    DataAccessCoordinator, MemoryStore, PgStore, PointStore, ProviderCatalog, ProviderStore,
};
use timebase_transport::ProviderTransport;
use tokio_util::sync::CancellationToken;

use crate::streaming::{Broadcaster, MultiplexerConfig, StreamMultiplexer};
use crate::tasks::HealthMonitor;

/// 저장소 구성.
#[derive(Clone)]
pub struct Stores {
    pub providers: Arc<dyn ProviderStore>,
    pub points: Arc<dyn PointStore>,
    /// PostgreSQL을 사용하는 경우 헬스 체크용 핸들
    pub database: Option<PgStore>,
}

impl Stores {
    /// 인메모리 저장소 (재시작 시 데이터 유실).
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            providers: store.clone(),
            points: store,
            database: None,
        }
    }

    /// PostgreSQL 저장소.
    pub fn postgres(store: PgStore) -> Self {
        let shared = Arc::new(store.clone());
        Self {
            providers: shared.clone(),
            points: shared,
            database: Some(store),
        }
    }
}

/// 애플리케이션 공유 상태.
pub struct AppState {
    pub config: AppConfig,

    /// 프로바이더 카탈로그 - 등록, 활성화, capability 캐시
    pub catalog: Arc<ProviderCatalog>,

    /// 과거 데이터 코디네이터 - 저장소 우선, 프로바이더 폴백
    pub coordinator: Arc<DataAccessCoordinator>,

    /// 실시간 구독 멀티플렉서
    pub multiplexer: Arc<StreamMultiplexer>,

    /// 실시간 포인트 브로드캐스터 - WebSocket 세션이 리스너로 등록
    pub broadcaster: Arc<Broadcaster>,

    pub health_monitor: Arc<HealthMonitor>,

    /// Prometheus 핸들 (`/metrics` 렌더링)
    pub metrics: Option<PrometheusHandle>,

    /// PostgreSQL 저장소 (없으면 인메모리)
    pub database: Option<PgStore>,

    /// 서버 시작 시간
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// 상태를 조립하고 멀티플렉서 워커를 시작합니다.
    ///
    /// Tokio 런타임 안에서 호출해야 합니다.
    pub fn new(
        config: AppConfig,
        stores: Stores,
        transport: Arc<dyn ProviderTransport>,
        shutdown: &CancellationToken,
    ) -> Self {
        let catalog = Arc::new(ProviderCatalog::new(
            stores.providers.clone(),
            transport.clone(),
            &config.catalog,
        ));
        let coordinator = Arc::new(DataAccessCoordinator::new(
            stores.providers,
            stores.points,
            transport.clone(),
        ));
        let broadcaster = Arc::new(Broadcaster::new());
        let multiplexer = Arc::new(StreamMultiplexer::start(
            catalog.clone(),
            transport.clone(),
            broadcaster.clone(),
            MultiplexerConfig::from(&config.streaming),
            shutdown,
        ));
        let health_monitor = Arc::new(HealthMonitor::new(
            catalog.clone(),
            transport,
            config.health.clone(),
        ));

        Self {
            config,
            catalog,
            coordinator,
            multiplexer,
            broadcaster,
            health_monitor,
            metrics: None,
            database: stores.database,
            started_at: Utc::now(),
        }
    }

    /// Prometheus 핸들 설정.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// 서버 업타임(초).
    pub fn uptime_secs(&self) -> i64 {
        Utc::now().signed_duration_since(self.started_at).num_seconds()
    }

    /// 데이터베이스 연결 상태. 인메모리 저장소면 `None`.
    pub async fn is_db_healthy(&self) -> Option<bool> {
        match &self.database {
            Some(store) => Some(store.health_check().await.unwrap_or(false)),
            None => None,
        }
    }
}

/// 테스트용 상태 (인메모리 저장소, 워밍업 없음).
#[cfg(test)]
pub fn create_test_state(transport: Arc<dyn ProviderTransport>) -> AppState {
    let mut config = AppConfig::default();
    config.streaming.warmup_secs = 0;
    AppState::new(config, Stores::memory(), transport, &CancellationToken::new())
}
