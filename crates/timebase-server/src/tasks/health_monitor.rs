//! 프로바이더 헬스 모니터.
//!
//! 서버 실행 중 주기적으로 활성 프로바이더의 헬스 체크를 수행하고
//! 프로바이더별 헬스 게이지(1 = 정상, 0 = 비정상)를 기록합니다.
//! - 한 프로바이더의 실패(패닉 포함)는 다른 프로바이더 점검에 영향을 주지 않음
//! - 마지막 점검 결과는 `/health/ready`에서 사용

use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use timebase_core::telemetry;
use timebase_core::HealthConfig;
use timebase_data::{ProviderCatalog, Result};
use timebase_transport::ProviderTransport;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 프로바이더 헬스 점검 결과.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderHealth {
    pub provider_id: Uuid,
    pub slug: String,
    pub healthy: bool,
}

/// 헬스 모니터.
pub struct HealthMonitor {
    catalog: Arc<ProviderCatalog>,
    transport: Arc<dyn ProviderTransport>,
    config: HealthConfig,
    latest: RwLock<Vec<ProviderHealth>>,
}

impl HealthMonitor {
    pub fn new(
        catalog: Arc<ProviderCatalog>,
        transport: Arc<dyn ProviderTransport>,
        config: HealthConfig,
    ) -> Self {
        Self {
            catalog,
            transport,
            config,
            latest: RwLock::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// 활성 프로바이더를 모두 점검하고 결과를 반환합니다.
    ///
    /// 점검은 프로바이더별 태스크에서 동시에 실행됩니다.
    pub async fn sweep(&self) -> Result<Vec<ProviderHealth>> {
        let providers = self.catalog.list(Some(true)).await?;

        let checks: Vec<_> = providers
            .into_iter()
            .map(|provider| {
                let transport = Arc::clone(&self.transport);
                let slug = provider.slug.clone();
                let provider_id = provider.id;
                let handle =
                    tokio::spawn(async move { transport.check_health(&provider).await });
                (provider_id, slug, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(checks.len());
        for (provider_id, slug, handle) in checks {
            let healthy = match handle.await {
                Ok(healthy) => healthy,
                Err(e) => {
                    error!(slug = %slug, error = %e, "헬스 체크 태스크 실패");
                    telemetry::record_error("health_check", "panic");
                    false
                }
            };

            telemetry::set_provider_health(&slug, healthy);
            if healthy {
                debug!(slug = %slug, "프로바이더 정상");
            } else {
                warn!(slug = %slug, "프로바이더 비정상");
            }

            results.push(ProviderHealth {
                provider_id,
                slug,
                healthy,
            });
        }

        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = results.clone();
        Ok(results)
    }

    /// 마지막 점검 결과.
    pub fn latest(&self) -> Vec<ProviderHealth> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// 헬스 모니터 백그라운드 태스크 시작.
pub fn start_health_monitor(
    monitor: Arc<HealthMonitor>,
    shutdown_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let config = monitor.config().clone();
        info!(
            warmup_secs = config.warmup_secs,
            interval_secs = config.interval_secs,
            "헬스 모니터 시작"
        );

        tokio::select! {
            _ = tokio::time::sleep(config.warmup()) => {}
            _ = shutdown_token.cancelled() => {
                info!("헬스 모니터: 종료 시그널 수신 (초기화 중)");
                return;
            }
        }

        let mut check_interval = interval(config.interval());
        check_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = check_interval.tick() => {
                    match monitor.sweep().await {
                        Ok(results) => {
                            let healthy = results.iter().filter(|r| r.healthy).count();
                            debug!(total = results.len(), healthy, "헬스 점검 완료");
                        }
                        Err(e) => error!(error = %e, "헬스 점검 실패"),
                    }
                }
                _ = shutdown_token.cancelled() => {
                    info!("헬스 모니터: 종료 시그널 수신");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use timebase_core::{CapabilityDescriptor, CatalogConfig, Provider, StreamControl, SymbolInfo};
    use timebase_data::{MemoryStore, ProviderStore};
    use timebase_transport::{
        HistoricalRequest, PointStream, TransportError, TransportResult,
    };
    use tokio::sync::mpsc;

    /// `boom`은 패닉, `down`은 비정상, 나머지는 정상.
    #[derive(Default)]
    struct ScriptedTransport {
        checked: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ProviderTransport for ScriptedTransport {
        async fn fetch_historical(
            &self,
            _: &Provider,
            _: &HistoricalRequest,
        ) -> TransportResult<Vec<timebase_core::TimeSeriesPoint>> {
            Ok(Vec::new())
        }

        async fn fetch_capabilities(
            &self,
            _: &Provider,
        ) -> TransportResult<Option<CapabilityDescriptor>> {
            Ok(None)
        }

        async fn check_health(&self, provider: &Provider) -> bool {
            self.checked.lock().unwrap().push(provider.slug.clone());
            match provider.slug.as_str() {
                "boom" => panic!("health check bug"),
                "down" => false,
                _ => true,
            }
        }

        async fn fetch_symbols(&self, _: &Provider) -> TransportResult<Vec<SymbolInfo>> {
            Ok(Vec::new())
        }

        async fn open_realtime_stream(
            &self,
            _: &Provider,
            _: mpsc::UnboundedReceiver<StreamControl>,
            _: CancellationToken,
        ) -> TransportResult<PointStream> {
            Err(TransportError::Unavailable("not supported".to_string()))
        }
    }

    async fn monitor_with(slugs: &[&str]) -> (Arc<HealthMonitor>, Arc<ScriptedTransport>) {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(ScriptedTransport::default());
        for slug in slugs {
            let origin = format!("https://example.com/org/{slug}");
            store
                .insert_provider(&Provider::new(*slug, origin, format!("ws://{slug}:50051")))
                .await
                .unwrap();
        }
        let catalog = Arc::new(ProviderCatalog::new(
            store,
            transport.clone(),
            &CatalogConfig::default(),
        ));
        let monitor = Arc::new(HealthMonitor::new(
            catalog,
            transport.clone(),
            HealthConfig {
                warmup_secs: 1,
                interval_secs: 10,
            },
        ));
        (monitor, transport)
    }

    #[tokio::test]
    async fn test_sweep_isolates_failures() {
        let (monitor, transport) = monitor_with(&["boom", "down", "acme"]).await;

        let results = monitor.sweep().await.unwrap();

        let by_slug: Vec<(&str, bool)> = results
            .iter()
            .map(|r| (r.slug.as_str(), r.healthy))
            .collect();
        assert_eq!(by_slug, vec![("boom", false), ("down", false), ("acme", true)]);
        assert_eq!(transport.checked.lock().unwrap().len(), 3);
        assert_eq!(monitor.latest(), results);
    }

    #[tokio::test]
    async fn test_disabled_providers_are_skipped() {
        let (monitor, transport) = monitor_with(&["acme", "other"]).await;
        let other = monitor.catalog.get_by_slug("other").await.unwrap().unwrap();
        monitor.catalog.set_enabled(other.id, false).await.unwrap();

        let results = monitor.sweep().await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(*transport.checked.lock().unwrap(), vec!["acme".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_loop_runs_until_cancelled() {
        let (monitor, transport) = monitor_with(&["acme"]).await;
        let shutdown = CancellationToken::new();
        let handle = start_health_monitor(monitor, shutdown.clone());

        // 워밍업 전에는 점검하지 않음
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(transport.checked.lock().unwrap().is_empty());

        // 워밍업 직후 첫 점검, 이후 주기마다 점검
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(transport.checked.lock().unwrap().len(), 2);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
