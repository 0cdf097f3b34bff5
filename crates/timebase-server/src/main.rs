//! TimeBase 서버.
//!
//! 프로바이더 카탈로그, 과거 데이터 코디네이터, 실시간 멀티플렉서, 헬스 모니터를 조립하고
//! 헬스 체크, 메트릭, WebSocket 게이트웨이를 제공합니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use timebase_core::{init_logging, AppConfig, LogConfig};
use timebase_data::PgStore;
use timebase_server::{create_router, setup_metrics_recorder, start_health_monitor, AppState, Stores};
use timebase_transport::ProviderClient;

/// 설정에 따라 저장소를 준비합니다.
///
/// `database.url`(또는 `DATABASE_URL`)이 없으면 인메모리 저장소를 사용합니다.
async fn create_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    let url = config
        .database
        .url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok());

    let Some(url) = url else {
        warn!("DATABASE_URL not set, using in-memory store (data is lost on restart)");
        return Ok(Stores::memory());
    };

    let store = PgStore::connect(&url, &config.database)
        .await
        .context("데이터베이스 연결 실패")?;
    info!("Database connected");

    if config.database.run_migrations {
        store.migrate().await.context("마이그레이션 실패")?;
        info!("Database migrations applied");
    }

    Ok(Stores::postgres(store))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 파일 로드 (있는 경우)
    let _ = dotenvy::dotenv();

    let config = AppConfig::load_default().context("설정 로드 실패")?;

    init_logging(LogConfig::from(&config.logging))
        .map_err(|e| anyhow::anyhow!("로깅 초기화 실패: {e}"))?;

    info!("Starting TimeBase server...");

    let metrics_handle = setup_metrics_recorder().context("Prometheus 레코더 설치 실패")?;
    info!("Prometheus metrics recorder initialized");

    let addr: SocketAddr = config.server.bind_address().parse().map_err(|e| {
        error!(
            host = %config.server.host,
            port = config.server.port,
            error = %e,
            "소켓 주소 설정이 유효하지 않습니다. TIMEBASE__SERVER__HOST, TIMEBASE__SERVER__PORT를 확인하세요."
        );
        e
    })?;

    let stores = create_stores(&config).await?;
    let client = Arc::new(ProviderClient::new(&config.transport));

    // 전역 종료 토큰 (graceful shutdown용, 백그라운드 태스크에서 사용)
    let shutdown_token = CancellationToken::new();

    let state = Arc::new(
        AppState::new(config, stores, client.clone(), &shutdown_token).with_metrics(metrics_handle),
    );

    // 활성 프로바이더 게이지를 저장소와 맞추고 capability를 갱신
    match state.catalog.sync_metrics().await {
        Ok(active) => info!(active, "Provider catalog loaded"),
        Err(e) => warn!(error = %e, "Failed to sync provider metrics"),
    }
    match state.catalog.refresh_all().await {
        Ok(refreshed) => info!(count = refreshed.len(), "Provider capabilities refreshed"),
        Err(e) => warn!(error = %e, "Failed to refresh provider capabilities"),
    }

    let health_task = start_health_monitor(state.health_monitor.clone(), shutdown_token.clone());

    let app = create_router(state.clone());

    info!(%addr, "TimeBase server listening");
    info!("Metrics available at http://{}/metrics", addr);
    info!("WebSocket available at ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_token.clone()))
        .await?;

    info!("Server shutdown initiated, cleaning up...");
    shutdown_token.cancel();

    // 정리 작업에 최대 10초 대기
    let cleanup = tokio::time::timeout(Duration::from_secs(10), async {
        state.multiplexer.shutdown().await;
        if let Err(e) = health_task.await {
            error!(error = %e, "Health monitor task failed");
        }
        client.pool().close_all();
    })
    .await;

    if cleanup.is_err() {
        warn!("Cleanup timeout, forcing shutdown");
    }

    info!("Server stopped gracefully");

    Ok(())
}

/// Graceful shutdown 시그널 대기.
///
/// Ctrl+C 또는 SIGTERM 시그널을 수신하면 종료 토큰을 취소합니다.
/// 시그널 핸들러 설치에 실패하면 해당 시그널은 기다리지 않습니다.
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
        _ = shutdown_token.cancelled() => {}
    }

    // 모든 백그라운드 태스크에 종료 시그널 전파
    shutdown_token.cancel();
    info!("Shutdown signal propagated to background tasks");
}
