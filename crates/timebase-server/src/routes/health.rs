//! 헬스 체크 endpoint.
//!
//! 로드밸런서나 오케스트레이션 시스템(Kubernetes 등)에서 사용됩니다.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::state::AppState;

/// 멀티플렉서 스냅샷 대기 한도. 워밍업 중에는 스냅샷이 큐에 묶여 있습니다.
const SNAPSHOT_TIMEOUT: Duration = Duration::from_millis(500);

/// 헬스 체크 응답 구조체.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// 전체 서비스 상태 ("healthy" | "degraded" | "unhealthy")
    pub status: String,

    pub version: String,

    /// 서버 업타임(초)
    pub uptime_secs: i64,

    /// 현재 시간 (ISO 8601)
    pub timestamp: String,

    pub components: ComponentHealth,
}

/// 개별 컴포넌트 상태.
#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// 데이터베이스 연결 상태
    pub database: ComponentStatus,

    /// 마지막 헬스 점검 기준 프로바이더 상태
    pub providers: ComponentStatus,

    /// 업스트림 스트림 상태
    pub streams: ComponentStatus,
}

/// 컴포넌트 상태.
#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentStatus {
    /// 상태 ("up" | "down" | "starting" | "not_configured")
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentStatus {
    pub fn up() -> Self {
        Self {
            status: "up".to_string(),
            message: None,
        }
    }

    pub fn down(message: impl Into<String>) -> Self {
        Self {
            status: "down".to_string(),
            message: Some(message.into()),
        }
    }

    pub fn not_configured() -> Self {
        Self {
            status: "not_configured".to_string(),
            message: None,
        }
    }

    pub fn starting(message: impl Into<String>) -> Self {
        Self {
            status: "starting".to_string(),
            message: Some(message.into()),
        }
    }

    pub fn up_with_info(message: impl Into<String>) -> Self {
        Self {
            status: "up".to_string(),
            message: Some(message.into()),
        }
    }
}

/// 간단한 헬스 체크 (liveness probe용).
///
/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// 상세 헬스 체크 (readiness probe용).
///
/// 데이터베이스 장애는 503, 비정상 프로바이더는 degraded로 보고합니다.
/// GET /health/ready
pub async fn health_ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut overall_status = "healthy";
    let mut status_code = StatusCode::OK;

    let database_status = match state.is_db_healthy().await {
        Some(true) => ComponentStatus::up(),
        Some(false) => {
            overall_status = "unhealthy";
            status_code = StatusCode::SERVICE_UNAVAILABLE;
            ComponentStatus::down("연결 실패")
        }
        None => ComponentStatus::not_configured(),
    };

    let checks = state.health_monitor.latest();
    let providers_status = if checks.is_empty() {
        ComponentStatus::not_configured()
    } else {
        let unhealthy: Vec<&str> = checks
            .iter()
            .filter(|c| !c.healthy)
            .map(|c| c.slug.as_str())
            .collect();
        if unhealthy.is_empty() {
            ComponentStatus::up_with_info(format!("{} providers healthy", checks.len()))
        } else {
            if overall_status == "healthy" {
                overall_status = "degraded";
            }
            ComponentStatus::down(format!("unhealthy: {}", unhealthy.join(", ")))
        }
    };

    let snapshot = tokio::time::timeout(SNAPSHOT_TIMEOUT, state.multiplexer.snapshot()).await;
    let streams_status = match snapshot {
        Ok(Some(snapshot)) => ComponentStatus::up_with_info(format!(
            "{} upstream streams, {} providers subscribed",
            snapshot.streams.len(),
            snapshot.counts.len()
        )),
        Err(_) => ComponentStatus::starting("멀티플렉서 워밍업 중"),
        Ok(None) => {
            if overall_status == "healthy" {
                overall_status = "degraded";
            }
            ComponentStatus::down("멀티플렉서 중지됨")
        }
    };

    let response = HealthResponse {
        status: overall_status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        components: ComponentHealth {
            database: database_status,
            providers: providers_status,
            streams: streams_status,
        },
    };

    (status_code, Json(response))
}

/// 헬스 체크 라우터 생성.
pub fn health_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(health_ready))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::create_test_state;
    use crate::test_support::NullTransport;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_check_returns_ok() {
        let app = Router::new().route("/health", get(health_check));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready_in_memory() {
        let state = Arc::new(create_test_state(Arc::new(NullTransport)));
        let app = Router::new()
            .route("/health/ready", get(health_ready))
            .with_state(state);

        let response = app
            .oneshot(Request::builder().uri("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.components.database.status, "not_configured");
        assert_eq!(health.components.streams.status, "up");
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_ready_during_warmup() {
        let mut config = timebase_core::AppConfig::default();
        config.streaming.warmup_secs = 60;
        let state = Arc::new(AppState::new(
            config,
            crate::state::Stores::memory(),
            Arc::new(NullTransport),
            &tokio_util::sync::CancellationToken::new(),
        ));
        let app = Router::new()
            .route("/health/ready", get(health_ready))
            .with_state(state);

        let response = app
            .oneshot(Request::builder().uri("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.components.streams.status, "starting");
    }
}
