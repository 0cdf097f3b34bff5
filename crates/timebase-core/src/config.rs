//! 설정 관리.
//!
//! 기본값, 선택적 TOML 파일, `TIMEBASE__` 접두사 환경 변수를 순서대로 병합합니다.
//!
//! ```text
//! TIMEBASE__SERVER__PORT=8080
//! TIMEBASE__STREAMING__WARMUP_SECS=0
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::domain::DEFAULT_ENDPOINT_TEMPLATE;
use crate::error::CoreResult;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// 서버 설정
    #[serde(default)]
    pub server: ServerConfig,
    /// 데이터베이스 설정
    #[serde(default)]
    pub database: DatabaseConfig,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 프로바이더 카탈로그 설정
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// 프로바이더 전송 설정
    #[serde(default)]
    pub transport: TransportConfig,
    /// 실시간 스트림 설정
    #[serde(default)]
    pub streaming: StreamingConfig,
    /// 헬스 모니터 설정
    #[serde(default)]
    pub health: HealthConfig,
}

/// 서버 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    /// `host:port` 형식의 바인딩 주소.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 데이터베이스 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// 데이터베이스 URL. 없으면 인메모리 저장소를 사용합니다.
    #[serde(default)]
    pub url: Option<String>,
    /// 최대 연결 수
    pub max_connections: u32,
    /// 연결 타임아웃 (초)
    pub connect_timeout_secs: u64,
    /// 시작 시 마이그레이션 실행 여부
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            connect_timeout_secs: 30,
            run_migrations: true,
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 프로바이더 카탈로그 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// 새 프로바이더의 기본 엔드포인트 템플릿 (`{slug}` 치환)
    pub endpoint_template: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            endpoint_template: DEFAULT_ENDPOINT_TEMPLATE.to_string(),
        }
    }
}

/// 프로바이더 전송 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// 헬스 체크 데드라인 (초)
    pub health_timeout_secs: u64,
    /// 연결 수립 타임아웃 (초)
    pub connect_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            health_timeout_secs: 5,
            connect_timeout_secs: 10,
        }
    }
}

impl TransportConfig {
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// 실시간 스트림 멀티플렉서 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamingConfig {
    /// 첫 구독 처리 전 대기 시간 (초)
    pub warmup_secs: u64,
    /// 마지막 구독이 해제된 업스트림을 닫기까지의 유휴 시간 (초). 0이면 닫지 않음
    pub idle_teardown_secs: u64,
    /// 유휴 스트림 점검 주기 (초)
    pub idle_check_secs: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            warmup_secs: 5,
            idle_teardown_secs: 300,
            idle_check_secs: 30,
        }
    }
}

impl StreamingConfig {
    pub fn warmup(&self) -> Duration {
        Duration::from_secs(self.warmup_secs)
    }

    /// 유휴 종료 시간. 비활성화된 경우 `None`.
    pub fn idle_teardown(&self) -> Option<Duration> {
        (self.idle_teardown_secs > 0).then(|| Duration::from_secs(self.idle_teardown_secs))
    }

    pub fn idle_check(&self) -> Duration {
        Duration::from_secs(self.idle_check_secs.max(1))
    }
}

/// 헬스 모니터 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthConfig {
    /// 첫 점검 전 대기 시간 (초)
    pub warmup_secs: u64,
    /// 점검 주기 (초)
    pub interval_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            warmup_secs: 10,
            interval_secs: 60,
        }
    }
}

impl HealthConfig {
    pub fn warmup(&self) -> Duration {
        Duration::from_secs(self.warmup_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 없으면 기본값과 환경 변수만 사용합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let builder = config::Config::builder()
            // 기본값으로 시작
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 파일에서 로드
            .add_source(config::File::from(path.as_ref()).required(false))
            // 환경 변수로 오버라이드
            .add_source(
                config::Environment::with_prefix("TIMEBASE")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> CoreResult<Self> {
        Self::load("config/default.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.bind_address(), "127.0.0.1:3000");
        assert_eq!(config.transport.health_timeout(), Duration::from_secs(5));
        assert_eq!(config.catalog.endpoint_template, "ws://{slug}:50051");
        assert!(config.database.url.is_none());
    }

    #[test]
    fn test_idle_teardown_disabled_at_zero() {
        let mut streaming = StreamingConfig::default();
        assert_eq!(streaming.idle_teardown(), Some(Duration::from_secs(300)));

        streaming.idle_teardown_secs = 0;
        assert!(streaming.idle_teardown().is_none());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = AppConfig::load("does/not/exist.toml").unwrap();
        assert_eq!(config.health.interval_secs, 60);
        assert_eq!(config.streaming.warmup_secs, 5);
    }
}
