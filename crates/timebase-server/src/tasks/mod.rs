//! 백그라운드 태스크 모듈.
//!
//! 서버 실행 중 주기적으로 실행되는 백그라운드 작업을 정의합니다.
//! - 헬스 모니터: 활성 프로바이더 헬스 체크 및 게이지 기록

pub mod health_monitor;

pub use health_monitor::{start_health_monitor, HealthMonitor, ProviderHealth};
