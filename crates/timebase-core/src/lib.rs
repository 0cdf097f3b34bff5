//! # TimeBase Core
//!
//! TimeBase 전반에서 사용하는 핵심 도메인 모델과 공통 인프라를 제공합니다:
//! - 프로바이더, capability, 시계열 포인트, 구독 키
//! - 인터벌 타입
//! - 설정 관리
//! - 로깅 인프라
//! - 메트릭 헬퍼

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod telemetry;
pub mod types;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
