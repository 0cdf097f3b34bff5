//! 코어 에러 타입.
//!
//! 도메인 타입 파싱과 설정 로딩에서 발생하는 에러를 정의합니다.
//! 전송/저장소 에러는 각 crate(`timebase-transport`, `timebase-data`)에서 정의합니다.

use thiserror::Error;

/// 코어 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 지원하지 않는 인터벌
    #[error("잘못된 인터벌: {0}")]
    InvalidInterval(String),

    /// slug를 도출할 수 없는 origin
    #[error("잘못된 origin: {0}")]
    InvalidOrigin(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),
}

/// 코어 작업을 위한 Result 타입.
pub type CoreResult<T> = Result<T, CoreError>;

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::InvalidInterval("7m".to_string());
        assert_eq!(err.to_string(), "잘못된 인터벌: 7m");
    }

    #[test]
    fn test_from_serde_error() {
        let parse_err = serde_json::from_str::<u32>("not-a-number").unwrap_err();
        let err: CoreError = parse_err.into();
        assert!(matches!(err, CoreError::Serialization(_)));
    }
}
