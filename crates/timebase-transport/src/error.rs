//! 프로바이더 전송 에러 타입.

use thiserror::Error;

/// 프로바이더가 "사용 불가"를 알릴 때 쓰는 에러 코드.
pub const UNAVAILABLE_CODE: &str = "UNAVAILABLE";

/// 프로바이더 전송 관련 에러.
#[derive(Debug, Error)]
pub enum TransportError {
    /// 프로바이더에 도달할 수 없음 (연결 실패, 연결 끊김, UNAVAILABLE 응답)
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// 프로바이더가 반환한 에러
    #[error("Provider error {code}: {message}")]
    Remote { code: String, message: String },

    /// 예상하지 못한 프레임
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// 직렬화/역직렬화 에러
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 데드라인 초과
    #[error("Request timeout: {0}")]
    Timeout(String),
}

/// 전송 작업을 위한 Result 타입.
pub type TransportResult<T> = Result<T, TransportError>;

impl TransportError {
    /// 프로바이더 에러 프레임을 변환합니다.
    pub fn from_remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let message = message.into();
        if code.eq_ignore_ascii_case(UNAVAILABLE_CODE) {
            TransportError::Unavailable(message)
        } else {
            TransportError::Remote { code, message }
        }
    }

    /// 소프트 실패(빈 결과로 대체)로 처리할 에러인지 확인.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, TransportError::Unavailable(_))
    }

    /// 메트릭 라벨용 에러 종류.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Unavailable(_) => "unavailable",
            TransportError::Remote { .. } => "remote",
            TransportError::Protocol(_) => "protocol",
            TransportError::Serialization(_) => "serialization",
            TransportError::Timeout(_) => "timeout",
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_unavailable_code_is_soft() {
        let err = TransportError::from_remote("UNAVAILABLE", "rate limited upstream");
        assert!(err.is_unavailable());

        let err = TransportError::from_remote("INTERNAL", "boom");
        assert!(!err.is_unavailable());
        assert_eq!(err.kind(), "remote");
    }

    #[test]
    fn test_timeout_is_hard() {
        let err = TransportError::Timeout("health check exceeded 5000ms".to_string());
        assert!(!err.is_unavailable());
        assert_eq!(err.kind(), "timeout");
    }
}
