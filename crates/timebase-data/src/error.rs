//! 데이터 모듈 오류 타입.

use thiserror::Error;
use timebase_core::CoreError;
use timebase_transport::TransportError;

/// 데이터 관련 오류.
#[derive(Debug, Error)]
pub enum DataError {
    /// 데이터베이스 연결 오류
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// 쿼리 실행 오류
    #[error("Query error: {0}")]
    QueryError(String),

    /// 레코드를 찾을 수 없음
    #[error("Record not found: {0}")]
    NotFound(String),

    /// 중복 레코드 (slug 고유 제약 위반 등)
    #[error("Duplicate record: {0}")]
    DuplicateError(String),

    /// 직렬화/역직렬화 오류
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// 마이그레이션 오류
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// 연결 풀 소진
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// 데이터 삽입 오류
    #[error("Insert error: {0}")]
    InsertError(String),

    /// 데이터 삭제 오류
    #[error("Delete error: {0}")]
    DeleteError(String),

    /// 프로바이더 전송 오류
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// 도메인 오류 (잘못된 origin 등)
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl DataError {
    /// 메트릭 라벨용 에러 종류.
    pub fn kind(&self) -> &'static str {
        match self {
            DataError::ConnectionError(_) | DataError::PoolExhausted => "connection",
            DataError::QueryError(_) | DataError::NotFound(_) => "query",
            DataError::DuplicateError(_) => "duplicate",
            DataError::SerializationError(_) => "serialization",
            DataError::MigrationError(_) => "migration",
            DataError::InsertError(_) => "insert",
            DataError::DeleteError(_) => "delete",
            DataError::Transport(e) => e.kind(),
            DataError::Core(_) => "invalid_input",
        }
    }
}

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DataError::NotFound("Row not found".to_string()),
            sqlx::Error::PoolTimedOut => DataError::PoolExhausted,
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().unwrap_or_default();
                if code == "23505" {
                    // PostgreSQL 고유 제약 조건 위반
                    DataError::DuplicateError(db_err.message().to_string())
                } else {
                    DataError::QueryError(db_err.message().to_string())
                }
            }
            sqlx::Error::Io(e) => DataError::ConnectionError(e.to_string()),
            _ => DataError::QueryError(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DataError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DataError::MigrationError(err.to_string())
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_keeps_kind() {
        let err: DataError = TransportError::Protocol("bad frame".to_string()).into();
        assert_eq!(err.kind(), "protocol");
        assert_eq!(err.to_string(), "Protocol error: bad frame");
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DataError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DataError::NotFound(_)));
    }
}
