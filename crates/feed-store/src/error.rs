//! 저장소 오류 타입.

use feed_core::IngestError;
use thiserror::Error;

/// 저장소 관련 오류.
#[derive(Debug, Error)]
pub enum StoreError {
    /// 데이터베이스 연결 오류
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// 쿼리 실행 오류
    #[error("Query error: {0}")]
    QueryError(String),

    /// 데이터 삽입 오류
    #[error("Insert error: {0}")]
    InsertError(String),

    /// 등록되지 않은 종목
    #[error("Instrument not registered: {0}")]
    UnknownInstrument(String),

    /// 잘못된 데이터
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// 마이그레이션 오류
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// 연결 풀 소진
    #[error("Connection pool exhausted")]
    PoolExhausted,
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => StoreError::PoolExhausted,
            sqlx::Error::Database(db_err) => StoreError::QueryError(db_err.message().to_string()),
            sqlx::Error::Io(e) => StoreError::ConnectionError(e.to_string()),
            _ => StoreError::QueryError(err.to_string()),
        }
    }
}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        IngestError::Store(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
