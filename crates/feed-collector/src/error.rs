//! 에러 타입 정의.

use feed_broker::BrokerError;
use feed_core::IngestError;
use feed_store::StoreError;
use thiserror::Error;

/// Collector 에러 타입
#[derive(Debug, Error)]
pub enum CollectorError {
    /// 설정 에러
    #[error("Configuration error: {0}")]
    Config(String),

    /// 수집 실행 에러
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// 저장소 에러
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// 데이터 제공자 에러
    #[error("Provider error: {0}")]
    Broker(#[from] BrokerError),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, CollectorError>;
