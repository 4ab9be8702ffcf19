//! 수집 파이프라인의 에러 타입.
//!
//! 실행 전 단계의 치명적 에러(인증, 심볼 해석, 설정)와
//! 청크/배치/행 단위의 비치명적 에러를 구분합니다.

use thiserror::Error;

/// 수집 파이프라인 에러.
#[derive(Debug, Error)]
pub enum IngestError {
    /// 인증 실패 (잘못된 자격증명 또는 OTP)
    #[error("인증 에러: {0}")]
    Auth(String),

    /// 로그인 단계의 네트워크 에러
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 종목을 찾을 수 없음 (또는 후보가 여러 개)
    #[error("종목을 찾을 수 없음: {0}")]
    NotFound(String),

    /// 청크 조회 실패
    #[error("조회 에러: {0}")]
    Fetch(String),

    /// 저장소 에러
    #[error("저장소 에러: {0}")]
    Store(String),

    /// 타임스탬프 파싱 실패 (행 단위)
    #[error("잘못된 타임스탬프 '{raw}': {reason}")]
    MalformedTimestamp { raw: String, reason: String },

    /// 잘못된 캔들 행 (열 개수, 가격, 거래량)
    #[error("잘못된 캔들 행: {0}")]
    MalformedRow(String),

    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),
}

/// 수집 작업을 위한 Result 타입.
pub type IngestResult<T> = Result<T, IngestError>;

impl IngestError {
    /// 실행 전체를 중단시키는 에러인지 확인합니다.
    ///
    /// 청크 루프 진입 전에만 발생하는 에러가 여기에 해당합니다.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IngestError::Auth(_)
                | IngestError::Network(_)
                | IngestError::NotFound(_)
                | IngestError::Config(_)
        )
    }

    /// 행 하나만 버리면 되는 에러인지 확인합니다.
    pub fn is_row_level(&self) -> bool {
        matches!(
            self,
            IngestError::MalformedTimestamp { .. } | IngestError::MalformedRow(_)
        )
    }
}
