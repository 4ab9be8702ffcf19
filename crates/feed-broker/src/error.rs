//! 데이터 제공자 에러 타입.

use thiserror::Error;

/// 데이터 제공자 관련 에러.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    NetworkError(String),

    /// 인증/권한 에러 (잘못된 자격증명, 잘못된 OTP, 만료된 세션)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 요청 한도 초과
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// 제공자가 보고한 API 에러
    #[error("API error {code}: {message}")]
    ApiError { code: String, message: String },

    /// 파싱/역직렬화 에러
    #[error("Parse error: {0}")]
    ParseError(String),

    /// 종목을 찾을 수 없음
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 잘못된 설정
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// 데이터 제공자 작업을 위한 Result 타입.
pub type BrokerResult<T> = Result<T, BrokerError>;

impl BrokerError {
    /// 인증 에러인지 확인.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, BrokerError::Unauthorized(_))
    }

    /// 재시도하면 성공할 수도 있는 에러인지 확인.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BrokerError::NetworkError(_) | BrokerError::RateLimited(_) | BrokerError::Timeout(_)
        )
    }
}

impl From<reqwest::Error> for BrokerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BrokerError::Timeout(err.to_string())
        } else if err.is_decode() {
            BrokerError::ParseError(err.to_string())
        } else {
            BrokerError::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(err: serde_json::Error) -> Self {
        BrokerError::ParseError(err.to_string())
    }
}
