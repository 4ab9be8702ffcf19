//! 데이터 제공자 trait 정의.
//!
//! 파이프라인은 구체적인 증권사 API 대신 이 trait들에만 의존합니다.

use async_trait::async_trait;
use feed_core::FetchWindow;
use secrecy::SecretString;
use serde::Deserialize;

use crate::BrokerResult;

/// 로그인 성공 시 발급되는 토큰 묶음.
#[derive(Debug)]
pub struct LoginGrant {
    /// API 호출용 JWT
    pub jwt_token: SecretString,
    /// 갱신 토큰 (제공자가 주는 경우)
    pub refresh_token: Option<SecretString>,
    /// 시세 피드 토큰 (제공자가 주는 경우)
    pub feed_token: Option<SecretString>,
}

/// 과거 캔들 요청.
#[derive(Debug, Clone)]
pub struct CandleRequest {
    /// 거래소 세그먼트 (예: "NSE")
    pub exchange: String,
    /// 제공자 종목 토큰
    pub symbol_token: String,
    /// 조회 구간과 간격
    pub window: FetchWindow,
}

/// 과거 캔들 응답 원문.
///
/// `data`의 각 행은 `[timestamp, open, high, low, close, volume]` 형식입니다.
/// 행 단위 검증은 호출자가 수행하므로 값은 JSON 그대로 둡니다.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandleResponse {
    /// 성공 여부
    #[serde(default)]
    pub status: bool,
    /// 응답 메시지
    #[serde(default)]
    pub message: String,
    /// 제공자 에러 코드 (예: "AB1004")
    #[serde(default, rename = "errorcode")]
    pub error_code: Option<String>,
    /// 캔들 행
    #[serde(default)]
    pub data: Option<Vec<Vec<serde_json::Value>>>,
}

/// 과거 데이터 제공자 trait.
///
/// 세션 토큰 하나에 요청 한도가 묶여 있으므로 호출자는 요청을 순차적으로 보내야 합니다.
#[async_trait]
pub trait HistoricalDataProvider: Send + Sync {
    /// 제공자 이름.
    fn name(&self) -> &str;

    /// 일회용 코드(OTP)를 포함한 로그인.
    ///
    /// 잘못된 자격증명/OTP는 `BrokerError::Unauthorized`로 구분해 반환해야 합니다.
    async fn login(
        &self,
        client_code: &str,
        pin: &SecretString,
        otp: &str,
    ) -> BrokerResult<LoginGrant>;

    /// 구간 하나의 캔들 조회.
    ///
    /// 응답을 해석할 수 있으면 제공자가 실패를 보고해도 `Ok`를 반환합니다.
    async fn get_candles(
        &self,
        jwt: &SecretString,
        request: &CandleRequest,
    ) -> BrokerResult<CandleResponse>;

    /// 로그아웃.
    async fn logout(&self, jwt: &SecretString, client_code: &str) -> BrokerResult<()>;
}

/// 종목 마스터 항목.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogEntry {
    /// 제공자 종목 토큰
    pub token: String,
    /// 거래 심볼 (예: "WIPRO-EQ")
    pub symbol: String,
    /// 종목명 (예: "WIPRO")
    pub name: String,
    /// 거래소 세그먼트 (예: "NSE")
    #[serde(rename = "exch_seg")]
    pub exchange_segment: String,
}

/// 종목 마스터 제공자 trait.
#[async_trait]
pub trait InstrumentCatalog: Send + Sync {
    /// 전체 종목 마스터 조회.
    async fn entries(&self) -> BrokerResult<Vec<CatalogEntry>>;
}
