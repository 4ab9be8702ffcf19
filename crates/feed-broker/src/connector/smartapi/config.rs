//! Angel One SmartAPI 설정.
//!
//! SmartAPI는 API 키(`X-PrivateKey` 헤더)와 클라이언트 코드/PIN/TOTP 로그인으로
//! 발급받은 JWT를 함께 요구합니다. 비밀 값은 모두 `SecretString`으로 보관합니다.

use secrecy::SecretString;

/// 운영 REST API 기본 URL.
pub const DEFAULT_BASE_URL: &str = "https://apiconnect.angelone.in";

/// 종목 마스터(scrip master) JSON URL.
pub const DEFAULT_SCRIP_MASTER_URL: &str =
    "https://margincalculator.angelone.in/OpenAPI_File/files/OpenAPIScripMaster.json";

/// SmartAPI 설정.
#[derive(Debug)]
pub struct SmartApiConfig {
    /// 앱 API 키
    pub api_key: SecretString,
    /// REST 기본 URL
    pub base_url: String,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// `X-ClientLocalIP` 헤더 값
    pub client_local_ip: String,
    /// `X-ClientPublicIP` 헤더 값
    pub client_public_ip: String,
    /// `X-MACAddress` 헤더 값
    pub mac_address: String,
}

impl SmartApiConfig {
    /// 기본값으로 설정 생성.
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            client_local_ip: "127.0.0.1".to_string(),
            client_public_ip: "127.0.0.1".to_string(),
            mac_address: "00:00:00:00:00:00".to_string(),
        }
    }

    /// 기본 URL 변경 (테스트 서버, 프록시).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// 요청 타임아웃 변경.
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// 로그인 엔드포인트.
    pub fn login_url(&self) -> String {
        format!("{}/rest/auth/angelbroking/user/v1/loginByPassword", self.base_url)
    }

    /// 과거 캔들 엔드포인트.
    pub fn candle_url(&self) -> String {
        format!("{}/rest/secure/angelbroking/historical/v1/getCandleData", self.base_url)
    }

    /// 로그아웃 엔드포인트.
    pub fn logout_url(&self) -> String {
        format!("{}/rest/secure/angelbroking/user/v1/logout", self.base_url)
    }
}
