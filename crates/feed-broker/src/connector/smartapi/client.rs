//! Angel One SmartAPI REST 클라이언트.
//!
//! 처리 기능:
//! - 비밀번호(PIN) + TOTP 로그인 (POST /rest/auth/angelbroking/user/v1/loginByPassword)
//! - 과거 캔들 조회 (POST /rest/secure/angelbroking/historical/v1/getCandleData)
//! - 로그아웃 (POST /rest/secure/angelbroking/user/v1/logout)

use super::config::SmartApiConfig;
use crate::traits::{CandleRequest, CandleResponse, HistoricalDataProvider, LoginGrant};
use crate::{BrokerError, BrokerResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Asia::Kolkata;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// 제공자 요청 시각 형식 (IST 기준).
const PROVIDER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// 인증 실패로 분류하는 SmartAPI 에러 코드.
const AUTH_ERROR_CODES: &[&str] = &[
    "AG8001", // Invalid Token
    "AG8002", // Token Expired
    "AB1000", // Invalid Email Or Password
    "AB1001", // Invalid Email
    "AB1002", // Invalid Password Length
    "AB1007", // Invalid clientcode or password
    "AB1050", // Invalid totp
];

/// 요청 한도 초과 에러 코드.
const RATE_LIMIT_ERROR_CODES: &[&str] = &["AB1019"];

/// 로그인 응답의 data 필드.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginData {
    jwt_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    feed_token: Option<String>,
}

/// SmartAPI 공통 응답 래퍼.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    status: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    errorcode: Option<String>,
    data: Option<T>,
}

/// SmartAPI 클라이언트.
pub struct SmartApiClient {
    config: SmartApiConfig,
    client: Client,
}

impl SmartApiClient {
    /// 새 클라이언트 생성.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `BrokerError::NetworkError`를 반환합니다.
    pub fn new(config: SmartApiConfig) -> BrokerResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BrokerError::NetworkError(format!("HTTP client 생성 실패: {}", e)))?;

        Ok(Self { config, client })
    }

    /// 설정 참조.
    pub fn config(&self) -> &SmartApiConfig {
        &self.config
    }

    /// 공통 헤더 구성.
    fn headers(&self, jwt: Option<&SecretString>) -> BrokerResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("x-usertype"),
            HeaderValue::from_static("USER"),
        );
        headers.insert(
            HeaderName::from_static("x-sourceid"),
            HeaderValue::from_static("WEB"),
        );
        headers.insert(
            HeaderName::from_static("x-clientlocalip"),
            header_value(&self.config.client_local_ip)?,
        );
        headers.insert(
            HeaderName::from_static("x-clientpublicip"),
            header_value(&self.config.client_public_ip)?,
        );
        headers.insert(
            HeaderName::from_static("x-macaddress"),
            header_value(&self.config.mac_address)?,
        );

        let mut api_key = header_value(self.config.api_key.expose_secret())?;
        api_key.set_sensitive(true);
        headers.insert(HeaderName::from_static("x-privatekey"), api_key);

        if let Some(jwt) = jwt {
            let mut bearer = header_value(&format!("Bearer {}", jwt.expose_secret()))?;
            bearer.set_sensitive(true);
            headers.insert(AUTHORIZATION, bearer);
        }

        Ok(headers)
    }

    /// POST 요청 후 (HTTP 상태, 본문) 반환.
    async fn post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        jwt: Option<&SecretString>,
        body: &B,
    ) -> BrokerResult<(StatusCode, String)> {
        let response = self
            .client
            .post(url)
            .headers(self.headers(jwt)?)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }
}

#[async_trait]
impl HistoricalDataProvider for SmartApiClient {
    fn name(&self) -> &str {
        "smartapi"
    }

    async fn login(
        &self,
        client_code: &str,
        pin: &SecretString,
        otp: &str,
    ) -> BrokerResult<LoginGrant> {
        if client_code.trim().is_empty() {
            return Err(BrokerError::Unauthorized(
                "클라이언트 코드가 비어 있습니다".to_string(),
            ));
        }

        info!("Requesting SmartAPI session for client {}", client_code);

        #[derive(Serialize)]
        struct LoginRequest<'a> {
            clientcode: &'a str,
            password: &'a str,
            totp: &'a str,
        }

        let request_body = LoginRequest {
            clientcode: client_code,
            password: pin.expose_secret(),
            totp: otp,
        };

        let (status, body) = self
            .post(&self.config.login_url(), None, &request_body)
            .await?;

        if let Some(err) = classify_http_status(status, &body) {
            error!("SmartAPI login failed: {} - {}", status, body);
            return Err(match err {
                BrokerError::ApiError { code, message } => {
                    BrokerError::Unauthorized(format!("{} ({})", message, code))
                }
                other => other,
            });
        }

        let envelope: Envelope<LoginData> = serde_json::from_str(&body).map_err(|e| {
            BrokerError::ParseError(format!("Failed to parse login response: {}", e))
        })?;

        if !envelope.status {
            let code = envelope.errorcode.unwrap_or_default();
            error!("SmartAPI login rejected: {} ({})", envelope.message, code);
            if RATE_LIMIT_ERROR_CODES.contains(&code.as_str()) {
                return Err(BrokerError::RateLimited(envelope.message));
            }
            // 로그인 거부는 모두 자격증명 문제로 본다
            return Err(BrokerError::Unauthorized(format!(
                "{} ({})",
                envelope.message, code
            )));
        }

        let data = envelope.data.ok_or_else(|| {
            BrokerError::ParseError("login response has no data".to_string())
        })?;

        info!("SmartAPI session opened for client {}", client_code);

        Ok(LoginGrant {
            jwt_token: SecretString::new(data.jwt_token.into()),
            refresh_token: data.refresh_token.map(|t| SecretString::new(t.into())),
            feed_token: data.feed_token.map(|t| SecretString::new(t.into())),
        })
    }

    async fn get_candles(
        &self,
        jwt: &SecretString,
        request: &CandleRequest,
    ) -> BrokerResult<CandleResponse> {
        #[derive(Serialize)]
        struct CandleRequestBody<'a> {
            exchange: &'a str,
            symboltoken: &'a str,
            interval: &'a str,
            fromdate: String,
            todate: String,
        }

        let window = &request.window;
        let body = CandleRequestBody {
            exchange: &request.exchange,
            symboltoken: &request.symbol_token,
            interval: window.interval().as_provider_str(),
            fromdate: format_provider_time(window.from()),
            todate: format_provider_time(inclusive_end(window.from(), window.to())),
        };

        debug!(
            "getCandleData {}:{} {} ~ {}",
            body.exchange, body.symboltoken, body.fromdate, body.todate
        );

        let (status, text) = self.post(&self.config.candle_url(), Some(jwt), &body).await?;

        if let Some(err) = classify_http_status(status, &text) {
            warn!("SmartAPI candle request failed: {} - {}", status, text);
            return Err(err);
        }

        let response: CandleResponse = serde_json::from_str(&text).map_err(|e| {
            BrokerError::ParseError(format!("Failed to parse candle response: {}", e))
        })?;

        if !response.status {
            let code = response.error_code.as_deref().unwrap_or_default();
            if AUTH_ERROR_CODES.contains(&code) {
                return Err(BrokerError::Unauthorized(format!(
                    "{} ({})",
                    response.message, code
                )));
            }
            if RATE_LIMIT_ERROR_CODES.contains(&code) {
                return Err(BrokerError::RateLimited(response.message));
            }
        }

        Ok(response)
    }

    async fn logout(&self, jwt: &SecretString, client_code: &str) -> BrokerResult<()> {
        #[derive(Serialize)]
        struct LogoutRequest<'a> {
            clientcode: &'a str,
        }

        let (status, body) = self
            .post(
                &self.config.logout_url(),
                Some(jwt),
                &LogoutRequest {
                    clientcode: client_code,
                },
            )
            .await?;

        if let Some(err) = classify_http_status(status, &body) {
            return Err(err);
        }

        let envelope: Envelope<serde_json::Value> = serde_json::from_str(&body).map_err(|e| {
            BrokerError::ParseError(format!("Failed to parse logout response: {}", e))
        })?;

        if !envelope.status {
            return Err(BrokerError::ApiError {
                code: envelope.errorcode.unwrap_or_default(),
                message: envelope.message,
            });
        }

        info!("SmartAPI session closed for client {}", client_code);
        Ok(())
    }
}

/// UTC 시각을 제공자 형식(IST, 분 단위)으로 변환.
pub fn format_provider_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Kolkata)
        .format(PROVIDER_TIME_FORMAT)
        .to_string()
}

/// 반열린 구간 `[from, to)`의 끝을 제공자의 포함 끝값으로 변환.
///
/// 제공자는 `todate`를 포함하므로 1분을 뺍니다. 다음 청크의 시작 캔들이
/// 중복 조회되지 않습니다.
fn inclusive_end(from: DateTime<Utc>, to: DateTime<Utc>) -> DateTime<Utc> {
    let end = to - Duration::minutes(1);
    if end < from {
        from
    } else {
        end
    }
}

/// HTTP 상태 코드를 에러로 분류 (성공이면 None).
fn classify_http_status(status: StatusCode, body: &str) -> Option<BrokerError> {
    if status.is_success() {
        return None;
    }
    let err = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            BrokerError::Unauthorized(format!("HTTP {}: {}", status.as_u16(), body))
        }
        StatusCode::TOO_MANY_REQUESTS => BrokerError::RateLimited(body.to_string()),
        s if s.is_server_error() => {
            BrokerError::NetworkError(format!("HTTP {}: {}", s.as_u16(), body))
        }
        s => BrokerError::ApiError {
            code: s.as_u16().to_string(),
            message: body.to_string(),
        },
    };
    Some(err)
}

fn header_value(value: &str) -> BrokerResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| BrokerError::InvalidConfig(format!("잘못된 헤더 값: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_provider_time_is_ist() {
        // 03:45 UTC = 09:15 IST
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 3, 45, 0).unwrap();
        assert_eq!(format_provider_time(ts), "2024-01-01 09:15");
    }

    #[test]
    fn test_inclusive_end() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        assert_eq!(inclusive_end(from, to), to - Duration::minutes(1));
        assert_eq!(inclusive_end(from, from + Duration::seconds(30)), from);
    }

    #[test]
    fn test_classify_http_status() {
        assert!(classify_http_status(StatusCode::OK, "").is_none());
        assert!(matches!(
            classify_http_status(StatusCode::UNAUTHORIZED, "no"),
            Some(BrokerError::Unauthorized(_))
        ));
        assert!(matches!(
            classify_http_status(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            Some(BrokerError::RateLimited(_))
        ));
        assert!(matches!(
            classify_http_status(StatusCode::BAD_GATEWAY, ""),
            Some(BrokerError::NetworkError(_))
        ));
        assert!(matches!(
            classify_http_status(StatusCode::BAD_REQUEST, ""),
            Some(BrokerError::ApiError { .. })
        ));
    }
}
