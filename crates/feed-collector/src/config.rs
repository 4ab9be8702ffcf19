//! 환경변수 기반 설정 모듈.
//!
//! 비밀 값(API 키, PIN, TOTP 비밀키)은 코드에 두지 않고 환경변수나 `.env`로만 주입합니다.

use crate::error::CollectorError;
use crate::modules::{BackfillConfig, FetchSettings};
use crate::Result;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use feed_broker::{Credentials, OtpSource, SmartApiConfig, DEFAULT_SCRIP_MASTER_URL};
use feed_core::Interval;
use feed_store::{ConflictPolicy, DEFAULT_BATCH_SIZE};
use secrecy::SecretString;
use std::str::FromStr;
use std::time::Duration;

/// Collector 전체 설정 (비밀 값 제외)
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 데이터베이스 URL (없으면 드라이런만 가능)
    pub database_url: Option<String>,
    /// 최대 DB 연결 수
    pub database_max_connections: u32,
    /// 종목 마스터 URL
    pub scrip_master_url: String,
    /// 수집 설정
    pub ingest: IngestConfig,
    /// 데몬 모드 설정
    pub daemon: DaemonConfig,
}

/// 캔들 수집 설정
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// 캔들 간격
    pub interval: Interval,
    /// 요청당 최대 기간 (일, 없으면 간격별 기본 한도)
    pub max_span_days: Option<i64>,
    /// 요청당 최대 행 수 (0이면 제한 없음)
    pub max_rows: u32,
    /// API 요청 간 딜레이 (밀리초)
    pub request_delay_ms: u64,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 저장된 데이터가 없을 때 증분 수집 시작 시각
    pub fallback_start: DateTime<Utc>,
    /// DB 배치 크기
    pub batch_size: usize,
    /// 백필 충돌 정책
    pub backfill_policy: ConflictPolicy,
    /// 증분 업데이트 충돌 정책
    pub update_policy: ConflictPolicy,
    /// 진행 로그 주기 (청크 수)
    pub progress_every: usize,
}

/// 데몬 모드 설정
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// 업데이트 주기 (분 단위)
    pub interval_minutes: u64,
    /// 대상 종목
    pub symbols: Vec<String>,
    /// 대상 거래소
    pub exchange: String,
}

/// 제공자 로그인 설정.
///
/// 로그인이 필요한 명령에서만 로드합니다.
#[derive(Debug)]
pub struct ProviderConfig {
    /// SmartAPI 연결 설정
    pub api: SmartApiConfig,
    /// 로그인 자격증명
    pub credentials: Credentials,
}

impl CollectorConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let fallback_start = match std::env::var("INGEST_FALLBACK_START") {
            Ok(raw) => parse_start_date(&raw)?,
            Err(_) => {
                let today = Utc::now().date_naive();
                midnight_utc(today - ChronoDuration::days(30))
            }
        };

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            database_max_connections: env_var_parse("DATABASE_MAX_CONNECTIONS", 5),
            scrip_master_url: std::env::var("SCRIP_MASTER_URL")
                .unwrap_or_else(|_| DEFAULT_SCRIP_MASTER_URL.to_string()),
            ingest: IngestConfig {
                interval: env_var_strict("INGEST_INTERVAL", Interval::OneMinute)?,
                max_span_days: std::env::var("INGEST_MAX_SPAN_DAYS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|d: &i64| *d > 0),
                max_rows: env_var_parse("INGEST_MAX_ROWS", 8000),
                request_delay_ms: env_var_parse("INGEST_REQUEST_DELAY_MS", 500),
                request_timeout_secs: env_var_parse("INGEST_REQUEST_TIMEOUT_SECS", 30),
                fallback_start,
                batch_size: env_var_parse("INGEST_BATCH_SIZE", DEFAULT_BATCH_SIZE),
                backfill_policy: env_var_strict("INGEST_BACKFILL_POLICY", ConflictPolicy::Skip)?,
                update_policy: env_var_strict("INGEST_UPDATE_POLICY", ConflictPolicy::Overwrite)?,
                progress_every: env_var_parse("INGEST_PROGRESS_EVERY", 10),
            },
            daemon: DaemonConfig {
                interval_minutes: env_var_parse("DAEMON_INTERVAL_MINUTES", 60),
                symbols: env_var_list("INGEST_SYMBOLS"),
                exchange: std::env::var("INGEST_EXCHANGE").unwrap_or_else(|_| "NSE".to_string()),
            },
        })
    }
}

impl IngestConfig {
    /// API 요청 간 딜레이와 타임아웃
    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            request_delay: Duration::from_millis(self.request_delay_ms),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    /// 전체 구간 백필 설정 생성
    pub fn backfill(
        &self,
        symbol: &str,
        exchange: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BackfillConfig {
        let mut config = BackfillConfig::full(symbol, exchange, start, end);
        config.conflict_policy = self.backfill_policy;
        self.apply(config)
    }

    /// 증분 업데이트 설정 생성
    pub fn update(&self, symbol: &str, exchange: &str) -> BackfillConfig {
        let mut config = BackfillConfig::incremental(symbol, exchange, self.fallback_start);
        config.conflict_policy = self.update_policy;
        self.apply(config)
    }

    fn apply(&self, mut config: BackfillConfig) -> BackfillConfig {
        config.interval = self.interval;
        config.max_span = self.max_span_days.map(ChronoDuration::days);
        config.max_rows = self.max_rows;
        config.progress_every = self.progress_every;
        config
    }
}

impl DaemonConfig {
    /// 업데이트 주기를 Duration으로 반환
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.max(1) * 60)
    }
}

impl ProviderConfig {
    /// 환경변수에서 로그인 설정 로드.
    ///
    /// `SMARTAPI_TOTP_SECRET`이 있으면 TOTP를 생성하고, 없으면 `SMARTAPI_OTP` 값을 그대로 씁니다.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let api_key = required_secret("SMARTAPI_API_KEY")?;
        let client_code = required_var("SMARTAPI_CLIENT_CODE")?;
        let pin = required_secret("SMARTAPI_PIN")?;

        let otp = match (
            non_empty_var("SMARTAPI_TOTP_SECRET"),
            non_empty_var("SMARTAPI_OTP"),
        ) {
            (Some(secret), _) => OtpSource::Totp(SecretString::new(secret.into())),
            (None, Some(code)) => OtpSource::Static(SecretString::new(code.into())),
            (None, None) => {
                return Err(CollectorError::Config(
                    "SMARTAPI_TOTP_SECRET 또는 SMARTAPI_OTP 환경변수가 필요합니다".to_string(),
                ))
            }
        };

        let mut api = SmartApiConfig::new(api_key)
            .with_timeout_secs(env_var_parse("INGEST_REQUEST_TIMEOUT_SECS", 30));
        if let Some(base_url) = non_empty_var("SMARTAPI_BASE_URL") {
            api = api.with_base_url(base_url);
        }

        Ok(Self {
            api,
            credentials: Credentials::new(client_code, pin, otp),
        })
    }
}

/// `YYYY-MM-DD` 또는 RFC 3339 시각을 UTC로 해석
pub fn parse_start_date(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(midnight_utc(date));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CollectorError::Config(format!("잘못된 날짜 '{}': {}", raw, e)))
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or_else(Utc::now)
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 환경변수에서 값을 파싱 (값이 있는데 잘못되면 에러)
fn env_var_strict<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty_var(key) {
        Some(v) => v
            .parse()
            .map_err(|e| CollectorError::Config(format!("{}: {}", key, e))),
        None => Ok(default),
    }
}

/// 쉼표로 구분된 목록
fn env_var_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn required_var(key: &str) -> Result<String> {
    non_empty_var(key).ok_or_else(|| {
        CollectorError::Config(format!("{} 환경변수가 설정되지 않았습니다", key))
    })
}

fn required_secret(key: &str) -> Result<SecretString> {
    required_var(key).map(|v| SecretString::new(v.into()))
}
