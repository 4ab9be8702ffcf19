//! 청크 단위 캔들 조회와 결과 분류.
//!
//! 한 세션의 요청 한도는 세션 전체에 걸리므로 `CandleFetcher`는 `&mut self`로만
//! 조회할 수 있고, 이전 호출이 끝난 시점부터 최소 간격을 둡니다.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use feed_broker::{CandleRequest, CandleResponse, HistoricalDataProvider, Session};
use feed_core::{Candle, FetchOutcome, FetchWindow, IngestError, IngestResult, Instrument};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 호출 간 최소 간격 관리.
#[derive(Debug)]
struct Pacer {
    delay: Duration,
    last_end: Option<Instant>,
}

impl Pacer {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_end: None,
        }
    }

    fn next_allowed(&self) -> Option<Instant> {
        self.last_end.map(|end| end + self.delay)
    }

    async fn wait(&self) {
        if let Some(at) = self.next_allowed() {
            tokio::time::sleep_until(at).await;
        }
    }

    fn mark(&mut self) {
        self.last_end = Some(Instant::now());
    }
}

/// 캔들 조회기.
pub struct CandleFetcher {
    provider: Arc<dyn HistoricalDataProvider>,
    pacer: Pacer,
    request_timeout: Duration,
}

impl CandleFetcher {
    /// 새 조회기 생성.
    pub fn new(
        provider: Arc<dyn HistoricalDataProvider>,
        request_delay: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            pacer: Pacer::new(request_delay),
            request_timeout,
        }
    }

    /// 다음 호출이 허용될 때까지 기다립니다.
    ///
    /// 취소되면 `false`를 반환합니다.
    pub async fn ready(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = self.pacer.wait() => true,
        }
    }

    /// 청크 하나를 조회하고 결과를 분류합니다.
    ///
    /// 실패는 에러가 아니라 `FetchOutcome::Failed`로 반환됩니다.
    pub async fn fetch(
        &mut self,
        session: &Session,
        instrument: &Instrument,
        window: &FetchWindow,
    ) -> FetchOutcome {
        self.pacer.wait().await;

        let request = CandleRequest {
            exchange: instrument.exchange_segment.clone(),
            symbol_token: instrument.provider_token.clone(),
            window: *window,
        };

        let result = tokio::time::timeout(
            self.request_timeout,
            self.provider.get_candles(session.jwt(), &request),
        )
        .await;

        // 결과와 관계없이 호출 종료 시점 기록
        self.pacer.mark();

        match result {
            Err(_) => FetchOutcome::Failed(format!(
                "request timed out after {:.1}s",
                self.request_timeout.as_secs_f64()
            )),
            Ok(Err(e)) => FetchOutcome::Failed(e.to_string()),
            Ok(Ok(response)) => classify(response, &instrument.symbol, window),
        }
    }
}

/// 제공자 응답을 분류합니다.
///
/// - `status: false` → `Failed` (제공자 메시지 그대로)
/// - 데이터 없음 → `Empty`
/// - 그 외 → 행 단위 파싱 후 `Data`. 잘못된 행은 버리고 개수만 셉니다.
pub fn classify(response: CandleResponse, symbol: &str, window: &FetchWindow) -> FetchOutcome {
    if !response.status {
        let reason = match response.error_code.as_deref() {
            Some(code) if !code.is_empty() => format!("{} ({})", response.message, code),
            _ if response.message.is_empty() => "provider reported failure".to_string(),
            _ => response.message,
        };
        return FetchOutcome::Failed(reason);
    }

    let rows = match response.data {
        Some(rows) if !rows.is_empty() => rows,
        _ => return FetchOutcome::Empty,
    };

    let total = rows.len();
    let mut candles = Vec::with_capacity(total);
    let mut rejected_rows = 0usize;
    let mut outside = 0usize;

    for (idx, row) in rows.iter().enumerate() {
        match parse_row(symbol, row) {
            Ok(candle) if window.contains(candle.timestamp) => candles.push(candle),
            Ok(_) => outside += 1,
            Err(e) => {
                rejected_rows += 1;
                warn!(symbol, row = idx, error = %e, "잘못된 캔들 행 버림");
            }
        }
    }

    if outside > 0 {
        debug!(symbol, outside, window = %window, "구간 밖 행 제외");
    }

    if candles.is_empty() {
        if rejected_rows > 0 {
            return FetchOutcome::Failed(format!(
                "all {} rows malformed ({} rejected)",
                total, rejected_rows
            ));
        }
        return FetchOutcome::Empty;
    }

    candles.sort_by_key(|c| c.timestamp);
    candles.dedup_by_key(|c| c.timestamp);

    FetchOutcome::Data {
        candles,
        rejected_rows,
    }
}

/// `[timestamp, open, high, low, close, volume]` 행 하나를 캔들로 변환합니다.
///
/// 타임스탬프는 고정 오프셋 ISO-8601 (예: `2024-01-01T09:15:00+05:30`)이며 UTC로 정규화합니다.
pub fn parse_row(symbol: &str, row: &[Value]) -> IngestResult<Candle> {
    let [ts, open, high, low, close, volume] = row else {
        return Err(IngestError::MalformedRow(format!(
            "열이 6개여야 하는데 {}개",
            row.len()
        )));
    };

    Candle::new(
        symbol,
        parse_timestamp(ts)?,
        parse_price("open", open)?,
        parse_price("high", high)?,
        parse_price("low", low)?,
        parse_price("close", close)?,
        parse_volume(volume)?,
    )
}

fn parse_timestamp(value: &Value) -> IngestResult<DateTime<Utc>> {
    let raw = value.as_str().ok_or_else(|| IngestError::MalformedTimestamp {
        raw: value.to_string(),
        reason: "문자열이 아님".to_string(),
    })?;

    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| IngestError::MalformedTimestamp {
            raw: raw.to_string(),
            reason: e.to_string(),
        })
}

fn parse_price(field: &str, value: &Value) -> IngestResult<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        other => {
            return Err(IngestError::MalformedRow(format!(
                "{} 값이 숫자가 아님: {}",
                field, other
            )))
        }
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| IngestError::MalformedRow(format!("{} 값 '{}': {}", field, text, e)))
}

fn parse_volume(value: &Value) -> IngestResult<i64> {
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    parsed.ok_or_else(|| IngestError::MalformedRow(format!("거래량 값이 정수가 아님: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use feed_broker::{
        BrokerError, BrokerResult, Credentials, LoginGrant, OtpSource, ProviderSession,
    };
    use feed_core::Interval;
    use rust_decimal_macros::dec;
    use secrecy::SecretString;
    use serde_json::json;
    use std::sync::Mutex;

    fn window() -> FetchWindow {
        FetchWindow::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            Interval::OneMinute,
        )
        .unwrap()
    }

    fn ok_response(rows: Vec<Vec<Value>>) -> CandleResponse {
        CandleResponse {
            status: true,
            message: "SUCCESS".to_string(),
            error_code: Some(String::new()),
            data: Some(rows),
        }
    }

    fn minute_rows(count: usize) -> Vec<Vec<Value>> {
        // 09:15 IST = 03:45 UTC
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 3, 45, 0).unwrap();
        (0..count)
            .map(|i| {
                let ts = (start + ChronoDuration::minutes(i as i64))
                    .with_timezone(&chrono::FixedOffset::east_opt(19800).unwrap())
                    .to_rfc3339();
                vec![json!(ts), json!(450.5), json!(451.0), json!(449.8), json!(450.9), json!(1200)]
            })
            .collect()
    }

    #[test]
    fn test_empty_payload_is_empty_not_failed() {
        assert_eq!(classify(ok_response(vec![]), "WIPRO", &window()), FetchOutcome::Empty);

        let mut no_data = ok_response(vec![]);
        no_data.data = None;
        assert_eq!(classify(no_data, "WIPRO", &window()), FetchOutcome::Empty);
    }

    #[test]
    fn test_data_row_count_matches_payload() {
        let outcome = classify(ok_response(minute_rows(375)), "WIPRO", &window());
        assert_eq!(outcome.label(), "data");
        assert_eq!(outcome.row_count(), 375);
    }

    #[test]
    fn test_provider_failure_reason_preserved() {
        let response = CandleResponse {
            status: false,
            message: "Something Went Wrong, Please Try After Sometime".to_string(),
            error_code: Some("AB1004".to_string()),
            data: None,
        };
        assert_eq!(
            classify(response, "WIPRO", &window()),
            FetchOutcome::Failed("Something Went Wrong, Please Try After Sometime (AB1004)".into())
        );
    }

    #[test]
    fn test_one_malformed_timestamp_in_fifty_rows() {
        let mut rows = minute_rows(50);
        rows[17][0] = json!("2024-13-45 99:99");

        match classify(ok_response(rows), "WIPRO", &window()) {
            FetchOutcome::Data {
                candles,
                rejected_rows,
            } => {
                assert_eq!(candles.len(), 49);
                assert_eq!(rejected_rows, 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_all_rows_malformed_is_failed() {
        let rows = vec![vec![json!("garbage")], vec![json!(1), json!(2)]];
        assert_eq!(classify(ok_response(rows), "WIPRO", &window()).label(), "failed");
    }

    #[test]
    fn test_rows_outside_window_are_dropped() {
        let mut rows = minute_rows(3);
        rows.push(vec![
            json!("2024-01-02T09:15:00+05:30"),
            json!(1),
            json!(1),
            json!(1),
            json!(1),
            json!(1),
        ]);
        assert_eq!(classify(ok_response(rows), "WIPRO", &window()).row_count(), 3);

        let outside = vec![vec![
            json!("2023-12-29T09:15:00+05:30"),
            json!(1),
            json!(1),
            json!(1),
            json!(1),
            json!(1),
        ]];
        assert_eq!(classify(ok_response(outside), "WIPRO", &window()), FetchOutcome::Empty);
    }

    #[test]
    fn test_parse_row_normalizes_to_utc() {
        let row = vec![
            json!("2024-01-01T09:15:00+05:30"),
            json!("450.50"),
            json!(451),
            json!(449.8),
            json!(450.9),
            json!(1200.0),
        ];
        let candle = parse_row("WIPRO", &row).unwrap();
        assert_eq!(
            candle.timestamp,
            Utc.with_ymd_and_hms(2024, 1, 1, 3, 45, 0).unwrap()
        );
        assert_eq!(candle.open, dec!(450.50));
        assert_eq!(candle.high, dec!(451));
        assert_eq!(candle.volume, 1200);
    }

    #[test]
    fn test_parse_row_rejects_negative_and_bad_values() {
        let negative = vec![
            json!("2024-01-01T09:15:00+05:30"),
            json!(-1),
            json!(1),
            json!(1),
            json!(1),
            json!(1),
        ];
        assert!(parse_row("WIPRO", &negative).is_err());

        let bad_volume = vec![
            json!("2024-01-01T09:15:00+05:30"),
            json!(1),
            json!(1),
            json!(1),
            json!(1),
            json!(1.5),
        ];
        assert!(parse_row("WIPRO", &bad_volume).is_err());

        let bad_ts = vec![json!(1704080700), json!(1), json!(1), json!(1), json!(1), json!(1)];
        assert!(matches!(
            parse_row("WIPRO", &bad_ts),
            Err(IngestError::MalformedTimestamp { .. })
        ));
    }

    /// 호출 시각을 기록하는 제공자.
    struct RecordingProvider {
        calls: Mutex<Vec<Instant>>,
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl HistoricalDataProvider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        async fn login(
            &self,
            _client_code: &str,
            _pin: &SecretString,
            _otp: &str,
        ) -> BrokerResult<LoginGrant> {
            Ok(LoginGrant {
                jwt_token: SecretString::new("jwt".to_string().into()),
                refresh_token: None,
                feed_token: None,
            })
        }

        async fn get_candles(
            &self,
            _jwt: &SecretString,
            _request: &CandleRequest,
        ) -> BrokerResult<CandleResponse> {
            self.calls.lock().unwrap().push(Instant::now());
            tokio::time::sleep(self.delay).await;
            if self.fail {
                Err(BrokerError::NetworkError("connection reset".into()))
            } else {
                Ok(ok_response(vec![]))
            }
        }

        async fn logout(&self, _jwt: &SecretString, _client_code: &str) -> BrokerResult<()> {
            Ok(())
        }
    }

    async fn open_session(provider: Arc<RecordingProvider>) -> Session {
        let credentials = Credentials::new(
            "A123",
            SecretString::new("1234".to_string().into()),
            OtpSource::Static(SecretString::new("123456".to_string().into())),
        );
        ProviderSession::new(provider).open(&credentials).await.unwrap()
    }

    fn instrument() -> Instrument {
        Instrument::new("WIPRO-EQ", "WIPRO", "NSE", "3787")
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_measured_from_end_of_previous_call() {
        let provider = Arc::new(RecordingProvider {
            calls: Mutex::new(Vec::new()),
            delay: Duration::from_millis(300),
            fail: true,
        });
        let session = open_session(provider.clone()).await;
        let mut fetcher =
            CandleFetcher::new(provider.clone(), Duration::from_secs(1), Duration::from_secs(5));

        for _ in 0..3 {
            let outcome = fetcher.fetch(&session, &instrument(), &window()).await;
            assert_eq!(outcome, FetchOutcome::Failed("Network error: connection reset".into()));
        }

        let calls = provider.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            // 이전 호출 300ms + 간격 1s
            assert!(pair[1] - pair[0] >= Duration::from_millis(1300));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_failed_with_reason() {
        let provider = Arc::new(RecordingProvider {
            calls: Mutex::new(Vec::new()),
            delay: Duration::from_secs(60),
            fail: false,
        });
        let session = open_session(provider.clone()).await;
        let mut fetcher = CandleFetcher::new(provider, Duration::ZERO, Duration::from_secs(2));

        match fetcher.fetch(&session, &instrument(), &window()).await {
            FetchOutcome::Failed(reason) => assert!(reason.contains("timed out after 2.0s")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_interrupted_by_cancellation() {
        let provider = Arc::new(RecordingProvider {
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            fail: false,
        });
        let session = open_session(provider.clone()).await;
        let mut fetcher = CandleFetcher::new(provider, Duration::from_secs(3600), Duration::from_secs(5));
        fetcher.fetch(&session, &instrument(), &window()).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!fetcher.ready(&cancel).await);
        assert!(fetcher.ready(&CancellationToken::new()).await);
    }
}
