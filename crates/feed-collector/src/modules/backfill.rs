//! 백필/증분 수집 오케스트레이터.
//!
//! # 동작 방식
//!
//! 1. 종목 해석 후 저장소에 종목 등록
//! 2. 세션 열기 (인증 실패는 여기서 끝남)
//! 3. 수집 구간 계산 (전체 구간 또는 마지막 저장 시각 이후)
//! 4. 청크마다 조회 → 분류 → 저장, 청크 실패는 기록만 하고 다음 청크로 진행
//! 5. 세션 종료 후 요약 반환
//!
//! 청크 루프 진입 전의 에러(인증, 종목 해석, 설정, 커서 조회)만 `Err`로 반환됩니다.
//! 세션은 [`SessionGuard`](feed_broker::SessionGuard)가 쥐고 있어서, 에러로 빠져나가거나
//! 실행 future가 중간에 버려져도 로그아웃됩니다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Utc};
use feed_broker::{Credentials, ProviderSession, Session, SymbolResolver};
use feed_core::{ingest_span, FetchOutcome, FetchWindow, IngestResult, Instrument, Interval};
use feed_store::{ConflictPolicy, IngestionStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument as _};

use super::chunker::{chunks, effective_span, Chunks};
use super::fetcher::CandleFetcher;
use crate::stats::RunSummary;

/// 수집 구간 결정 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// 지정한 `[start, end)` 전체
    Full {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// 마지막 저장 시각 다음 캔들부터 현재까지 (저장된 행이 없으면 `fallback_start`부터)
    Incremental { fallback_start: DateTime<Utc> },
}

impl RunMode {
    pub fn label(&self) -> &'static str {
        match self {
            RunMode::Full { .. } => "backfill",
            RunMode::Incremental { .. } => "update",
        }
    }
}

/// 종목 하나의 수집 설정.
#[derive(Debug, Clone)]
pub struct BackfillConfig {
    /// 종목명 또는 거래 심볼
    pub symbol: String,
    /// 거래소 세그먼트
    pub exchange: String,
    /// 구간 결정 방식
    pub mode: RunMode,
    /// 캔들 간격
    pub interval: Interval,
    /// 요청당 최대 기간 (없으면 간격별 기본 한도)
    pub max_span: Option<ChronoDuration>,
    /// 요청당 최대 행 수 (0이면 제한 없음)
    pub max_rows: u32,
    /// 충돌 정책
    pub conflict_policy: ConflictPolicy,
    /// 진행 로그 주기 (청크 수, 0이면 끄기)
    pub progress_every: usize,
}

impl BackfillConfig {
    /// 전체 구간 백필 설정 (충돌 시 기존 행 유지).
    pub fn full(
        symbol: impl Into<String>,
        exchange: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            exchange: exchange.into(),
            mode: RunMode::Full { start, end },
            interval: Interval::OneMinute,
            max_span: None,
            max_rows: 0,
            conflict_policy: ConflictPolicy::Skip,
            progress_every: 10,
        }
    }

    /// 증분 업데이트 설정 (충돌 시 덮어씀).
    pub fn incremental(
        symbol: impl Into<String>,
        exchange: impl Into<String>,
        fallback_start: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            exchange: exchange.into(),
            mode: RunMode::Incremental { fallback_start },
            interval: Interval::OneMinute,
            max_span: None,
            max_rows: 0,
            conflict_policy: ConflictPolicy::Overwrite,
            progress_every: 10,
        }
    }

    /// 청크 길이.
    pub fn chunk_span(&self) -> ChronoDuration {
        let max_span = self.max_span.unwrap_or_else(|| self.interval.max_span());
        effective_span(self.interval, max_span, self.max_rows)
    }
}

/// 호출 간격과 타임아웃.
#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    /// 호출 간 최소 간격
    pub request_delay: Duration,
    /// 요청 타임아웃
    pub request_timeout: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_millis(500),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// 백필 오케스트레이터.
pub struct BackfillOrchestrator {
    resolver: Arc<SymbolResolver>,
    sessions: ProviderSession,
    store: Arc<dyn IngestionStore>,
    credentials: Arc<Credentials>,
    fetch: FetchSettings,
    cancel: CancellationToken,
}

impl BackfillOrchestrator {
    /// 새 오케스트레이터 생성.
    pub fn new(
        resolver: Arc<SymbolResolver>,
        sessions: ProviderSession,
        store: Arc<dyn IngestionStore>,
        credentials: Arc<Credentials>,
        fetch: FetchSettings,
    ) -> Self {
        Self {
            resolver,
            sessions,
            store,
            credentials,
            fetch,
            cancel: CancellationToken::new(),
        }
    }

    /// 외부 취소 토큰 지정.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 취소 토큰.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 현재 시각 기준으로 실행.
    pub async fn run(&self, config: &BackfillConfig) -> IngestResult<RunSummary> {
        self.run_at(config, Utc::now()).await
    }

    /// `now`를 현재 시각으로 보고 실행.
    pub async fn run_at(
        &self,
        config: &BackfillConfig,
        now: DateTime<Utc>,
    ) -> IngestResult<RunSummary> {
        let span = ingest_span!(config.symbol, config.mode.label());
        self.run_inner(config, now).instrument(span).await
    }

    async fn run_inner(
        &self,
        config: &BackfillConfig,
        now: DateTime<Utc>,
    ) -> IngestResult<RunSummary> {
        let started = Instant::now();
        let mut summary = RunSummary::new(config.symbol.to_uppercase());

        let instrument = self.resolver.resolve(&config.symbol, &config.exchange).await?;
        self.store.register_instrument(&instrument).await?;
        summary.symbol = instrument.symbol.clone();

        let guard = self.sessions.open_guarded(&self.credentials).await?;

        let plan = match self.plan(config, &instrument, now).await {
            Ok(plan) => plan,
            Err(e) => {
                guard.close().await;
                return Err(e);
            }
        };

        match plan {
            Some((window, plan)) => {
                summary.planned_chunks = plan.clone().count();
                info!(
                    symbol = %instrument.symbol,
                    window = %window,
                    chunks = summary.planned_chunks,
                    policy = %config.conflict_policy,
                    "수집 구간 설정 완료"
                );
                self.drive(guard.session(), &instrument, config, plan, &mut summary)
                    .await;
            }
            None => info!(symbol = %instrument.symbol, "이미 최신 상태, 수집할 구간 없음"),
        }

        // 루프 도중 future가 버려지거나 패닉이 나면 가드의 Drop이 로그아웃을 예약한다
        guard.close().await;

        summary.elapsed = started.elapsed();
        summary.log_summary(config.mode.label());
        Ok(summary)
    }

    /// 수집 구간과 청크 계획. 수집할 것이 없으면 `None`.
    async fn plan(
        &self,
        config: &BackfillConfig,
        instrument: &Instrument,
        now: DateTime<Utc>,
    ) -> IngestResult<Option<(FetchWindow, Chunks)>> {
        match self.target_window(config, instrument, now).await? {
            Some(window) => Ok(Some((window, chunks(&window, config.chunk_span())?))),
            None => Ok(None),
        }
    }

    /// 수집 구간 계산. 수집할 것이 없으면 `None`.
    async fn target_window(
        &self,
        config: &BackfillConfig,
        instrument: &Instrument,
        now: DateTime<Utc>,
    ) -> IngestResult<Option<FetchWindow>> {
        let (from, to) = match config.mode {
            RunMode::Full { start, end } => {
                return FetchWindow::new(start, end, config.interval).map(Some);
            }
            RunMode::Incremental { fallback_start } => {
                let last = self.store.last_timestamp(&instrument.symbol).await?;
                let from = match last {
                    Some(ts) => {
                        debug!(last = %ts, "마지막 저장 시각");
                        ts + config.interval.duration()
                    }
                    None => {
                        info!(fallback = %fallback_start, "저장된 데이터 없음, 기본 시작일 사용");
                        fallback_start
                    }
                };
                let to = now
                    .duration_trunc(ChronoDuration::minutes(1))
                    .unwrap_or(now);
                (from, to)
            }
        };

        if from >= to {
            return Ok(None);
        }
        FetchWindow::new(from, to, config.interval).map(Some)
    }

    /// 청크 루프. 어떤 실패도 밖으로 내보내지 않습니다.
    async fn drive(
        &self,
        session: &Session,
        instrument: &Instrument,
        config: &BackfillConfig,
        plan: Chunks,
        summary: &mut RunSummary,
    ) {
        let mut fetcher = CandleFetcher::new(
            self.sessions.provider().clone(),
            self.fetch.request_delay,
            self.fetch.request_timeout,
        );

        for chunk in plan {
            if self.cancel.is_cancelled() || !fetcher.ready(&self.cancel).await {
                warn!(
                    symbol = %instrument.symbol,
                    next = %chunk,
                    done = summary.total_chunks,
                    "취소 신호 수신, 남은 청크 중단"
                );
                summary.cancelled = true;
                break;
            }

            summary.total_chunks += 1;

            match fetcher.fetch(session, instrument, &chunk).await {
                FetchOutcome::Data {
                    candles,
                    rejected_rows,
                } => {
                    summary.chunks_with_data += 1;
                    summary.rows_rejected += rejected_rows;

                    match self.store.upsert(&candles, config.conflict_policy).await {
                        Ok(written) => {
                            summary.total_rows_inserted += written;
                            debug!(
                                chunk = %chunk,
                                rows = candles.len(),
                                written,
                                rejected = rejected_rows,
                                "청크 저장 완료"
                            );
                        }
                        Err(e) => {
                            summary.store_failures += 1;
                            error!(chunk = %chunk, rows = candles.len(), error = %e, "청크 저장 실패");
                        }
                    }
                }
                FetchOutcome::Empty => {
                    summary.chunks_empty += 1;
                    debug!(chunk = %chunk, "데이터 없음");
                }
                FetchOutcome::Failed(reason) => {
                    summary.chunks_failed += 1;
                    error!(chunk = %chunk, reason = %reason, "청크 조회 실패, 건너뜀");
                }
            }

            if config.progress_every > 0 && summary.total_chunks % config.progress_every == 0 {
                info!(
                    symbol = %instrument.symbol,
                    progress = format!("{}/{}", summary.total_chunks, summary.planned_chunks),
                    pct = format!("{:.1}%", summary.progress_pct()),
                    rows = summary.total_rows_inserted,
                    failed = summary.chunks_failed,
                    "진행 중"
                );
            }
        }
    }
}

/// 여러 종목을 순서대로 수집합니다.
///
/// 종목마다 세션을 따로 열며, 한 종목의 치명적 에러는 다음 종목 수집을 막지 않습니다.
/// 취소되면 남은 종목은 시작하지 않습니다.
pub async fn run_many(
    orchestrator: &BackfillOrchestrator,
    configs: &[BackfillConfig],
) -> Vec<(String, IngestResult<RunSummary>)> {
    let mut results = Vec::with_capacity(configs.len());
    let cancel = orchestrator.cancellation_token();

    for config in configs {
        if cancel.is_cancelled() {
            warn!(symbol = %config.symbol, "취소됨, 남은 종목 건너뜀");
            break;
        }

        let result = orchestrator.run(config).await;
        if let Err(e) = &result {
            error!(symbol = %config.symbol, error = %e, "수집 실행 실패");
        }
        results.push((config.symbol.clone(), result));
    }

    results
}
