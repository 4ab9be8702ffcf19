//! Minute-candle collector CLI.

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use feed_broker::{ProviderSession, ScripMasterCatalog, SmartApiClient, SymbolResolver};
use feed_collector::config::parse_start_date;
use feed_collector::modules::{run_many, BackfillConfig, BackfillOrchestrator};
use feed_collector::{CollectorConfig, ProviderConfig, RunStatus, RunSummary};
use feed_core::{init_logging, IngestResult, LogConfig};
use feed_store::{IngestionStore, MemoryCandleStore, PgCandleStore};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "feed-collector")]
#[command(about = "Resumable minute-candle collector", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// DB 대신 메모리 저장소 사용
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// 지정 구간 전체 백필
    Backfill {
        /// 종목명 (여러 번 지정 가능)
        #[arg(long = "symbol", required = true)]
        symbols: Vec<String>,

        /// 거래소 세그먼트
        #[arg(long, default_value = "NSE")]
        exchange: String,

        /// 시작 (YYYY-MM-DD 또는 RFC 3339, 포함)
        #[arg(long)]
        start: String,

        /// 종료 (YYYY-MM-DD 또는 RFC 3339, 미포함)
        #[arg(long)]
        end: String,
    },

    /// 마지막 저장 시각 이후만 수집
    Update {
        /// 종목명 (생략하면 INGEST_SYMBOLS)
        #[arg(long = "symbol")]
        symbols: Vec<String>,

        /// 거래소 세그먼트 (생략하면 INGEST_EXCHANGE)
        #[arg(long)]
        exchange: Option<String>,
    },

    /// 데몬 모드: 주기적으로 증분 수집
    Daemon,

    /// 저장 현황 출력
    Status,

    /// 종목명을 제공자 토큰으로 해석
    Resolve {
        /// 종목명
        name: String,

        /// 거래소 세그먼트
        #[arg(long, default_value = "NSE")]
        exchange: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = format!("feed_collector={0},feed_broker={0},feed_store={0}", cli.log_level);
    init_logging(LogConfig::new(log_level).format_from_env())
        .map_err(|e| anyhow::anyhow!("로깅 초기화 실패: {}", e))?;

    tracing::info!("Feed Collector 시작");

    let config = CollectorConfig::from_env()?;
    tracing::debug!(
        interval = %config.ingest.interval,
        fallback_start = %config.ingest.fallback_start,
        dry_run = cli.dry_run,
        "설정 로드 완료"
    );

    match cli.command {
        Commands::Resolve { name, exchange } => {
            let resolver = resolver(&config)?;
            let instrument = resolver.resolve(&name, &exchange).await?;
            println!(
                "{}\t{}\t{}\t{}",
                instrument.symbol,
                instrument.display_name,
                instrument.exchange_segment,
                instrument.provider_token
            );
        }
        Commands::Status => {
            let store = open_store(&config, cli.dry_run).await?;
            print_status(store.as_ref()).await?;
        }
        Commands::Backfill {
            symbols,
            exchange,
            start,
            end,
        } => {
            let start = parse_start_date(&start)?;
            let end = parse_start_date(&end)?;
            let runs: Vec<BackfillConfig> = symbols
                .iter()
                .map(|s| config.ingest.backfill(s, &exchange, start, end))
                .collect();

            let orchestrator = orchestrator(&config, cli.dry_run).await?;
            watch_ctrl_c(orchestrator.cancellation_token());
            let results = run_many(&orchestrator, &runs).await;
            report(&results)?;
        }
        Commands::Update { symbols, exchange } => {
            let symbols = if symbols.is_empty() {
                config.daemon.symbols.clone()
            } else {
                symbols
            };
            if symbols.is_empty() {
                bail!("--symbol 또는 INGEST_SYMBOLS가 필요합니다");
            }
            let exchange = exchange.unwrap_or_else(|| config.daemon.exchange.clone());
            let runs: Vec<BackfillConfig> = symbols
                .iter()
                .map(|s| config.ingest.update(s, &exchange))
                .collect();

            let orchestrator = orchestrator(&config, cli.dry_run).await?;
            watch_ctrl_c(orchestrator.cancellation_token());
            let results = run_many(&orchestrator, &runs).await;
            report(&results)?;
        }
        Commands::Daemon => {
            if config.daemon.symbols.is_empty() {
                bail!("데몬 모드에는 INGEST_SYMBOLS가 필요합니다");
            }
            let runs: Vec<BackfillConfig> = config
                .daemon
                .symbols
                .iter()
                .map(|s| config.ingest.update(s, &config.daemon.exchange))
                .collect();

            let orchestrator = orchestrator(&config, cli.dry_run).await?;
            let cancel = orchestrator.cancellation_token();
            watch_ctrl_c(cancel.clone());

            tracing::info!(
                "=== 데몬 모드 시작 (주기: {}분, 종목 {}개) ===",
                config.daemon.interval_minutes,
                runs.len()
            );

            let mut interval = tokio::time::interval(config.daemon.interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("종료 신호 수신, 데몬 종료 중...");
                        break;
                    }
                    _ = interval.tick() => {
                        tracing::info!("=== 증분 수집 시작 ===");
                        let results = run_many(&orchestrator, &runs).await;
                        if let Err(e) = report(&results) {
                            tracing::error!("증분 수집 실패: {}", e);
                        }
                        tracing::info!(
                            "=== 증분 수집 완료, 다음 실행: {}분 후 ===",
                            config.daemon.interval_minutes
                        );
                    }
                }
            }
        }
    }

    tracing::info!("Feed Collector 종료");
    Ok(())
}

fn resolver(config: &CollectorConfig) -> anyhow::Result<Arc<SymbolResolver>> {
    let catalog = ScripMasterCatalog::with_url(
        config.scrip_master_url.clone(),
        config.ingest.request_timeout_secs.max(60),
    )?;
    Ok(Arc::new(SymbolResolver::new(Arc::new(catalog))))
}

async fn open_store(
    config: &CollectorConfig,
    dry_run: bool,
) -> anyhow::Result<Arc<dyn IngestionStore>> {
    if dry_run {
        tracing::warn!("드라이런: 메모리 저장소 사용, 결과는 저장되지 않습니다");
        return Ok(Arc::new(MemoryCandleStore::new()));
    }

    let url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL 환경변수가 설정되지 않았습니다 (--dry-run으로 DB 없이 실행 가능)")?;
    let store = PgCandleStore::connect(url, config.database_max_connections)
        .await?
        .with_batch_size(config.ingest.batch_size);
    store.ensure_schema().await?;
    Ok(Arc::new(store))
}

async fn orchestrator(
    config: &CollectorConfig,
    dry_run: bool,
) -> anyhow::Result<BackfillOrchestrator> {
    let provider = ProviderConfig::from_env()?;
    let client = SmartApiClient::new(provider.api)?;
    let store = open_store(config, dry_run).await?;

    Ok(BackfillOrchestrator::new(
        resolver(config)?,
        ProviderSession::new(Arc::new(client)),
        store,
        Arc::new(provider.credentials),
        config.ingest.fetch_settings(),
    ))
}

/// Ctrl-C를 받으면 진행 중인 수집을 취소합니다.
fn watch_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C 수신, 현재 청크 이후 중단합니다");
            cancel.cancel();
        }
    });
}

fn report(results: &[(String, IngestResult<RunSummary>)]) -> anyhow::Result<()> {
    let mut fatal = 0;
    for (symbol, result) in results {
        match result {
            Ok(summary) => println!(
                "{}\t{}\tchunks={}/{}\tdata={}\tempty={}\tfailed={}\trows={}\trejected={}",
                summary.symbol,
                summary.status(),
                summary.total_chunks,
                summary.planned_chunks,
                summary.chunks_with_data,
                summary.chunks_empty,
                summary.chunks_failed,
                summary.total_rows_inserted,
                summary.rows_rejected
            ),
            Err(e) => {
                fatal += 1;
                println!("{}\terror\t{}", symbol.to_uppercase(), e);
            }
        }
    }

    let degraded = results
        .iter()
        .filter(|(_, r)| matches!(r, Ok(s) if s.status() == RunStatus::Degraded))
        .count();
    if degraded > 0 {
        tracing::warn!(degraded, "일부 청크 실패, 같은 명령을 다시 실행하면 빈 구간을 채웁니다");
    }

    if fatal > 0 {
        bail!("{}개 종목 수집 실패", fatal);
    }
    Ok(())
}

async fn print_status(store: &dyn IngestionStore) -> anyhow::Result<()> {
    let instruments = store.instruments().await?;
    if instruments.is_empty() {
        println!("등록된 종목 없음");
        return Ok(());
    }

    for instrument in instruments {
        let count = store.candle_count(&instrument.symbol).await?;
        let last = store
            .last_timestamp(&instrument.symbol)
            .await?
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}\t{}\t{}\trows={}\tlast={}",
            instrument.symbol, instrument.exchange_segment, instrument.provider_token, count, last
        );
    }
    Ok(())
}
