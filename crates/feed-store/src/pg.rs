//! PostgreSQL 캔들 저장소.
//!
//! # 동작 방식
//!
//! 1. `register_instrument`로 종목 행을 만들거나 갱신
//! 2. `upsert`가 캔들을 배치 단위 UNNEST 삽입 (`ON CONFLICT (instrument_id, ts)`),
//!    호출 하나는 트랜잭션 하나로 묶임
//! 3. `last_timestamp`로 증분 수집 시작점 계산
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! use feed_store::{ConflictPolicy, IngestionStore, PgCandleStore};
//!
//! let store = PgCandleStore::connect(&database_url, 5).await?;
//! store.ensure_schema().await?;
//! let written = store.upsert(&candles, ConflictPolicy::Skip).await?;
//! ```

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_core::{Candle, Instrument};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::{debug, info, instrument};

use crate::error::{StoreError, StoreResult};
use crate::store::{dedup_latest, ConflictPolicy, IngestionStore};

/// 기본 배치 크기 (문장 하나당 행 수).
pub const DEFAULT_BATCH_SIZE: usize = 500;

const INSERT_SKIP_SQL: &str = r#"
    INSERT INTO candles (instrument_id, ts, open, high, low, close, volume)
    SELECT i.id, u.ts, u.open, u.high, u.low, u.close, u.volume
    FROM UNNEST(
        $1::text[], $2::timestamptz[],
        $3::numeric[], $4::numeric[], $5::numeric[], $6::numeric[], $7::bigint[]
    ) AS u(symbol, ts, open, high, low, close, volume)
    JOIN instruments i ON i.symbol = u.symbol
    ON CONFLICT (instrument_id, ts) DO NOTHING
"#;

const INSERT_OVERWRITE_SQL: &str = r#"
    INSERT INTO candles (instrument_id, ts, open, high, low, close, volume)
    SELECT i.id, u.ts, u.open, u.high, u.low, u.close, u.volume
    FROM UNNEST(
        $1::text[], $2::timestamptz[],
        $3::numeric[], $4::numeric[], $5::numeric[], $6::numeric[], $7::bigint[]
    ) AS u(symbol, ts, open, high, low, close, volume)
    JOIN instruments i ON i.symbol = u.symbol
    ON CONFLICT (instrument_id, ts) DO UPDATE SET
        open = EXCLUDED.open,
        high = EXCLUDED.high,
        low = EXCLUDED.low,
        close = EXCLUDED.close,
        volume = EXCLUDED.volume,
        updated_at = NOW()
"#;

/// 종목 데이터베이스 레코드.
#[derive(Debug, Clone, FromRow)]
struct InstrumentRecord {
    symbol: String,
    display_name: String,
    exchange_segment: String,
    provider_token: String,
}

impl From<InstrumentRecord> for Instrument {
    fn from(r: InstrumentRecord) -> Self {
        Instrument::new(r.symbol, r.display_name, r.exchange_segment, r.provider_token)
    }
}

/// PostgreSQL 캔들 저장소.
#[derive(Clone)]
pub struct PgCandleStore {
    pool: PgPool,
    batch_size: usize,
}

impl PgCandleStore {
    /// 기존 연결 풀로 생성.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// 새 연결 풀을 만들어 생성.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        info!("Database connection established");
        Ok(Self::new(pool))
    }

    /// 배치 크기 변경 (0이면 기본값).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = if batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            batch_size
        };
        self
    }

    /// 내부 연결 풀.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 테이블이 없으면 만듭니다 (내장 마이그레이션 실행).
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        info!("Running database migrations...");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationError(e.to_string()))?;

        info!("Migrations completed successfully");
        Ok(())
    }

    /// 배치의 모든 종목이 등록되어 있는지 확인.
    async fn check_registered(&self, candles: &[&Candle]) -> StoreResult<()> {
        let wanted: BTreeSet<&str> = candles.iter().map(|c| c.instrument.as_str()).collect();
        let wanted: Vec<&str> = wanted.into_iter().collect();

        let found: Vec<(String,)> =
            sqlx::query_as("SELECT symbol FROM instruments WHERE symbol = ANY($1)")
                .bind(&wanted)
                .fetch_all(&self.pool)
                .await?;

        if let Some(missing) = wanted
            .iter()
            .find(|symbol| !found.iter().any(|(s,)| s == **symbol))
        {
            return Err(StoreError::UnknownInstrument(missing.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl IngestionStore for PgCandleStore {
    #[instrument(skip(self, instrument), fields(symbol = %instrument.symbol))]
    async fn register_instrument(&self, instrument: &Instrument) -> StoreResult<()> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO instruments (symbol, display_name, exchange_segment, provider_token)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (symbol) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                exchange_segment = EXCLUDED.exchange_segment,
                provider_token = EXCLUDED.provider_token,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(&instrument.symbol)
        .bind(&instrument.display_name)
        .bind(&instrument.exchange_segment)
        .bind(&instrument.provider_token)
        .fetch_one(&self.pool)
        .await?;

        debug!(id, "종목 등록");
        Ok(())
    }

    #[instrument(skip(self, candles), fields(count = candles.len()))]
    async fn upsert(&self, candles: &[Candle], policy: ConflictPolicy) -> StoreResult<u64> {
        if candles.is_empty() {
            return Ok(0);
        }

        let rows = dedup_latest(candles);
        self.check_registered(&rows).await?;

        let sql = match policy {
            ConflictPolicy::Skip => INSERT_SKIP_SQL,
            ConflictPolicy::Overwrite => INSERT_OVERWRITE_SQL,
        };

        // 배치가 여러 문장으로 나뉘어도 전부 저장되거나 전부 취소된다
        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for chunk in rows.chunks(self.batch_size) {
            let symbols: Vec<&str> = chunk.iter().map(|c| c.instrument.as_str()).collect();
            let timestamps: Vec<DateTime<Utc>> = chunk.iter().map(|c| c.timestamp).collect();
            let opens: Vec<Decimal> = chunk.iter().map(|c| c.open).collect();
            let highs: Vec<Decimal> = chunk.iter().map(|c| c.high).collect();
            let lows: Vec<Decimal> = chunk.iter().map(|c| c.low).collect();
            let closes: Vec<Decimal> = chunk.iter().map(|c| c.close).collect();
            let volumes: Vec<i64> = chunk.iter().map(|c| c.volume).collect();

            let result = sqlx::query(sql)
                .bind(&symbols)
                .bind(&timestamps)
                .bind(&opens)
                .bind(&highs)
                .bind(&lows)
                .bind(&closes)
                .bind(&volumes)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::InsertError(e.to_string()))?;

            written += result.rows_affected();
        }

        tx.commit().await?;

        info!(written, "캔들 저장");
        Ok(written)
    }

    async fn last_timestamp(&self, symbol: &str) -> StoreResult<Option<DateTime<Utc>>> {
        let result: Option<(DateTime<Utc>,)> = sqlx::query_as(
            r#"
            SELECT c.ts FROM candles c
            JOIN instruments i ON i.id = c.instrument_id
            WHERE i.symbol = $1
            ORDER BY c.ts DESC
            LIMIT 1
            "#,
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result.map(|(t,)| t))
    }

    async fn candle_count(&self, symbol: &str) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM candles c
            JOIN instruments i ON i.id = c.instrument_id
            WHERE i.symbol = $1
            "#,
        )
        .bind(symbol)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn instruments(&self) -> StoreResult<Vec<Instrument>> {
        let records: Vec<InstrumentRecord> = sqlx::query_as(
            r#"
            SELECT symbol, display_name, exchange_segment, provider_token
            FROM instruments
            ORDER BY symbol
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Instrument::from).collect())
    }
}
