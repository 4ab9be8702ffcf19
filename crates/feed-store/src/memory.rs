//! 프로세스 내 메모리 저장소.
//!
//! 테스트와 드라이런에 사용합니다. PostgreSQL 저장소와 같은 충돌 규칙을 따릅니다.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_core::{Candle, Instrument};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::store::{dedup_latest, ConflictPolicy, IngestionStore};

#[derive(Default)]
struct Inner {
    instruments: BTreeMap<String, Instrument>,
    candles: HashMap<String, BTreeMap<DateTime<Utc>, Candle>>,
}

/// 메모리 캔들 저장소.
#[derive(Default)]
pub struct MemoryCandleStore {
    inner: RwLock<Inner>,
}

impl MemoryCandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 종목의 저장된 캔들 (시간순).
    pub async fn candles(&self, symbol: &str) -> Vec<Candle> {
        self.inner
            .read()
            .await
            .candles
            .get(symbol)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl IngestionStore for MemoryCandleStore {
    async fn register_instrument(&self, instrument: &Instrument) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .instruments
            .insert(instrument.symbol.clone(), instrument.clone());
        inner.candles.entry(instrument.symbol.clone()).or_default();
        Ok(())
    }

    async fn upsert(&self, candles: &[Candle], policy: ConflictPolicy) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;

        for candle in candles {
            if !inner.instruments.contains_key(&candle.instrument) {
                return Err(StoreError::UnknownInstrument(candle.instrument.clone()));
            }
        }

        let mut written = 0u64;
        for candle in dedup_latest(candles) {
            let rows = inner.candles.entry(candle.instrument.clone()).or_default();
            match (rows.contains_key(&candle.timestamp), policy) {
                (false, _) => {
                    rows.insert(candle.timestamp, candle.clone());
                    written += 1;
                }
                (true, ConflictPolicy::Overwrite) => {
                    rows.insert(candle.timestamp, candle.clone());
                    written += 1;
                }
                (true, ConflictPolicy::Skip) => {}
            }
        }

        debug!(count = candles.len(), written, %policy, "Memory upsert");
        Ok(written)
    }

    async fn last_timestamp(&self, symbol: &str) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self
            .inner
            .read()
            .await
            .candles
            .get(symbol)
            .and_then(|rows| rows.keys().next_back().copied()))
    }

    async fn candle_count(&self, symbol: &str) -> StoreResult<i64> {
        Ok(self
            .inner
            .read()
            .await
            .candles
            .get(symbol)
            .map(|rows| rows.len() as i64)
            .unwrap_or(0))
    }

    async fn instruments(&self) -> StoreResult<Vec<Instrument>> {
        Ok(self.inner.read().await.instruments.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn wipro() -> Instrument {
        Instrument::new("WIPRO", "WIPRO-EQ", "NSE", "3787")
    }

    fn minute_candles(count: i64) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 3, 45, 0).unwrap();
        (0..count)
            .map(|i| {
                Candle::new(
                    "WIPRO",
                    start + Duration::minutes(i),
                    dec!(450.5),
                    dec!(451.0),
                    dec!(449.8),
                    dec!(450.9),
                    1000 + i,
                )
                .unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = MemoryCandleStore::new();
        store.register_instrument(&wipro()).await.unwrap();
        let candles = minute_candles(30);

        let first = store.upsert(&candles, ConflictPolicy::Skip).await.unwrap();
        let snapshot = store.candles("WIPRO").await;
        let second = store.upsert(&candles, ConflictPolicy::Skip).await.unwrap();

        assert_eq!(first, 30);
        assert_eq!(second, 0);
        assert_eq!(store.candle_count("WIPRO").await.unwrap(), 30);
        assert_eq!(store.candles("WIPRO").await, snapshot);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_values() {
        let store = MemoryCandleStore::new();
        store.register_instrument(&wipro()).await.unwrap();
        let mut candles = minute_candles(5);
        store.upsert(&candles, ConflictPolicy::Skip).await.unwrap();

        candles[2].close = dec!(455.0);

        // Skip은 기존 값을 유지
        assert_eq!(store.upsert(&candles, ConflictPolicy::Skip).await.unwrap(), 0);
        assert_eq!(store.candles("WIPRO").await[2].close, dec!(450.9));

        // Overwrite는 전부 다시 씀
        assert_eq!(store.upsert(&candles, ConflictPolicy::Overwrite).await.unwrap(), 5);
        assert_eq!(store.candles("WIPRO").await[2].close, dec!(455.0));
        assert_eq!(store.candle_count("WIPRO").await.unwrap(), 5);

        // 다시 Overwrite해도 상태는 같음
        store.upsert(&candles, ConflictPolicy::Overwrite).await.unwrap();
        assert_eq!(store.candles("WIPRO").await, candles);
    }

    #[tokio::test]
    async fn test_last_timestamp() {
        let store = MemoryCandleStore::new();
        store.register_instrument(&wipro()).await.unwrap();
        assert_eq!(store.last_timestamp("WIPRO").await.unwrap(), None);

        let candles = minute_candles(10);
        store.upsert(&candles, ConflictPolicy::Skip).await.unwrap();

        assert_eq!(
            store.last_timestamp("WIPRO").await.unwrap(),
            Some(candles[9].timestamp)
        );
        assert_eq!(store.last_timestamp("INFY").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unregistered_instrument_is_rejected() {
        let store = MemoryCandleStore::new();
        let err = store
            .upsert(&minute_candles(1), ConflictPolicy::Skip)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownInstrument(_)));
    }
}
