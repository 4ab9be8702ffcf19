//! 캔들 저장소 추상화.
//!
//! 파이프라인은 이 trait에만 의존하므로 PostgreSQL, 메모리 등
//! 어떤 백엔드든 같은 수집 흐름을 사용할 수 있습니다.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_core::{Candle, Instrument};

use crate::error::{StoreError, StoreResult};

/// 이미 저장된 (종목, 시각) 쌍을 다시 쓸 때의 정책.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// 기존 행 유지 (백필 기본값)
    #[default]
    Skip,
    /// OHLCV 값을 덮어씀 (증분 업데이트 기본값)
    Overwrite,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::Skip => "skip",
            ConflictPolicy::Overwrite => "overwrite",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" | "nothing" | "ignore" => Ok(ConflictPolicy::Skip),
            "overwrite" | "update" | "replace" => Ok(ConflictPolicy::Overwrite),
            other => Err(StoreError::InvalidData(format!(
                "알 수 없는 충돌 정책: {}",
                other
            ))),
        }
    }
}

/// 캔들 저장소.
#[async_trait]
pub trait IngestionStore: Send + Sync {
    /// 종목 행을 생성하거나 갱신합니다 (심볼 기준).
    async fn register_instrument(&self, instrument: &Instrument) -> StoreResult<()>;

    /// 캔들을 일괄 저장하고 실제로 쓰인 행 수를 반환합니다.
    ///
    /// 같은 입력을 두 번 저장해도 결과 상태는 한 번 저장한 것과 같습니다.
    /// `Skip`은 새로 삽입된 행만, `Overwrite`는 삽입과 갱신을 모두 셉니다.
    async fn upsert(&self, candles: &[Candle], policy: ConflictPolicy) -> StoreResult<u64>;

    /// 종목의 가장 최근 저장 시각. 행이 없으면 `None`.
    async fn last_timestamp(&self, symbol: &str) -> StoreResult<Option<DateTime<Utc>>>;

    /// 종목의 저장된 캔들 수.
    async fn candle_count(&self, symbol: &str) -> StoreResult<i64>;

    /// 등록된 종목 목록 (심볼 순).
    async fn instruments(&self) -> StoreResult<Vec<Instrument>>;
}

/// 같은 (종목, 시각) 캔들이 여러 번 나오면 마지막 것만 남깁니다.
///
/// PostgreSQL의 `ON CONFLICT DO UPDATE`는 한 문장에서 같은 행을 두 번 건드릴 수 없습니다.
pub(crate) fn dedup_latest(candles: &[Candle]) -> Vec<&Candle> {
    let mut latest: BTreeMap<(&str, DateTime<Utc>), &Candle> = BTreeMap::new();
    for candle in candles {
        latest.insert((candle.instrument.as_str(), candle.timestamp), candle);
    }
    latest.into_values().collect()
}
