//! 반열린 조회 구간 `[from, to)`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Interval;
use crate::error::{IngestError, IngestResult};

/// 간격 정보를 포함한 반열린 시간 구간.
///
/// 항상 `from < to`를 만족합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchWindow {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    interval: Interval,
}

impl FetchWindow {
    /// 새 구간을 생성합니다.
    ///
    /// # Errors
    /// `from >= to`이면 `IngestError::Config`를 반환합니다.
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>, interval: Interval) -> IngestResult<Self> {
        if from >= to {
            return Err(IngestError::Config(format!(
                "빈 구간: from({}) >= to({})",
                from, to
            )));
        }
        Ok(Self { from, to, interval })
    }

    /// 구간 시작 (포함).
    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    /// 구간 끝 (미포함).
    pub fn to(&self) -> DateTime<Utc> {
        self.to
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// 구간 길이.
    pub fn span(&self) -> Duration {
        self.to - self.from
    }

    /// 타임스탬프가 구간 안에 있는지 확인합니다.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.from <= ts && ts < self.to
    }
}

impl fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}) {}",
            self.from.format("%Y-%m-%d %H:%M"),
            self.to.format("%Y-%m-%d %H:%M"),
            self.interval
        )
    }
}
