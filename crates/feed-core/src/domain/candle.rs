//! OHLCV 캔들.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, IngestResult};

/// 분 단위 OHLCV 캔들.
///
/// 타임스탬프는 저장 전에 UTC로 정규화됩니다.
/// (instrument, timestamp) 조합의 유일성은 저장소가 보장합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// 종목 심볼 (`Instrument::symbol`)
    pub instrument: String,
    /// 캔들 시작 시각 (UTC)
    pub timestamp: DateTime<Utc>,
    /// 시가
    pub open: Decimal,
    /// 고가
    pub high: Decimal,
    /// 저가
    pub low: Decimal,
    /// 종가
    pub close: Decimal,
    /// 거래량
    pub volume: i64,
}

impl Candle {
    /// 값 검증을 거쳐 캔들을 생성합니다.
    ///
    /// # Errors
    /// 음수 가격이나 음수 거래량이면 `IngestError::MalformedRow`를 반환합니다.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instrument: impl Into<String>,
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: i64,
    ) -> IngestResult<Self> {
        for (field, value) in [("open", open), ("high", high), ("low", low), ("close", close)] {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(IngestError::MalformedRow(format!(
                    "{} 가격이 음수: {}",
                    field, value
                )));
            }
        }
        if volume < 0 {
            return Err(IngestError::MalformedRow(format!("거래량이 음수: {}", volume)));
        }

        Ok(Self {
            instrument: instrument.into(),
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_candle_validation() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 3, 45, 0).unwrap();

        let ok = Candle::new("WIPRO", ts, dec!(460.5), dec!(461), dec!(459.9), dec!(460.1), 1200);
        assert!(ok.is_ok());

        let negative_price =
            Candle::new("WIPRO", ts, dec!(-1), dec!(461), dec!(459.9), dec!(460.1), 1200);
        assert!(matches!(negative_price, Err(IngestError::MalformedRow(_))));

        let negative_volume =
            Candle::new("WIPRO", ts, dec!(460.5), dec!(461), dec!(459.9), dec!(460.1), -5);
        assert!(negative_volume.is_err());
    }
}
