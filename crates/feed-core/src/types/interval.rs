//! 캔들 간격 정의.
//!
//! SmartAPI `getCandleData`가 지원하는 간격과 간격별 최대 조회 기간을 정의합니다.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 캔들 간격.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Interval {
    /// 1분봉
    OneMinute,
    /// 3분봉
    ThreeMinute,
    /// 5분봉
    FiveMinute,
    /// 10분봉
    TenMinute,
    /// 15분봉
    FifteenMinute,
    /// 30분봉
    ThirtyMinute,
    /// 1시간봉
    OneHour,
    /// 일봉
    OneDay,
}

impl Interval {
    /// 캔들 하나의 길이.
    pub fn duration(&self) -> Duration {
        match self {
            Interval::OneMinute => Duration::minutes(1),
            Interval::ThreeMinute => Duration::minutes(3),
            Interval::FiveMinute => Duration::minutes(5),
            Interval::TenMinute => Duration::minutes(10),
            Interval::FifteenMinute => Duration::minutes(15),
            Interval::ThirtyMinute => Duration::minutes(30),
            Interval::OneHour => Duration::hours(1),
            Interval::OneDay => Duration::days(1),
        }
    }

    /// 요청 한 번에 허용되는 최대 조회 기간 (SmartAPI 기준).
    pub fn max_span(&self) -> Duration {
        match self {
            Interval::OneMinute => Duration::days(30),
            Interval::ThreeMinute => Duration::days(60),
            Interval::FiveMinute | Interval::TenMinute => Duration::days(100),
            Interval::FifteenMinute | Interval::ThirtyMinute => Duration::days(200),
            Interval::OneHour => Duration::days(400),
            Interval::OneDay => Duration::days(2000),
        }
    }

    /// SmartAPI 간격 문자열로 변환합니다.
    pub fn as_provider_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "ONE_MINUTE",
            Interval::ThreeMinute => "THREE_MINUTE",
            Interval::FiveMinute => "FIVE_MINUTE",
            Interval::TenMinute => "TEN_MINUTE",
            Interval::FifteenMinute => "FIFTEEN_MINUTE",
            Interval::ThirtyMinute => "THIRTY_MINUTE",
            Interval::OneHour => "ONE_HOUR",
            Interval::OneDay => "ONE_DAY",
        }
    }

    /// 저장/로그용 짧은 표기.
    pub fn as_short_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::ThreeMinute => "3m",
            Interval::FiveMinute => "5m",
            Interval::TenMinute => "10m",
            Interval::FifteenMinute => "15m",
            Interval::ThirtyMinute => "30m",
            Interval::OneHour => "1h",
            Interval::OneDay => "1d",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_short_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    /// `1m` 같은 짧은 표기와 `ONE_MINUTE` 같은 SmartAPI 표기를 모두 받습니다.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let interval = match s.trim().to_uppercase().as_str() {
            "1M" | "ONE_MINUTE" => Interval::OneMinute,
            "3M" | "THREE_MINUTE" => Interval::ThreeMinute,
            "5M" | "FIVE_MINUTE" => Interval::FiveMinute,
            "10M" | "TEN_MINUTE" => Interval::TenMinute,
            "15M" | "FIFTEEN_MINUTE" => Interval::FifteenMinute,
            "30M" | "THIRTY_MINUTE" => Interval::ThirtyMinute,
            "1H" | "ONE_HOUR" => Interval::OneHour,
            "1D" | "ONE_DAY" => Interval::OneDay,
            _ => return Err(format!("Invalid interval: {}", s)),
        };
        Ok(interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_parse() {
        assert_eq!("1m".parse::<Interval>().unwrap(), Interval::OneMinute);
        assert_eq!("ONE_MINUTE".parse::<Interval>().unwrap(), Interval::OneMinute);
        assert_eq!("1d".parse::<Interval>().unwrap(), Interval::OneDay);
        assert_eq!("fifteen_minute".parse::<Interval>().unwrap(), Interval::FifteenMinute);
        assert!("2m".parse::<Interval>().is_err());
    }

    #[test]
    fn test_interval_spans() {
        assert_eq!(Interval::OneMinute.duration(), Duration::minutes(1));
        assert_eq!(Interval::OneMinute.max_span(), Duration::days(30));
        assert_eq!(Interval::OneDay.max_span(), Duration::days(2000));
        assert_eq!(Interval::OneHour.as_provider_str(), "ONE_HOUR");
    }
}
