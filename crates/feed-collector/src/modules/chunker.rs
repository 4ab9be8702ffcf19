//! 조회 구간 분할.
//!
//! 제공자는 요청 하나에 담을 수 있는 기간과 행 수를 제한하므로
//! 전체 구간을 한도 안의 반열린 청크로 나눕니다.

use chrono::{DateTime, Duration, Utc};
use feed_core::{FetchWindow, IngestError, IngestResult, Interval};

/// 기간 한도와 행 수 한도 중 더 좁은 쪽을 청크 길이로 사용합니다.
///
/// `max_rows`가 0이면 행 수 한도는 적용하지 않습니다.
pub fn effective_span(interval: Interval, max_span: Duration, max_rows: u32) -> Duration {
    if max_rows == 0 {
        return max_span;
    }
    let by_rows = interval.duration() * i32::try_from(max_rows).unwrap_or(i32::MAX);
    max_span.min(by_rows)
}

/// 구간을 `max_span` 이하의 연속 청크로 나눕니다.
///
/// 반환된 이터레이터는 지연 평가되며 `clone()`으로 처음부터 다시 돌릴 수 있습니다.
/// 같은 입력은 항상 같은 순서의 같은 청크를 만듭니다.
///
/// # Errors
/// `max_span`이 0 이하이면 `IngestError::Config`를 반환합니다.
pub fn chunks(window: &FetchWindow, max_span: Duration) -> IngestResult<Chunks> {
    if max_span <= Duration::zero() {
        return Err(IngestError::Config(format!(
            "청크 길이는 양수여야 합니다: {}",
            max_span
        )));
    }

    Ok(Chunks {
        cursor: window.from(),
        end: window.to(),
        span: max_span,
        interval: window.interval(),
    })
}

/// 청크 이터레이터.
#[derive(Debug, Clone)]
pub struct Chunks {
    cursor: DateTime<Utc>,
    end: DateTime<Utc>,
    span: Duration,
    interval: Interval,
}

impl Iterator for Chunks {
    type Item = FetchWindow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.end {
            return None;
        }

        let chunk_end = self
            .cursor
            .checked_add_signed(self.span)
            .map_or(self.end, |t| t.min(self.end));
        let chunk = FetchWindow::new(self.cursor, chunk_end, self.interval).ok()?;
        self.cursor = chunk_end;
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_last_chunk_is_clipped() {
        let window = FetchWindow::new(day(1), day(25), Interval::OneMinute).unwrap();
        let got: Vec<(u32, u32)> = chunks(&window, Duration::days(7))
            .unwrap()
            .map(|c| {
                use chrono::Datelike;
                (c.from().day(), c.to().day())
            })
            .collect();

        assert_eq!(got, vec![(1, 8), (8, 15), (15, 22), (22, 25)]);
    }

    #[test]
    fn test_window_shorter_than_span() {
        let window = FetchWindow::new(day(1), day(2), Interval::OneMinute).unwrap();
        let got: Vec<FetchWindow> = chunks(&window, Duration::days(30)).unwrap().collect();
        assert_eq!(got, vec![window]);
    }

    #[test]
    fn test_restartable() {
        let window = FetchWindow::new(day(1), day(31), Interval::FiveMinute).unwrap();
        let iter = chunks(&window, Duration::days(4)).unwrap();

        let first: Vec<FetchWindow> = iter.clone().collect();
        let second: Vec<FetchWindow> = iter.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 8);
    }

    #[test]
    fn test_non_positive_span_rejected() {
        let window = FetchWindow::new(day(1), day(2), Interval::OneMinute).unwrap();
        assert!(chunks(&window, Duration::zero()).is_err());
        assert!(chunks(&window, Duration::minutes(-5)).is_err());
    }

    #[test]
    fn test_effective_span() {
        // 1분봉 30일 한도, 8000행 한도 → 8000분
        assert_eq!(
            effective_span(Interval::OneMinute, Duration::days(30), 8000),
            Duration::minutes(8000)
        );
        // 일봉은 행 한도가 넉넉하므로 기간 한도 적용
        assert_eq!(
            effective_span(Interval::OneDay, Duration::days(2000), 8000),
            Duration::days(2000)
        );
        assert_eq!(
            effective_span(Interval::OneMinute, Duration::days(30), 0),
            Duration::days(30)
        );
    }

    proptest! {
        #[test]
        fn prop_chunks_reconstruct_window(
            start_min in 0i64..1_000_000,
            len_min in 1i64..50_000,
            span_min in 1i64..5_000,
        ) {
            let from = day(1) + Duration::minutes(start_min);
            let to = from + Duration::minutes(len_min);
            let span = Duration::minutes(span_min);
            let window = FetchWindow::new(from, to, Interval::OneMinute).unwrap();

            let produced: Vec<FetchWindow> = chunks(&window, span).unwrap().collect();

            prop_assert!(!produced.is_empty());
            prop_assert_eq!(produced[0].from(), from);
            prop_assert_eq!(produced[produced.len() - 1].to(), to);
            for pair in produced.windows(2) {
                prop_assert_eq!(pair[0].to(), pair[1].from());
            }
            for chunk in &produced {
                prop_assert!(chunk.span() <= span);
                prop_assert!(chunk.span() > Duration::zero());
            }
        }
    }
}
