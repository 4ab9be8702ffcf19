//! 수집 실행 요약.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// 실행 결과 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// 모든 청크가 정상 처리됨 (빈 청크 포함)
    Clean,
    /// 실패한 청크나 저장 실패가 하나 이상 있음
    Degraded,
    /// 외부 취소로 중간에 멈춤
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Clean => "clean",
            RunStatus::Degraded => "degraded",
            RunStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// 종목 하나의 수집 실행 요약
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// 종목 심볼
    pub symbol: String,
    /// 계획된 청크 수
    pub planned_chunks: usize,
    /// 실제 조회한 청크 수
    pub total_chunks: usize,
    /// 데이터를 받은 청크 수
    pub chunks_with_data: usize,
    /// 빈 청크 수 (휴장일 등)
    pub chunks_empty: usize,
    /// 실패한 청크 수
    pub chunks_failed: usize,
    /// 저장소에 쓰인 행 수
    pub total_rows_inserted: u64,
    /// 파싱 실패로 버린 행 수
    pub rows_rejected: usize,
    /// 저장 실패한 배치 수
    pub store_failures: usize,
    /// 취소 여부
    pub cancelled: bool,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RunSummary {
    /// 새 요약 생성
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Default::default()
        }
    }

    /// 실행 상태.
    ///
    /// 실패가 있으면 취소 여부와 관계없이 `Degraded`입니다.
    pub fn status(&self) -> RunStatus {
        if self.chunks_failed > 0 || self.store_failures > 0 {
            RunStatus::Degraded
        } else if self.cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Clean
        }
    }

    /// 처리한 청크 비율 (%)
    pub fn progress_pct(&self) -> f64 {
        if self.planned_chunks == 0 {
            100.0
        } else {
            (self.total_chunks as f64 / self.planned_chunks as f64) * 100.0
        }
    }

    /// 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        let status = self.status();
        let elapsed = format!("{:.1}s", self.elapsed.as_secs_f64());

        if status == RunStatus::Degraded {
            tracing::warn!(
                operation = operation,
                symbol = %self.symbol,
                status = %status,
                total_chunks = self.total_chunks,
                chunks_with_data = self.chunks_with_data,
                chunks_empty = self.chunks_empty,
                chunks_failed = self.chunks_failed,
                store_failures = self.store_failures,
                rows_inserted = self.total_rows_inserted,
                rows_rejected = self.rows_rejected,
                elapsed = elapsed,
                "수집 완료 (일부 실패)"
            );
        } else {
            tracing::info!(
                operation = operation,
                symbol = %self.symbol,
                status = %status,
                total_chunks = self.total_chunks,
                chunks_with_data = self.chunks_with_data,
                chunks_empty = self.chunks_empty,
                rows_inserted = self.total_rows_inserted,
                rows_rejected = self.rows_rejected,
                elapsed = elapsed,
                "수집 완료"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status() {
        let mut summary = RunSummary::new("ACME");
        assert_eq!(summary.status(), RunStatus::Clean);

        summary.rows_rejected = 3;
        assert_eq!(summary.status(), RunStatus::Clean);

        summary.cancelled = true;
        assert_eq!(summary.status(), RunStatus::Cancelled);

        summary.store_failures = 1;
        assert_eq!(summary.status(), RunStatus::Degraded);
    }

    #[test]
    fn test_progress_pct() {
        let mut summary = RunSummary::new("ACME");
        assert_eq!(summary.progress_pct(), 100.0);

        summary.planned_chunks = 4;
        summary.total_chunks = 1;
        assert_eq!(summary.progress_pct(), 25.0);
    }
}
