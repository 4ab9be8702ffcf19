//! 청크 조회 결과 분류.

use super::Candle;

/// 청크 하나를 조회한 결과.
///
/// `Empty`(정상 응답, 거래 없음)와 `Failed`(조회 실패)는 절대 합치지 않습니다.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// 데이터 수신 (시간순 정렬)
    Data {
        candles: Vec<Candle>,
        /// 파싱에 실패해 버린 행 수
        rejected_rows: usize,
    },
    /// 정상 응답이지만 데이터 없음 (휴장일 등)
    Empty,
    /// 조회 실패 (원인 문자열 그대로 보존)
    Failed(String),
}

impl FetchOutcome {
    /// 결과 종류 라벨 (로그용).
    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Data { .. } => "data",
            FetchOutcome::Empty => "empty",
            FetchOutcome::Failed(_) => "failed",
        }
    }

    /// 수신한 유효 캔들 수.
    pub fn row_count(&self) -> usize {
        match self {
            FetchOutcome::Data { candles, .. } => candles.len(),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(FetchOutcome::Empty.label(), "empty");
        assert_eq!(FetchOutcome::Failed("timeout".into()).label(), "failed");
        assert_eq!(FetchOutcome::Empty.row_count(), 0);

        let data = FetchOutcome::Data {
            candles: vec![],
            rejected_rows: 2,
        };
        assert_eq!(data.label(), "data");
        assert_eq!(data.row_count(), 0);
    }
}
