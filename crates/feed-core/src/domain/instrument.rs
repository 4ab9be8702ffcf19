//! 종목 식별 정보.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 해석이 끝난 종목.
///
/// 실행 시작 시 한 번 해석되고 실행이 끝날 때까지 바뀌지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    /// 저장소 키로 쓰는 거래 심볼 (예: "WIPRO-EQ")
    pub symbol: String,
    /// 표시 이름 (예: "WIPRO")
    pub display_name: String,
    /// 거래소 세그먼트 (예: "NSE", "BSE")
    pub exchange_segment: String,
    /// 데이터 제공자 종목 토큰 (예: "3787")
    pub provider_token: String,
}

impl Instrument {
    pub fn new(
        symbol: impl Into<String>,
        display_name: impl Into<String>,
        exchange_segment: impl Into<String>,
        provider_token: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            display_name: display_name.into(),
            exchange_segment: exchange_segment.into(),
            provider_token: provider_token.into(),
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} (token {})",
            self.exchange_segment, self.symbol, self.provider_token
        )
    }
}
