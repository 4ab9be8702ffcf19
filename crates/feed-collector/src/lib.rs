//! Resumable minute-candle collector.
//!
//! 이 crate는 과거 분봉을 구간별로 나눠 받아 저장하는 바이너리와 라이브러리를 제공합니다:
//! - 구간 분할 (`chunks`)
//! - 속도 제한을 지키는 청크 조회 (`CandleFetcher`)
//! - 재개 가능한 백필/증분 수집 (`BackfillOrchestrator`)
//! - 실행 요약 (`RunSummary`)

pub mod config;
pub mod error;
pub mod modules;
pub mod stats;

pub use config::{CollectorConfig, ProviderConfig};
pub use error::{CollectorError, Result};
pub use stats::{RunStatus, RunSummary};
