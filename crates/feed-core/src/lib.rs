//! # Feed Core
//!
//! 캔들 수집 파이프라인 전반에서 사용하는 핵심 도메인 타입을 제공합니다.
//!
//! 이 크레이트는 다음을 포함합니다:
//! - 종목(Instrument) 및 캔들(Candle) 도메인 모델
//! - 캔들 간격(Interval)과 조회 구간(FetchWindow)
//! - 조회 결과 분류(FetchOutcome)
//! - 수집 에러 분류 체계
//! - 로깅 인프라

pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
