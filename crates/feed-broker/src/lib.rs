//! 과거 시세 데이터 제공자 연동.
//!
//! 이 crate는 다음을 제공합니다:
//! - 제공자 추상화 (`HistoricalDataProvider`, `InstrumentCatalog`)
//! - Angel One SmartAPI 커넥터와 종목 마스터
//! - TOTP 기반 세션 수명 주기 (`ProviderSession`)
//! - 종목명 해석 (`SymbolResolver`)

pub mod connector;
pub mod error;
pub mod resolver;
pub mod session;
pub mod totp;
pub mod traits;

pub use connector::*;
pub use error::*;
pub use resolver::*;
pub use session::*;
pub use totp::*;
pub use traits::*;
