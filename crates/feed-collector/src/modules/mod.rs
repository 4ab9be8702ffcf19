//! 수집 파이프라인 모듈.

pub mod backfill;
pub mod chunker;
pub mod fetcher;

pub use backfill::{run_many, BackfillConfig, BackfillOrchestrator, FetchSettings, RunMode};
pub use chunker::{chunks, effective_span, Chunks};
pub use fetcher::{classify, parse_row, CandleFetcher};
