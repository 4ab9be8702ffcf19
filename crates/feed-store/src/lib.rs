//! 캔들 저장소.
//!
//! - `IngestionStore`: 멱등 upsert와 최근 저장 시각 조회를 제공하는 저장소 trait
//! - `PgCandleStore`: PostgreSQL 백엔드 (UNNEST 배치 삽입)
//! - `MemoryCandleStore`: 테스트/드라이런용 메모리 백엔드

pub mod error;
pub mod memory;
pub mod pg;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryCandleStore;
pub use pg::{PgCandleStore, DEFAULT_BATCH_SIZE};
pub use store::{ConflictPolicy, IngestionStore};
