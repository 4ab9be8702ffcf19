//! 데이터 제공자 커넥터.

pub mod smartapi;

pub use smartapi::{
    format_provider_time, ScripMasterCatalog, SmartApiClient, SmartApiConfig, DEFAULT_BASE_URL,
    DEFAULT_SCRIP_MASTER_URL,
};
