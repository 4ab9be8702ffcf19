//! Angel One SmartAPI 커넥터.

pub mod client;
pub mod config;
pub mod scrip_master;

pub use client::{format_provider_time, SmartApiClient};
pub use config::{SmartApiConfig, DEFAULT_BASE_URL, DEFAULT_SCRIP_MASTER_URL};
pub use scrip_master::ScripMasterCatalog;
