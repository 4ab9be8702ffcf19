//! SmartAPI 종목 마스터(scrip master) 조회.
//!
//! 공개 JSON 파일 하나에 모든 거래소의 종목이 들어 있으며 인증이 필요 없습니다.

use super::config::DEFAULT_SCRIP_MASTER_URL;
use crate::traits::{CatalogEntry, InstrumentCatalog};
use crate::{BrokerError, BrokerResult};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{error, info};

/// HTTP로 받아오는 종목 마스터.
pub struct ScripMasterCatalog {
    url: String,
    client: Client,
}

impl ScripMasterCatalog {
    /// 기본 URL로 생성.
    pub fn new(timeout_secs: u64) -> BrokerResult<Self> {
        Self::with_url(DEFAULT_SCRIP_MASTER_URL, timeout_secs)
    }

    /// URL을 지정해 생성.
    pub fn with_url(url: impl Into<String>, timeout_secs: u64) -> BrokerResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| BrokerError::NetworkError(format!("HTTP client 생성 실패: {}", e)))?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl InstrumentCatalog for ScripMasterCatalog {
    async fn entries(&self) -> BrokerResult<Vec<CatalogEntry>> {
        info!("Downloading scrip master from {}", self.url);

        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!("Scrip master download failed: {}", status);
            return Err(BrokerError::NetworkError(format!(
                "scrip master HTTP {}",
                status.as_u16()
            )));
        }

        let entries: Vec<CatalogEntry> = serde_json::from_str(&body).map_err(|e| {
            BrokerError::ParseError(format!("Failed to parse scrip master: {}", e))
        })?;

        info!("Scrip master loaded: {} instruments", entries.len());
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_entry_ignores_extra_fields() {
        let json = r#"[{
            "token": "3787",
            "symbol": "WIPRO-EQ",
            "name": "WIPRO",
            "expiry": "",
            "strike": "-1.000000",
            "lotsize": "1",
            "instrumenttype": "",
            "exch_seg": "NSE",
            "tick_size": "5.000000"
        }]"#;

        let entries: Vec<CatalogEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].token, "3787");
        assert_eq!(entries[0].exchange_segment, "NSE");
    }
}
