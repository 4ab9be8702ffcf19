//! 종목명 → 제공자 토큰 해석.
//!
//! 종목 마스터는 처음 필요할 때 한 번만 받아오고, 해석 결과도 인스턴스 수명 동안 캐시합니다.

use std::collections::HashMap;
use std::sync::Arc;

use feed_core::{IngestError, IngestResult, Instrument};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::traits::{CatalogEntry, InstrumentCatalog};

/// 심볼 해석기.
pub struct SymbolResolver {
    catalog: Arc<dyn InstrumentCatalog>,
    entries: RwLock<Option<Arc<Vec<CatalogEntry>>>>,
    resolved: RwLock<HashMap<(String, String), Instrument>>,
}

impl SymbolResolver {
    /// 새 해석기 생성.
    pub fn new(catalog: Arc<dyn InstrumentCatalog>) -> Self {
        Self {
            catalog,
            entries: RwLock::new(None),
            resolved: RwLock::new(HashMap::new()),
        }
    }

    /// 이름과 거래소로 종목 하나를 찾습니다.
    ///
    /// 대소문자를 무시하고 거래 심볼(예: `WIPRO-EQ`) 또는 종목명(예: `WIPRO`)과
    /// 정확히 일치하는 항목을 찾습니다. 거래 심볼 일치가 우선합니다.
    ///
    /// # Errors
    /// 일치하는 항목이 없거나 여러 개이면 `IngestError::NotFound`를 반환합니다.
    /// 종목 마스터를 받아오지 못하면 `IngestError::Network`를 반환합니다.
    pub async fn resolve(&self, name: &str, exchange: &str) -> IngestResult<Instrument> {
        let key = (name.trim().to_uppercase(), exchange.trim().to_uppercase());

        if let Some(found) = self.resolved.read().await.get(&key) {
            debug!(query = name, exchange, "Resolved from cache");
            return Ok(found.clone());
        }

        let entries = self.load_entries().await?;
        let instrument = match_entry(&entries, &key.0, &key.1)?;

        info!(
            query = name,
            exchange,
            token = %instrument.provider_token,
            "Instrument resolved"
        );

        self.resolved.write().await.insert(key, instrument.clone());
        Ok(instrument)
    }

    async fn load_entries(&self) -> IngestResult<Arc<Vec<CatalogEntry>>> {
        if let Some(entries) = self.entries.read().await.as_ref() {
            return Ok(entries.clone());
        }

        let mut guard = self.entries.write().await;
        if let Some(entries) = guard.as_ref() {
            return Ok(entries.clone());
        }

        let entries = Arc::new(
            self.catalog
                .entries()
                .await
                .map_err(|e| IngestError::Network(format!("종목 마스터 조회 실패: {}", e)))?,
        );
        *guard = Some(entries.clone());
        Ok(entries)
    }
}

/// 정확히 하나의 항목을 고릅니다. `name`과 `exchange`는 대문자로 정규화된 값입니다.
fn match_entry(entries: &[CatalogEntry], name: &str, exchange: &str) -> IngestResult<Instrument> {
    let in_exchange = |e: &&CatalogEntry| e.exchange_segment.eq_ignore_ascii_case(exchange);

    let mut by_symbol: Vec<&CatalogEntry> = entries
        .iter()
        .filter(in_exchange)
        .filter(|e| e.symbol.eq_ignore_ascii_case(name))
        .collect();
    dedup_tokens(&mut by_symbol);

    let candidates = if by_symbol.is_empty() {
        let mut by_name: Vec<&CatalogEntry> = entries
            .iter()
            .filter(in_exchange)
            .filter(|e| e.name.eq_ignore_ascii_case(name))
            .collect();
        dedup_tokens(&mut by_name);
        by_name
    } else {
        by_symbol
    };

    match candidates.as_slice() {
        [] => Err(IngestError::NotFound(format!("{}:{}", exchange, name))),
        // 어떤 철자로 찾았든 같은 항목은 같은 심볼로 저장된다
        [entry] => Ok(Instrument::new(
            entry.symbol.to_uppercase(),
            entry.name.clone(),
            entry.exchange_segment.to_uppercase(),
            entry.token.clone(),
        )),
        many => {
            let listed: Vec<String> = many
                .iter()
                .map(|e| format!("{} (token {})", e.symbol, e.token))
                .collect();
            Err(IngestError::NotFound(format!(
                "{}:{} 후보가 {}개입니다: {}",
                exchange,
                name,
                many.len(),
                listed.join(", ")
            )))
        }
    }
}

fn dedup_tokens(entries: &mut Vec<&CatalogEntry>) {
    entries.sort_by(|a, b| a.token.cmp(&b.token));
    entries.dedup_by(|a, b| a.token == b.token);
}
