//! PostgreSQL 저장소 통합 테스트.
//!
//! ## 테스트 실행 조건
//!
//! 환경 변수 `TEST_DATABASE_URL`이 설정되어 있어야 합니다.
//! 설정되지 않은 경우 테스트가 건너뛰어집니다.
//! 테스트마다 고유한 심볼을 사용하므로 기존 데이터와 충돌하지 않습니다.

use chrono::{Duration, TimeZone, Utc};
use feed_core::{Candle, Instrument};
use feed_store::{ConflictPolicy, IngestionStore, PgCandleStore, StoreError};
use rust_decimal_macros::dec;
use std::env;

/// 테스트용 저장소 생성.
async fn get_test_store() -> Option<PgCandleStore> {
    let database_url = env::var("TEST_DATABASE_URL").ok()?;
    let store = PgCandleStore::connect(&database_url, 2).await.ok()?;
    store.ensure_schema().await.ok()?;
    Some(store.with_batch_size(7))
}

fn unique_symbol(prefix: &str) -> String {
    format!("{}_{}", prefix, Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

fn candles(symbol: &str, count: i64) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 3, 45, 0).unwrap();
    (0..count)
        .map(|i| {
            Candle::new(
                symbol,
                start + Duration::minutes(i),
                dec!(450.50),
                dec!(451.00),
                dec!(449.80),
                dec!(450.90),
                1000 + i,
            )
            .unwrap()
        })
        .collect()
}

async fn cleanup(store: &PgCandleStore, symbol: &str) {
    let _ = sqlx::query("DELETE FROM instruments WHERE symbol = $1")
        .bind(symbol)
        .execute(store.pool())
        .await;
}

#[tokio::test]
async fn test_pg_upsert_is_idempotent() {
    let Some(store) = get_test_store().await else {
        println!("TEST_DATABASE_URL 미설정, 테스트 건너뜀");
        return;
    };
    let symbol = unique_symbol("IDEM");
    store
        .register_instrument(&Instrument::new(&symbol, &symbol, "NSE", "1"))
        .await
        .unwrap();

    // 배치 크기 7 → 여러 문장으로 나뉨
    let batch = candles(&symbol, 30);
    let first = store.upsert(&batch, ConflictPolicy::Skip).await.unwrap();
    let second = store.upsert(&batch, ConflictPolicy::Skip).await.unwrap();

    assert_eq!(first, 30);
    assert_eq!(second, 0);
    assert_eq!(store.candle_count(&symbol).await.unwrap(), 30);
    assert_eq!(
        store.last_timestamp(&symbol).await.unwrap(),
        Some(batch[29].timestamp)
    );

    cleanup(&store, &symbol).await;
}

#[tokio::test]
async fn test_pg_failed_batch_rolls_back_whole_upsert() {
    let Some(store) = get_test_store().await else {
        println!("TEST_DATABASE_URL 미설정, 테스트 건너뜀");
        return;
    };
    let symbol = unique_symbol("ATOMIC");
    store
        .register_instrument(&Instrument::new(&symbol, &symbol, "NSE", "3"))
        .await
        .unwrap();

    // 마지막 문장만 NUMERIC(18, 4) 범위를 넘겨 실패
    let mut batch = candles(&symbol, 30);
    batch[29].close = dec!(1000000000000000);

    let err = store.upsert(&batch, ConflictPolicy::Skip).await.unwrap_err();
    assert!(matches!(err, StoreError::InsertError(_)));
    assert_eq!(store.candle_count(&symbol).await.unwrap(), 0);
    assert_eq!(store.last_timestamp(&symbol).await.unwrap(), None);

    cleanup(&store, &symbol).await;
}

#[tokio::test]
async fn test_pg_overwrite_policy() {
    let Some(store) = get_test_store().await else {
        println!("TEST_DATABASE_URL 미설정, 테스트 건너뜀");
        return;
    };
    let symbol = unique_symbol("OVER");
    store
        .register_instrument(&Instrument::new(&symbol, &symbol, "NSE", "2"))
        .await
        .unwrap();

    let mut batch = candles(&symbol, 5);
    store.upsert(&batch, ConflictPolicy::Skip).await.unwrap();

    batch[4].close = dec!(460.00);
    let written = store.upsert(&batch, ConflictPolicy::Overwrite).await.unwrap();
    assert_eq!(written, 5);

    let (close,): (rust_decimal::Decimal,) = sqlx::query_as(
        "SELECT c.close FROM candles c JOIN instruments i ON i.id = c.instrument_id \
         WHERE i.symbol = $1 ORDER BY c.ts DESC LIMIT 1",
    )
    .bind(&symbol)
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert_eq!(close, dec!(460.00));
    assert_eq!(store.candle_count(&symbol).await.unwrap(), 5);

    cleanup(&store, &symbol).await;
}

#[tokio::test]
async fn test_pg_register_instrument_is_upsert() {
    let Some(store) = get_test_store().await else {
        println!("TEST_DATABASE_URL 미설정, 테스트 건너뜀");
        return;
    };
    let symbol = unique_symbol("REG");

    store
        .register_instrument(&Instrument::new(&symbol, "OLD", "NSE", "10"))
        .await
        .unwrap();
    store
        .register_instrument(&Instrument::new(&symbol, "NEW", "NSE", "11"))
        .await
        .unwrap();

    let found: Vec<Instrument> = store
        .instruments()
        .await
        .unwrap()
        .into_iter()
        .filter(|i| i.symbol == symbol)
        .collect();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].provider_token, "11");
    assert_eq!(store.last_timestamp(&symbol).await.unwrap(), None);

    cleanup(&store, &symbol).await;
}

#[tokio::test]
async fn test_pg_unregistered_instrument_is_rejected() {
    let Some(store) = get_test_store().await else {
        println!("TEST_DATABASE_URL 미설정, 테스트 건너뜀");
        return;
    };
    let symbol = unique_symbol("MISSING");

    let err = store
        .upsert(&candles(&symbol, 1), ConflictPolicy::Skip)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownInstrument(_)));
}
