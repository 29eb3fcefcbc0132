//! Postgres stock store tests.
//!
//! Skipped unless `TEST_DATABASE_URL` points at a disposable database. Every test
//! works in a fresh tenant, so runs can share one database.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use agristock_core::{BatchId, TenantId};
use agristock_infra::{LedgerConfig, PostgresStockStore, StockLedger, StockStore};
use agristock_stock::{BatchNumber, BatchPatch, NewBatch, QualityGrade, Quantity, StockBatch, StockKey, VegType};

async fn store() -> Option<PostgresStockStore> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    Some(
        PostgresStockStore::connect(&url, 8)
            .await
            .expect("failed to connect to TEST_DATABASE_URL"),
    )
}

fn kg(v: f64) -> Quantity {
    Quantity::from_kg(v).unwrap()
}

fn cabbage_c() -> StockKey {
    StockKey::new(VegType::Cabbage, QualityGrade::C)
}

fn cabbage(number: &str, kg_amount: f64) -> StockBatch {
    let new = NewBatch::new(
        VegType::Cabbage,
        QualityGrade::C,
        BatchNumber::parse(number).unwrap(),
        kg(kg_amount),
        NaiveDate::from_ymd_opt(2026, 12, 1).unwrap(),
    )
    .unwrap();
    StockBatch::create(BatchId::new(), new, Utc::now())
}

#[tokio::test]
async fn insert_and_snapshot_round_trip() {
    let Some(store) = store().await else { return };
    let tenant = TenantId::new();

    let batch = store.insert_batch(tenant, cabbage("CBG0001", 12.345)).await.unwrap();
    let snapshot = store.snapshot(tenant).await.unwrap();

    assert_eq!(snapshot.batches, vec![batch.clone()]);
    assert_eq!(store.get_batch(tenant, batch.batch_id()).await.unwrap(), batch);
    assert_eq!(snapshot.totals.get(cabbage_c()), kg(12.345));
    assert_eq!(store.total_for(tenant, cabbage_c()).await.unwrap(), kg(12.345));
}

#[tokio::test]
async fn ledger_add_then_list_returns_the_same_batch() {
    let Some(store) = store().await else { return };
    let ledger = StockLedger::new(store, LedgerConfig::default());
    let tenant = TenantId::new();

    let new = NewBatch::new(
        VegType::Cabbage,
        QualityGrade::C,
        BatchNumber::parse("CBG0042").unwrap(),
        kg(3.5),
        NaiveDate::from_ymd_opt(2026, 12, 1).unwrap(),
    )
    .unwrap();
    let batch = ledger.add_batch(tenant, new).await.unwrap();

    let snapshot = ledger.list_all(tenant).await.unwrap();
    assert_eq!(snapshot.batches, vec![batch.clone()]);
    assert_eq!(ledger.get_batch(tenant, batch.batch_id()).await.unwrap(), batch);

    let movements = ledger.movements(tenant).await.unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].occurred_at, batch.date_added());
}

#[tokio::test]
async fn failed_depletion_rolls_back() {
    let Some(store) = store().await else { return };
    let tenant = TenantId::new();
    store.insert_batch(tenant, cabbage("CBG0001", 15.0)).await.unwrap();
    store.insert_batch(tenant, cabbage("CBG0002", 10.0)).await.unwrap();
    let before = store.snapshot(tenant).await.unwrap();

    let err = store
        .remove_quantity(tenant, cabbage_c(), kg(30.0), Default::default(), Utc::now())
        .await
        .unwrap_err();

    assert!(err.is_insufficient_stock());
    assert_eq!(store.snapshot(tenant).await.unwrap(), before);
    assert_eq!(store.movements(tenant).await.unwrap().len(), 2);
}

#[tokio::test]
async fn regrade_updates_both_pair_totals() {
    let Some(store) = store().await else { return };
    let tenant = TenantId::new();
    let batch = store.insert_batch(tenant, cabbage("CBG0001", 4.0)).await.unwrap();

    let patch = BatchPatch {
        quality_grade: Some(QualityGrade::A),
        ..BatchPatch::default()
    };
    store
        .update_batch(tenant, batch.batch_id(), &patch, Utc::now())
        .await
        .unwrap();

    assert!(store.total_for(tenant, cabbage_c()).await.unwrap().is_zero());
    assert_eq!(
        store
            .total_for(tenant, StockKey::new(VegType::Cabbage, QualityGrade::A))
            .await
            .unwrap(),
        kg(4.0)
    );

    store.delete_batch(tenant, batch.batch_id(), Utc::now()).await.unwrap();
    assert!(store.snapshot(tenant).await.unwrap().batches.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_depletions_serialize_per_pair() {
    let Some(store) = store().await else { return };
    let ledger = Arc::new(StockLedger::new(store, LedgerConfig::default()));
    let tenant = TenantId::new();
    ledger
        .add_batch(
            tenant,
            NewBatch::new(
                VegType::Cabbage,
                QualityGrade::C,
                BatchNumber::parse("CBG0001").unwrap(),
                kg(20.0),
                NaiveDate::from_ymd_opt(2026, 12, 1).unwrap(),
            )
            .unwrap(),
        )
        .await
        .unwrap();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.remove_quantity(tenant, cabbage_c(), kg(15.0)).await })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes.iter().any(|r| matches!(r, Err(e) if e.is_insufficient_stock())));
    assert_eq!(ledger.total_for(tenant, cabbage_c()).await.unwrap(), kg(5.0));
}
