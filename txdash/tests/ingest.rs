use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use txdash::{
    domain::prelude::*,
    query::{QueryEngine, SeriesParams},
    store::{
        queries::{self, TransactionFilter},
        Store,
    },
    stream::prelude::*,
};

async fn ingest_for_a_while(store: Arc<Store>, catalog: Arc<Catalog>) -> u64 {
    let producer = Arc::new(Producer::new(store.clone(), catalog, 1..=5).unwrap());
    let scheduler = Scheduler::start(producer, Duration::from_millis(10));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while scheduler.ticks() < 5 {
        assert!(tokio::time::Instant::now() < deadline, "scheduler stalled");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    scheduler.stop().await
}

#[tokio::test]
async fn scheduled_ingestion_feeds_consistent_aggregates() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path().join("sql_app.db")).unwrap());
    let catalog = Arc::new(Catalog::default());

    let ticks = ingest_for_a_while(store.clone(), catalog.clone()).await;
    let total = queries::count(&store, &TransactionFilter::default()).unwrap();
    assert!(total >= ticks && total <= ticks * 5, "{total} rows after {ticks} ticks");

    let engine = QueryEngine::new(store.clone(), catalog.clone());

    let stats = engine.get_stats().unwrap();
    assert_eq!(stats.len(), catalog.schemes().len());
    assert_eq!(stats.values().map(|s| s.total).sum::<u64>(), total);
    assert!(stats.values().all(|s| s.approved <= s.total));

    let series = engine.get_series(&SeriesParams::default()).unwrap();
    assert_eq!(series.iter().map(|p| p.y).sum::<u64>(), total);
    let keys: HashSet<_> = series.iter().map(|p| p.x.as_str()).collect();
    assert_eq!(keys.len(), series.len());

    for scheme in catalog.schemes() {
        let params = SeriesParams {
            card_scheme: Some(scheme.clone()),
            ..Default::default()
        };
        let bucketed: u64 = engine.get_series(&params).unwrap().iter().map(|p| p.y).sum();
        assert_eq!(bucketed, stats[scheme].total);
    }

    let codes = engine.get_status_codes().unwrap();
    let unique: HashSet<_> = codes.iter().collect();
    assert_eq!(unique.len(), codes.len());
    assert!(codes.iter().all(|c| catalog.contains(c)));
}

#[tokio::test]
async fn restart_keeps_history_and_ids_keep_growing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sql_app.db");
    let catalog = Arc::new(Catalog::default());

    let first_max = {
        let store = Arc::new(Store::open(&path).unwrap());
        ingest_for_a_while(store.clone(), catalog.clone()).await;
        let rows = queries::query(&store, &TransactionFilter::default()).unwrap();
        rows.iter().map(|r| r.id).max().unwrap()
    };

    let store = Arc::new(Store::open(&path).unwrap());
    let before = queries::count(&store, &TransactionFilter::default()).unwrap();
    ingest_for_a_while(store.clone(), catalog).await;

    let rows = queries::query(&store, &TransactionFilter::default()).unwrap();
    assert!(rows.len() as u64 > before);
    let new_rows = rows.iter().filter(|r| r.id > first_max).count() as u64;
    assert_eq!(new_rows, rows.len() as u64 - before);
}

#[test]
fn stats_scenario_with_an_empty_scheme() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let catalog = Arc::new(Catalog::default());
    let ts = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    let batch = vec![
        catalog.record("Visa", "0000", ts).unwrap(),
        catalog.record("Visa", "0000", ts).unwrap(),
        catalog.record("Visa", "0001", ts).unwrap(),
    ];
    queries::append_batch(&store, &batch).unwrap();

    let stats = QueryEngine::new(store, catalog).get_stats().unwrap();
    assert_eq!(
        serde_json::to_value(stats).unwrap(),
        serde_json::json!({
            "Visa": {"total": 3, "approved": 2},
            "MasterCard": {"total": 0, "approved": 0},
        })
    );
}
