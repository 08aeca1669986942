//! History store tests: append-only behavior, filter/sort views, export
//! shapes, and deletion.

mod helpers;

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use breed_classify::models::record::{ClassificationRecord, MarketDemand};
use breed_classify::services::history::{ExportFormat, HistoryQuery, HistoryStore, SortKey};

use helpers::sample_payload;

fn record(
    breed: &str,
    confidence: f64,
    demand: MarketDemand,
    price_range: &str,
    health_score: u8,
    timestamp: DateTime<Utc>,
) -> Arc<ClassificationRecord> {
    Arc::new(ClassificationRecord {
        id: Uuid::new_v4(),
        breed: breed.to_string(),
        confidence,
        characteristics: vec!["Docile temperament".to_string()],
        market_demand: demand,
        price_range: price_range.to_string(),
        health_score,
        recommendations: vec!["Regular health monitoring recommended".to_string()],
        image: Arc::new(sample_payload()),
        timestamp,
    })
}

fn ts(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, day, hour, 0, 0).unwrap()
}

fn seeded_store() -> HistoryStore {
    let store = HistoryStore::new();
    store
        .append(record("Jersey", 80.0, MarketDemand::High, "₹30,000-50,000", 78, ts(18, 9)))
        .unwrap();
    store
        .append(record("Gir", 60.0, MarketDemand::Medium, "₹25,000-40,000", 74, ts(19, 14)))
        .unwrap();
    store
        .append(record("Jersey", 95.0, MarketDemand::VeryHigh, "₹35,000-55,000", 88, ts(20, 11)))
        .unwrap();
    store
}

#[test]
fn append_preserves_insertion_order_and_contents() {
    let store = seeded_store();
    assert_eq!(store.len(), 3);

    let view = store.query(&HistoryQuery::default()).unwrap();
    let breeds: Vec<&str> = view.iter().map(|r| r.breed.as_str()).collect();
    assert_eq!(breeds, ["Jersey", "Gir", "Jersey"]);

    // A query is a view: the store still returns the same thing afterwards.
    let again = store.query(&HistoryQuery::default()).unwrap();
    assert_eq!(again[1].confidence, 60.0);
    assert_eq!(again[1].market_demand, MarketDemand::Medium);
}

#[test]
fn breed_filter_is_case_insensitive_substring_preserving_order() {
    let store = seeded_store();
    let view = store
        .query(&HistoryQuery {
            breed: Some("jer".to_string()),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(view.len(), 2);
    assert_eq!(view[0].confidence, 80.0);
    assert_eq!(view[1].confidence, 95.0);
}

#[test]
fn demand_filter_matches_exactly() {
    let store = seeded_store();
    let view = store
        .query(&HistoryQuery {
            demand: Some(MarketDemand::VeryHigh),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].breed, "Jersey");
    assert_eq!(view[0].confidence, 95.0);
}

#[test]
fn sort_by_confidence_descending() {
    let store = seeded_store();
    let view = store
        .query(&HistoryQuery {
            sort: Some(SortKey::Confidence),
            ..Default::default()
        })
        .unwrap();
    let confidences: Vec<f64> = view.iter().map(|r| r.confidence).collect();
    assert_eq!(confidences, [95.0, 80.0, 60.0]);
}

#[test]
fn sort_by_date_newest_first() {
    let store = seeded_store();
    let view = store
        .query(&HistoryQuery {
            sort: Some(SortKey::Date),
            ..Default::default()
        })
        .unwrap();
    let days: Vec<u32> = view
        .iter()
        .map(|r| chrono::Datelike::day(&r.timestamp))
        .collect();
    assert_eq!(days, [20, 19, 18]);
}

#[test]
fn sort_by_breed_ascending_keeps_insertion_order_for_ties() {
    let store = seeded_store();
    let view = store
        .query(&HistoryQuery {
            sort: Some(SortKey::Breed),
            ..Default::default()
        })
        .unwrap();
    let breeds: Vec<&str> = view.iter().map(|r| r.breed.as_str()).collect();
    assert_eq!(breeds, ["Gir", "Jersey", "Jersey"]);
    // The two Jerseys keep their relative insertion order
    assert_eq!(view[1].confidence, 80.0);
    assert_eq!(view[2].confidence, 95.0);
}

#[test]
fn csv_export_matches_documented_row_shape() {
    let store = HistoryStore::new();
    store
        .append(record(
            "Holstein Friesian",
            94.2,
            MarketDemand::High,
            "₹45,000-75,000",
            87,
            ts(20, 10),
        ))
        .unwrap();

    let csv = store
        .export(&HistoryQuery::default(), ExportFormat::Csv)
        .unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next().unwrap(),
        "Date,Breed,Confidence,Market Demand,Price Range,Health Score"
    );
    assert_eq!(
        lines.next().unwrap(),
        "2026-08-20,Holstein Friesian,94.2%,High,₹45,000-75,000,87"
    );
    assert_eq!(lines.next(), None);
}

#[test]
fn json_export_carries_all_fields_with_iso8601_timestamps() {
    let store = seeded_store();
    let json = store
        .export(&HistoryQuery::default(), ExportFormat::Json)
        .unwrap();

    let docs: serde_json::Value = serde_json::from_str(&json).unwrap();
    let first = &docs[0];
    assert_eq!(first["breed"], "Jersey");
    assert_eq!(first["confidence"], 80.0);
    assert_eq!(first["market_demand"], "High");
    assert_eq!(first["health_score"], 78);
    assert!(first["image"]["bytes"].is_string());
    assert_eq!(first["recommendations"][0], "Regular health monitoring recommended");

    let stamp = first["timestamp"].as_str().unwrap();
    stamp
        .parse::<DateTime<Utc>>()
        .expect("timestamp must be ISO-8601");
}

#[test]
fn export_serializes_the_filtered_view_not_the_store() {
    let store = seeded_store();
    let csv = store
        .export(
            &HistoryQuery {
                breed: Some("gir".to_string()),
                ..Default::default()
            },
            ExportFormat::Csv,
        )
        .unwrap();

    assert_eq!(csv.lines().count(), 2); // header + the one Gir record
    assert!(csv.contains("Gir"));
    assert!(!csv.contains("Jersey"));
    // Exporting never shrinks the store itself
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn concurrent_readers_observe_whole_records() {
    let store = Arc::new(seeded_store());

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..25 {
                let view = store.query(&HistoryQuery::default()).unwrap();
                // Readers see complete records, never a partial append.
                assert!(view.len() >= 3);
                assert!(view.iter().all(|r| !r.breed.is_empty()));
            }
        }));
    }
    let writer = store.clone();
    tasks.push(tokio::spawn(async move {
        writer
            .append(record("Sahiwal", 70.0, MarketDemand::Medium, "₹20,000-35,000", 80, ts(21, 8)))
            .unwrap();
    }));

    for outcome in futures::future::join_all(tasks).await {
        outcome.unwrap();
    }
    assert_eq!(store.len(), 4);
}

#[test]
fn delete_removes_exactly_one_record_by_identity() {
    let store = seeded_store();
    let victim = store.query(&HistoryQuery::default()).unwrap()[1].id;

    assert!(store.delete(victim).unwrap());
    assert_eq!(store.len(), 2);
    assert!(store
        .query(&HistoryQuery::default())
        .unwrap()
        .iter()
        .all(|r| r.id != victim));

    // Deleting again finds nothing
    assert!(!store.delete(victim).unwrap());
    assert_eq!(store.len(), 2);
}
