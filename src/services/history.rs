//! In-session classification history: append-only, insertion-ordered, with
//! view-level filtering, sorting, and export.

use std::cmp::Ordering;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::record::{ClassificationRecord, MarketDemand};

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history lock poisoned by a panicked writer")]
    LockPoisoned,

    #[error("failed to serialize history export: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Sort orders for history views. Sorting is always a view transform; the
/// store's insertion order is never touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SortKey {
    /// Newest first.
    Date,
    /// Highest first.
    Confidence,
    /// Lexicographic ascending.
    Breed,
}

/// Filter and sort parameters for one view of the history.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    /// Case-insensitive substring match on the breed name.
    pub breed: Option<String>,
    pub demand: Option<MarketDemand>,
    /// `None` preserves insertion order.
    pub sort: Option<SortKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExportFormat {
    /// One document per record, all fields, RFC 3339 timestamps.
    Json,
    /// Flat tabular form: date, breed, confidence, demand, price range,
    /// health score.
    Csv,
}

const CSV_HEADER: &str = "Date,Breed,Confidence,Market Demand,Price Range,Health Score";

/// Destination for completed records. The job controller only needs to append;
/// holding this seam instead of the full store keeps the append-failure path
/// reachable from tests.
pub trait RecordSink: Send + Sync {
    fn append(&self, record: Arc<ClassificationRecord>) -> Result<(), HistoryError>;
}

impl RecordSink for HistoryStore {
    fn append(&self, record: Arc<ClassificationRecord>) -> Result<(), HistoryError> {
        HistoryStore::append(self, record)
    }
}

/// Append-only record store. Single writer (the job controller); concurrent
/// readers observe whole records only.
#[derive(Default)]
pub struct HistoryStore {
    records: RwLock<Vec<Arc<ClassificationRecord>>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed record. O(1) amortized, unbounded.
    pub fn append(&self, record: Arc<ClassificationRecord>) -> Result<(), HistoryError> {
        let mut records = self.records.write().map_err(|_| HistoryError::LockPoisoned)?;
        records.push(record);
        metrics::gauge!("classification_history_records").set(records.len() as f64);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Produce a filtered/sorted view. Ties keep their relative insertion
    /// order (the sort is stable), and no filter plus no sort is exactly the
    /// insertion order.
    pub fn query(
        &self,
        query: &HistoryQuery,
    ) -> Result<Vec<Arc<ClassificationRecord>>, HistoryError> {
        let needle = query.breed.as_ref().map(|b| b.to_lowercase());
        let records = self.records.read().map_err(|_| HistoryError::LockPoisoned)?;

        let mut view: Vec<Arc<ClassificationRecord>> = records
            .iter()
            .filter(|record| {
                needle
                    .as_ref()
                    .is_none_or(|needle| record.breed.to_lowercase().contains(needle))
                    && query.demand.is_none_or(|demand| record.market_demand == demand)
            })
            .cloned()
            .collect();
        drop(records);

        match query.sort {
            None => {}
            Some(SortKey::Date) => view.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
            Some(SortKey::Confidence) => view.sort_by(|a, b| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(Ordering::Equal)
            }),
            Some(SortKey::Breed) => view.sort_by(|a, b| a.breed.cmp(&b.breed)),
        }
        Ok(view)
    }

    /// Serialize the view selected by `query` — never the raw store.
    pub fn export(
        &self,
        query: &HistoryQuery,
        format: ExportFormat,
    ) -> Result<String, HistoryError> {
        let view = self.query(query)?;
        match format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(&view)?),
            ExportFormat::Csv => {
                let mut out = String::from(CSV_HEADER);
                out.push('\n');
                for record in &view {
                    // Naive comma join, same shape the UI has always exported.
                    out.push_str(&format!(
                        "{},{},{}%,{},{},{}\n",
                        record.timestamp.format("%Y-%m-%d"),
                        record.breed,
                        record.confidence,
                        record.market_demand,
                        record.price_range,
                        record.health_score,
                    ));
                }
                Ok(out)
            }
        }
    }

    /// Remove one record by identity. Irreversible within the session.
    /// Returns whether a record was removed.
    pub fn delete(&self, id: Uuid) -> Result<bool, HistoryError> {
        let mut records = self.records.write().map_err(|_| HistoryError::LockPoisoned)?;
        match records.iter().position(|record| record.id == id) {
            Some(index) => {
                records.remove(index);
                metrics::gauge!("classification_history_records").set(records.len() as f64);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
