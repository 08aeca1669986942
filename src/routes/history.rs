use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::record::{ClassificationRecord, MarketDemand};
use crate::services::history::{ExportFormat, HistoryError, HistoryQuery, SortKey};

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub breed: Option<String>,
    pub demand: Option<MarketDemand>,
    pub sort: Option<SortKey>,
}

impl HistoryParams {
    /// Display default is newest-first.
    fn into_query(self) -> HistoryQuery {
        HistoryQuery {
            breed: self.breed,
            demand: self.demand,
            sort: Some(self.sort.unwrap_or(SortKey::Date)),
        }
    }
}

/// GET /api/v1/history — filtered/sorted view of the classification history.
pub async fn list_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<Arc<ClassificationRecord>>>, (StatusCode, String)> {
    state
        .history
        .query(&params.into_query())
        .map(Json)
        .map_err(history_status)
}

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    pub breed: Option<String>,
    pub demand: Option<MarketDemand>,
    pub sort: Option<SortKey>,
    pub format: Option<ExportFormat>,
}

/// GET /api/v1/history/export — serialize the current view (CSV by default).
pub async fn export_history(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let format = params.format.unwrap_or(ExportFormat::Csv);
    let query = HistoryQuery {
        breed: params.breed,
        demand: params.demand,
        sort: Some(params.sort.unwrap_or(SortKey::Date)),
    };
    let body = state.history.export(&query, format).map_err(history_status)?;

    let content_type = match format {
        ExportFormat::Json => "application/json",
        ExportFormat::Csv => "text/csv",
    };
    Ok(([(header::CONTENT_TYPE, content_type)], body))
}

/// DELETE /api/v1/history/{id} — remove one record; irreversible.
pub async fn delete_record(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    match state.history.delete(id).map_err(history_status)? {
        true => Ok(StatusCode::NO_CONTENT),
        false => Err((StatusCode::NOT_FOUND, format!("no record with id {id}"))),
    }
}

fn history_status(err: HistoryError) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
