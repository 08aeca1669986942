use std::sync::Arc;

use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::payload::ImagePayload;

/// Market demand bands for a classified breed. The classifier reports this as a
/// free string; anything outside this closed set is rejected rather than
/// coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "title_case")]
pub enum MarketDemand {
    Low,
    Medium,
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
}

/// Raw classifier response, exactly as it comes off the wire.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RawClassification {
    #[garde(length(min = 1, max = 200))]
    pub breed: String,

    #[garde(skip)]
    pub confidence: f64,

    #[garde(skip)]
    pub characteristics: Vec<String>,

    #[garde(length(min = 1, max = 50))]
    pub market_demand: String,

    #[garde(skip)]
    pub price_range: String,

    #[garde(skip)]
    pub health_score: f64,

    #[garde(skip)]
    pub recommendations: Vec<String>,
}

/// The immutable artifact of a succeeded classification job.
///
/// `id` is a synthetic identity: `(timestamp, breed)` can collide within
/// timestamp resolution, so every record gets a v4 UUID at packaging time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub id: Uuid,
    pub breed: String,
    pub confidence: f64,
    pub characteristics: Vec<String>,
    pub market_demand: MarketDemand,
    pub price_range: String,
    pub health_score: u8,
    pub recommendations: Vec<String>,
    pub image: Arc<ImagePayload>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("invalid classifier response: {0}")]
    InvalidResponse(String),
}

impl ClassificationRecord {
    /// Validate and package a raw classifier response into a record.
    ///
    /// Numeric fields are clamped to their documented ranges; `market_demand`
    /// must parse into the closed enum or the whole response is rejected.
    pub fn from_raw(
        raw: RawClassification,
        image: Arc<ImagePayload>,
    ) -> Result<Self, RecordError> {
        raw.validate()
            .map_err(|report| RecordError::InvalidResponse(report.to_string()))?;

        let market_demand: MarketDemand = raw.market_demand.parse().map_err(|_| {
            RecordError::InvalidResponse(format!(
                "unrecognized market demand value: {:?}",
                raw.market_demand
            ))
        })?;

        if !raw.confidence.is_finite() || !raw.health_score.is_finite() {
            return Err(RecordError::InvalidResponse(
                "non-finite numeric field in classifier response".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            breed: raw.breed,
            confidence: raw.confidence.clamp(0.0, 100.0),
            characteristics: raw.characteristics,
            market_demand,
            price_range: raw.price_range,
            health_score: raw.health_score.round().clamp(0.0, 100.0) as u8,
            recommendations: raw.recommendations,
            image,
            timestamp: Utc::now(),
        })
    }
}
