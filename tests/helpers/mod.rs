//! Shared test helpers: a scripted classifier and fixture builders.
#![allow(dead_code)] // each integration-test crate uses a different subset

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use breed_classify::models::payload::ImagePayload;
use breed_classify::models::record::{ClassificationRecord, RawClassification};
use breed_classify::services::acquire;
use breed_classify::services::classifier::{Classifier, ClassifierError, JobHandle, PollUpdate};
use breed_classify::services::history::{HistoryError, RecordSink};

/// Minimal bytes that `image::guess_format` recognizes as JPEG.
pub fn jpeg_fixture_bytes() -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00]
}

pub fn sample_payload() -> ImagePayload {
    acquire::from_file("cow.jpg", "image/jpeg", jpeg_fixture_bytes())
        .expect("fixture bytes must pass acquisition")
}

pub fn holstein_raw() -> RawClassification {
    RawClassification {
        breed: "Holstein Friesian".to_string(),
        confidence: 94.2,
        characteristics: vec![
            "Black and white spotted pattern".to_string(),
            "Large body frame (600-700 kg)".to_string(),
            "High milk production capacity".to_string(),
        ],
        market_demand: "High".to_string(),
        price_range: "₹45,000-75,000".to_string(),
        health_score: 87.0,
        recommendations: vec![
            "Suitable for dairy farming operations".to_string(),
            "Regular health monitoring recommended".to_string(),
        ],
    }
}

/// Record sink whose writer is permanently broken; every append fails.
pub struct BrokenSink;

impl RecordSink for BrokenSink {
    fn append(
        &self,
        _record: std::sync::Arc<ClassificationRecord>,
    ) -> Result<(), HistoryError> {
        Err(HistoryError::LockPoisoned)
    }
}

/// Classifier that replays a fixed script of poll updates. The final update
/// is repeated if the controller keeps polling past the end of the script.
pub struct ScriptedClassifier {
    submit_fails: bool,
    script: Mutex<VecDeque<PollUpdate>>,
    pub cancel_requested: AtomicBool,
}

impl ScriptedClassifier {
    pub fn with_script(updates: Vec<PollUpdate>) -> Self {
        Self {
            submit_fails: false,
            script: Mutex::new(updates.into()),
            cancel_requested: AtomicBool::new(false),
        }
    }

    /// Progress steps followed by a successful result.
    pub fn succeeding(progress: &[f64], raw: RawClassification) -> Self {
        let mut updates: Vec<PollUpdate> = progress
            .iter()
            .map(|&percent| PollUpdate::Progress { percent })
            .collect();
        updates.push(PollUpdate::Finished(raw));
        Self::with_script(updates)
    }

    /// `submit` itself fails as unreachable.
    pub fn unreachable_service() -> Self {
        Self {
            submit_fails: true,
            script: Mutex::new(VecDeque::new()),
            cancel_requested: AtomicBool::new(false),
        }
    }

    /// Accepts the job but never reaches a terminal state.
    pub fn never_finishing() -> Self {
        Self::with_script(vec![PollUpdate::Progress { percent: 10.0 }])
    }

    pub fn cancel_was_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn submit(&self, _payload: &ImagePayload) -> Result<JobHandle, ClassifierError> {
        if self.submit_fails {
            return Err(ClassifierError::Unavailable("connection refused".to_string()));
        }
        Ok(JobHandle("scripted-job-1".to_string()))
    }

    async fn poll(&self, _handle: &JobHandle) -> Result<PollUpdate, ClassifierError> {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            Ok(script.pop_front().unwrap())
        } else {
            script
                .front()
                .cloned()
                .ok_or_else(|| ClassifierError::Malformed("script exhausted".to_string()))
        }
    }

    async fn cancel(&self, _handle: &JobHandle) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    async fn health_check(&self) -> Result<(), ClassifierError> {
        if self.submit_fails {
            return Err(ClassifierError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}
