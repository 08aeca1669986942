//! The classification job controller: a single-live-job state machine driving
//! the external classifier, with monotonic progress, a wall-clock budget, and
//! best-effort cancellation.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::{oneshot, watch};
use uuid::Uuid;

use crate::models::payload::ImagePayload;
use crate::models::record::{ClassificationRecord, RawClassification};
use crate::services::classifier::{Classifier, JobHandle, PollUpdate};
use crate::services::history::RecordSink;

/// States of the one classification job a session can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    ImageReady,
    Submitting,
    InProgress,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::Cancelled)
    }

    /// A job is live while the classifier may still be working on it.
    pub fn is_live(self) -> bool {
        matches!(self, JobState::Submitting | JobState::InProgress)
    }
}

/// Why a job ended up in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    ClassifierUnavailable,
    ClassifierFailed,
    ClassifierTimeout,
    InvalidClassifierResponse,
    PersistFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: FailureKind,
    pub message: String,
}

/// Errors for guarded operations called in the wrong state.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    #[error("no image selected")]
    NoImageSelected,

    #[error("a classification job is already in flight")]
    JobAlreadyInFlight,

    #[error("operation {op} is not valid in state {state:?}")]
    InvalidTransition { op: &'static str, state: JobState },
}

/// Immutable view of the current job, published on every transition.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job_id: Option<Uuid>,
    pub state: JobState,
    pub progress: f64,
    pub image_selected: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<JobError>,
    pub result: Option<Arc<ClassificationRecord>>,
}

impl JobSnapshot {
    fn initial() -> Self {
        Self {
            job_id: None,
            state: JobState::Idle,
            progress: 0.0,
            image_selected: false,
            started_at: None,
            ended_at: None,
            error: None,
            result: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Wall-clock budget for one submission, submit call included.
    pub timeout: Duration,
    /// Delay between classifier polls.
    pub poll_interval: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
        }
    }
}

struct Inner {
    // Bumped on submit/cancel/reset; a driver task holding a stale epoch may
    // not transition anything.
    epoch: u64,
    job_id: Option<Uuid>,
    state: JobState,
    payload: Option<Arc<ImagePayload>>,
    progress: f64,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    error: Option<JobError>,
    result: Option<Arc<ClassificationRecord>>,
    unsaved: Option<RawClassification>,
    remote: Option<JobHandle>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            epoch: 0,
            job_id: None,
            state: JobState::Idle,
            payload: None,
            progress: 0.0,
            started_at: None,
            ended_at: None,
            error: None,
            result: None,
            unsaved: None,
            remote: None,
            cancel_tx: None,
        }
    }
}

struct Shared {
    classifier: Arc<dyn Classifier>,
    history: Arc<dyn RecordSink>,
    opts: ControllerOptions,
    inner: Mutex<Inner>,
    snapshot_tx: watch::Sender<JobSnapshot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Transitions never panic while holding the lock; a poisoned lock here
        // means a bug, and continuing with the inner state is still sound.
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn publish(&self, inner: &Inner) {
        self.snapshot_tx.send_replace(JobSnapshot {
            job_id: inner.job_id,
            state: inner.state,
            progress: inner.progress,
            image_selected: inner.payload.is_some(),
            started_at: inner.started_at,
            ended_at: inner.ended_at,
            error: inner.error.clone(),
            result: inner.result.clone(),
        });
    }

    fn observe_duration(&self, inner: &Inner) {
        if let (Some(start), Some(end)) = (inner.started_at, inner.ended_at) {
            let secs = (end - start).num_milliseconds().max(0) as f64 / 1000.0;
            metrics::histogram!("classification_processing_seconds").record(secs);
        }
    }

    /// Fail the live job of `epoch`, returning the remote handle (if any) so
    /// the caller can fire a best-effort remote cancel.
    fn fail_job(&self, epoch: u64, kind: FailureKind, message: String) -> Option<JobHandle> {
        let mut inner = self.lock();
        if inner.epoch != epoch || !inner.state.is_live() {
            tracing::debug!(%kind, "discarding failure from stale job task");
            return None;
        }
        let job_id = inner.job_id;
        inner.state = JobState::Failed;
        inner.ended_at = Some(Utc::now());
        inner.error = Some(JobError {
            kind,
            message: message.clone(),
        });
        inner.cancel_tx = None;
        let handle = inner.remote.take();
        self.publish(&inner);
        self.observe_duration(&inner);
        metrics::counter!("classification_jobs_failed").increment(1);
        tracing::warn!(job_id = ?job_id, %kind, reason = %message, "classification job failed");
        handle
    }
}

/// Owner of the session's single classification job. All state changes go
/// through these guarded operations; observers read [`JobSnapshot`]s.
#[derive(Clone)]
pub struct JobController {
    shared: Arc<Shared>,
}

impl JobController {
    pub fn new(classifier: Arc<dyn Classifier>, history: Arc<dyn RecordSink>) -> Self {
        Self::with_options(classifier, history, ControllerOptions::default())
    }

    pub fn with_options(
        classifier: Arc<dyn Classifier>,
        history: Arc<dyn RecordSink>,
        opts: ControllerOptions,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(JobSnapshot::initial());
        Self {
            shared: Arc::new(Shared {
                classifier,
                history,
                opts,
                inner: Mutex::new(Inner::new()),
                snapshot_tx,
            }),
        }
    }

    /// Select (or replace) the image for the next submission.
    pub fn select_image(&self, payload: ImagePayload) -> Result<(), ControllerError> {
        let mut inner = self.shared.lock();
        match inner.state {
            JobState::Idle | JobState::ImageReady => {
                if inner.payload.is_some() {
                    tracing::debug!("replacing previously selected image");
                }
                inner.payload = Some(Arc::new(payload));
                inner.state = JobState::ImageReady;
                self.shared.publish(&inner);
                Ok(())
            }
            state if state.is_live() => Err(ControllerError::JobAlreadyInFlight),
            state => Err(ControllerError::InvalidTransition {
                op: "select_image",
                state,
            }),
        }
    }

    /// Submit the selected image for classification. Spawns the background
    /// driver task; callers observe completion through snapshots.
    pub fn submit(&self) -> Result<Uuid, ControllerError> {
        let (job_id, payload, epoch, cancel_rx);
        {
            let mut inner = self.shared.lock();
            match inner.state {
                JobState::Idle => return Err(ControllerError::NoImageSelected),
                state if state.is_live() => return Err(ControllerError::JobAlreadyInFlight),
                JobState::ImageReady => {}
                state => {
                    return Err(ControllerError::InvalidTransition { op: "submit", state })
                }
            }
            payload = inner
                .payload
                .clone()
                .ok_or(ControllerError::NoImageSelected)?;

            job_id = Uuid::new_v4();
            inner.job_id = Some(job_id);
            inner.state = JobState::Submitting;
            inner.progress = 0.0;
            inner.started_at = Some(Utc::now());
            inner.ended_at = None;
            inner.error = None;
            inner.result = None;
            inner.unsaved = None;
            inner.remote = None;
            inner.epoch += 1;
            epoch = inner.epoch;

            let (tx, rx) = oneshot::channel();
            inner.cancel_tx = Some(tx);
            cancel_rx = rx;
            self.shared.publish(&inner);
        }

        metrics::counter!("classification_jobs_submitted").increment(1);
        tracing::info!(%job_id, size_bytes = payload.size_bytes(), "classification job submitted");

        let shared = self.shared.clone();
        tokio::spawn(drive_job(shared, payload, job_id, epoch, cancel_rx));
        Ok(job_id)
    }

    /// Cancel the in-flight job. Local state reaches `Cancelled` before this
    /// returns; the remote cancel is fired afterwards and never waited on.
    pub fn cancel(&self) -> Result<(), ControllerError> {
        let (job_id, handle);
        {
            let mut inner = self.shared.lock();
            if !inner.state.is_live() {
                return Err(ControllerError::InvalidTransition {
                    op: "cancel",
                    state: inner.state,
                });
            }
            inner.state = JobState::Cancelled;
            inner.ended_at = Some(Utc::now());
            inner.epoch += 1;
            if let Some(tx) = inner.cancel_tx.take() {
                let _ = tx.send(());
            }
            handle = inner.remote.take();
            job_id = inner.job_id;
            self.shared.publish(&inner);
            self.shared.observe_duration(&inner);
        }

        metrics::counter!("classification_jobs_cancelled").increment(1);
        tracing::info!(job_id = ?job_id, "classification job cancelled locally");

        if let Some(handle) = handle {
            let classifier = self.shared.classifier.clone();
            tokio::spawn(async move {
                classifier.cancel(&handle).await;
            });
        }
        Ok(())
    }

    /// Return a terminal job to `Idle`, discarding its payload and outcome.
    pub fn reset(&self) -> Result<(), ControllerError> {
        let mut inner = self.shared.lock();
        match inner.state {
            JobState::Idle => Ok(()),
            state if state.is_terminal() => {
                let epoch = inner.epoch + 1;
                *inner = Inner::new();
                inner.epoch = epoch;
                self.shared.publish(&inner);
                Ok(())
            }
            state => Err(ControllerError::InvalidTransition { op: "reset", state }),
        }
    }

    /// Current state, cheap to call from any thread.
    pub fn snapshot(&self) -> JobSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    /// Watch every state transition; the receiver always holds the latest
    /// snapshot.
    pub fn subscribe(&self) -> watch::Receiver<JobSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// After a `PersistFailed` job: the raw classifier response that could not
    /// be appended, kept for inspection and manual retry.
    pub fn unsaved_result(&self) -> Option<RawClassification> {
        self.shared.lock().unsaved.clone()
    }
}

/// Background task for one submission: classifier call, poll loop, terminal
/// transition — all under the wall-clock budget.
async fn drive_job(
    shared: Arc<Shared>,
    payload: Arc<ImagePayload>,
    job_id: Uuid,
    epoch: u64,
    cancel_rx: oneshot::Receiver<()>,
) {
    let budget = shared.opts.timeout;
    tokio::select! {
        _ = cancel_rx => {
            tracing::debug!(%job_id, "job driver stopped after local cancel");
        }
        outcome = tokio::time::timeout(budget, run_classifier(&shared, &payload, job_id, epoch)) => {
            if outcome.is_err() {
                let handle = shared.fail_job(
                    epoch,
                    FailureKind::ClassifierTimeout,
                    format!("no terminal state within {}s", budget.as_secs_f64()),
                );
                if let Some(handle) = handle {
                    shared.classifier.cancel(&handle).await;
                }
            }
        }
    }
}

async fn run_classifier(shared: &Arc<Shared>, payload: &ImagePayload, job_id: Uuid, epoch: u64) {
    let handle = match shared.classifier.submit(payload).await {
        Ok(handle) => handle,
        Err(e) => {
            shared.fail_job(epoch, FailureKind::ClassifierUnavailable, e.to_string());
            return;
        }
    };

    // Submission acknowledged: Submitting -> InProgress
    {
        let mut inner = shared.lock();
        if inner.epoch != epoch || inner.state != JobState::Submitting {
            return;
        }
        inner.state = JobState::InProgress;
        inner.remote = Some(handle.clone());
        shared.publish(&inner);
    }
    tracing::info!(%job_id, handle = %handle.0, "classifier acknowledged job");

    loop {
        tokio::time::sleep(shared.opts.poll_interval).await;
        match shared.classifier.poll(&handle).await {
            Ok(PollUpdate::Progress { percent }) => {
                if !apply_progress(shared, epoch, job_id, percent) {
                    return;
                }
            }
            Ok(PollUpdate::Finished(raw)) => {
                complete_job(shared, epoch, job_id, raw);
                return;
            }
            Ok(PollUpdate::Failed { code, message }) => {
                shared.fail_job(
                    epoch,
                    FailureKind::ClassifierFailed,
                    format!("{code}: {message}"),
                );
                return;
            }
            Err(e) => {
                shared.fail_job(epoch, FailureKind::ClassifierUnavailable, e.to_string());
                return;
            }
        }
    }
}

/// Apply a progress update, enforcing monotonicity. Returns false when the
/// job is no longer this task's to drive.
fn apply_progress(shared: &Shared, epoch: u64, job_id: Uuid, percent: f64) -> bool {
    let mut inner = shared.lock();
    if inner.epoch != epoch || inner.state != JobState::InProgress {
        return false;
    }
    let clamped = if percent.is_finite() {
        percent.clamp(0.0, 100.0)
    } else {
        0.0
    };
    if clamped < inner.progress {
        tracing::warn!(
            %job_id,
            current = inner.progress,
            update = clamped,
            "ignoring regressive progress update"
        );
        return true;
    }
    inner.progress = clamped;
    shared.publish(&inner);
    true
}

fn complete_job(shared: &Shared, epoch: u64, job_id: Uuid, raw: RawClassification) {
    let mut inner = shared.lock();
    if inner.epoch != epoch || inner.state != JobState::InProgress {
        tracing::debug!(%job_id, "discarding result from stale job task");
        return;
    }

    let Some(image) = inner.payload.clone() else {
        // Unreachable by construction: payload is held for the whole job.
        inner.state = JobState::Failed;
        inner.ended_at = Some(Utc::now());
        inner.error = Some(JobError {
            kind: FailureKind::InvalidClassifierResponse,
            message: "job payload missing at completion".to_string(),
        });
        shared.publish(&inner);
        return;
    };

    let record = match ClassificationRecord::from_raw(raw.clone(), image) {
        Ok(record) => Arc::new(record),
        Err(e) => {
            inner.state = JobState::Failed;
            inner.ended_at = Some(Utc::now());
            inner.error = Some(JobError {
                kind: FailureKind::InvalidClassifierResponse,
                message: e.to_string(),
            });
            inner.cancel_tx = None;
            inner.remote = None;
            shared.publish(&inner);
            shared.observe_duration(&inner);
            metrics::counter!("classification_jobs_failed").increment(1);
            tracing::warn!(%job_id, error = %e, "classifier response rejected");
            return;
        }
    };

    // Succeeded is only reported after the record is durably in the history.
    match shared.history.append(record.clone()) {
        Ok(()) => {
            inner.progress = 100.0;
            inner.state = JobState::Succeeded;
            inner.ended_at = Some(Utc::now());
            inner.result = Some(record.clone());
            inner.cancel_tx = None;
            inner.remote = None;
            shared.publish(&inner);
            shared.observe_duration(&inner);
            metrics::counter!("classification_jobs_completed").increment(1);
            tracing::info!(
                %job_id,
                record_id = %record.id,
                breed = %record.breed,
                confidence = record.confidence,
                "classification job succeeded"
            );
        }
        Err(e) => {
            inner.state = JobState::Failed;
            inner.ended_at = Some(Utc::now());
            inner.error = Some(JobError {
                kind: FailureKind::PersistFailed,
                message: e.to_string(),
            });
            // Keep the successful response inspectable for manual retry.
            inner.unsaved = Some(raw);
            inner.cancel_tx = None;
            inner.remote = None;
            shared.publish(&inner);
            shared.observe_duration(&inner);
            metrics::counter!("classification_jobs_failed").increment(1);
            tracing::error!(%job_id, error = %e, "failed to append record to history");
        }
    }
}
