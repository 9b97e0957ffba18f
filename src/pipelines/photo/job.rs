// SPDX-License-Identifier: MPL-2.0

//! Bookkeeping for one fan-out still capture

use crate::errors::CameraError;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info};
use uuid::Uuid;

/// What one camera contributed to a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOutcome {
    Saved(PathBuf),
    Failed(CameraError),
}

/// Why a job resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Every camera reported before the deadline
    Completed,
    /// The deadline fired first; missing cameras are simply absent
    DeadlineReached,
}

/// The result a capture job resolves with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureReport {
    pub job_id: Uuid,
    /// Job output directory, `None` when nothing was dispatched
    pub directory: Option<PathBuf>,
    /// Cameras dispatched, in enumeration order
    pub cameras: Vec<String>,
    pub saved: BTreeMap<String, PathBuf>,
    pub failed: BTreeMap<String, CameraError>,
    pub resolution: Resolution,
    pub elapsed: Duration,
}

impl CaptureReport {
    /// Resolution for a request that found no back-facing cameras
    pub fn empty(job_id: Uuid) -> Self {
        Self {
            job_id,
            directory: None,
            cameras: Vec::new(),
            saved: BTreeMap::new(),
            failed: BTreeMap::new(),
            resolution: Resolution::Completed,
            elapsed: Duration::ZERO,
        }
    }

    /// Saved files in camera enumeration order
    pub fn paths(&self) -> Vec<PathBuf> {
        self.cameras
            .iter()
            .filter_map(|id| self.saved.get(id).cloned())
            .collect()
    }

    /// Cameras that neither saved nor failed before resolution
    pub fn missing(&self) -> Vec<&str> {
        self.cameras
            .iter()
            .filter(|id| !self.saved.contains_key(*id) && !self.failed.contains_key(*id))
            .map(String::as_str)
            .collect()
    }
}

struct JobState {
    results: BTreeMap<String, DeviceOutcome>,
    resolver: Option<oneshot::Sender<CaptureReport>>,
}

/// An outstanding capture across several cameras
///
/// Each camera records into its own slot; the job resolves exactly once,
/// either when every slot is filled (if enabled) or when [`resolve`] is
/// called by the deadline. Anything recorded afterwards is dropped.
///
/// [`resolve`]: CaptureJob::resolve
pub struct CaptureJob {
    id: Uuid,
    cameras: Vec<String>,
    directory: PathBuf,
    timestamp: String,
    started: Instant,
    resolve_when_complete: bool,
    state: Mutex<JobState>,
}

impl CaptureJob {
    pub fn new(
        id: Uuid,
        cameras: Vec<String>,
        directory: PathBuf,
        timestamp: String,
        resolve_when_complete: bool,
    ) -> (Self, oneshot::Receiver<CaptureReport>) {
        let (tx, rx) = oneshot::channel();
        let job = Self {
            id,
            cameras,
            directory,
            timestamp,
            started: Instant::now(),
            resolve_when_complete,
            state: Mutex::new(JobState {
                results: BTreeMap::new(),
                resolver: Some(tx),
            }),
        };
        (job, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cameras(&self) -> &[String] {
        &self.cameras
    }

    pub fn directory(&self) -> &PathBuf {
        &self.directory
    }

    /// Timestamp embedded in every file name of this job
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Fill `camera_id`'s slot. Returns false if the outcome was dropped.
    pub fn record(&self, camera_id: &str, outcome: DeviceOutcome) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.resolver.is_none() {
            debug!(job_id = %self.id, camera_id, "Result after job resolved, dropping");
            return false;
        }
        if !self.cameras.iter().any(|id| id == camera_id) || state.results.contains_key(camera_id)
        {
            debug!(job_id = %self.id, camera_id, "Unexpected or duplicate result, dropping");
            return false;
        }

        state.results.insert(camera_id.to_string(), outcome);
        if self.resolve_when_complete && state.results.len() == self.cameras.len() {
            self.finish(&mut state, Resolution::Completed);
        }
        true
    }

    /// Resolve now with whatever has been recorded. False if already resolved.
    pub fn resolve(&self, resolution: Resolution) -> bool {
        let mut state = self.state.lock().unwrap();
        self.finish(&mut state, resolution)
    }

    pub fn is_resolved(&self) -> bool {
        self.state.lock().unwrap().resolver.is_none()
    }

    /// Slots filled so far (saved or failed)
    pub fn completed_count(&self) -> usize {
        self.state.lock().unwrap().results.len()
    }

    fn finish(&self, state: &mut JobState, resolution: Resolution) -> bool {
        let Some(resolver) = state.resolver.take() else {
            return false;
        };

        let mut saved = BTreeMap::new();
        let mut failed = BTreeMap::new();
        for (camera_id, outcome) in &state.results {
            match outcome {
                DeviceOutcome::Saved(path) => {
                    saved.insert(camera_id.clone(), path.clone());
                }
                DeviceOutcome::Failed(error) => {
                    failed.insert(camera_id.clone(), error.clone());
                }
            }
        }

        let report = CaptureReport {
            job_id: self.id,
            directory: Some(self.directory.clone()),
            cameras: self.cameras.clone(),
            saved,
            failed,
            resolution,
            elapsed: self.started.elapsed(),
        };
        info!(
            job_id = %self.id,
            ?resolution,
            saved = report.saved.len(),
            failed = report.failed.len(),
            expected = self.cameras.len(),
            "Capture job resolved"
        );
        if resolver.send(report).is_err() {
            debug!(job_id = %self.id, "Capture job result was not awaited");
        }
        true
    }
}

impl std::fmt::Debug for CaptureJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureJob")
            .field("id", &self.id)
            .field("cameras", &self.cameras)
            .field("completed", &self.completed_count())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(cameras: &[&str], resolve_when_complete: bool) -> (CaptureJob, oneshot::Receiver<CaptureReport>) {
        CaptureJob::new(
            Uuid::new_v4(),
            cameras.iter().map(|c| c.to_string()).collect(),
            PathBuf::from("/tmp/job"),
            "20240101_000000_000".to_string(),
            resolve_when_complete,
        )
    }

    #[test]
    fn test_resolves_once_all_slots_filled() {
        let (job, mut rx) = job(&["0", "2"], true);
        assert!(job.record("0", DeviceOutcome::Saved(PathBuf::from("a.jpg"))));
        assert!(!job.is_resolved());
        assert!(job.record(
            "2",
            DeviceOutcome::Failed(CameraError::SessionConfigure("no".to_string()))
        ));
        assert!(job.is_resolved());

        let report = rx.try_recv().unwrap();
        assert_eq!(report.resolution, Resolution::Completed);
        assert_eq!(report.paths(), vec![PathBuf::from("a.jpg")]);
        assert!(report.failed.contains_key("2"));
        assert!(report.missing().is_empty());
    }

    #[test]
    fn test_nothing_added_after_resolution() {
        let (job, mut rx) = job(&["0", "1"], true);
        assert!(job.record("0", DeviceOutcome::Saved(PathBuf::from("a.jpg"))));
        assert!(job.resolve(Resolution::DeadlineReached));
        assert!(!job.resolve(Resolution::DeadlineReached));
        assert!(!job.record("1", DeviceOutcome::Saved(PathBuf::from("b.jpg"))));

        let report = rx.try_recv().unwrap();
        assert_eq!(report.resolution, Resolution::DeadlineReached);
        assert_eq!(report.saved.len(), 1);
        assert_eq!(report.missing(), vec!["1"]);
    }

    #[test]
    fn test_first_outcome_per_camera_wins() {
        let (job, _rx) = job(&["0", "1"], true);
        assert!(job.record("0", DeviceOutcome::Saved(PathBuf::from("a.jpg"))));
        assert!(!job.record("0", DeviceOutcome::Saved(PathBuf::from("b.jpg"))));
        assert!(!job.record("7", DeviceOutcome::Saved(PathBuf::from("c.jpg"))));
        assert_eq!(job.completed_count(), 1);
    }

    #[test]
    fn test_waits_for_deadline_when_configured() {
        let (job, mut rx) = job(&["0"], false);
        assert!(job.record("0", DeviceOutcome::Saved(PathBuf::from("a.jpg"))));
        assert!(!job.is_resolved());
        assert!(rx.try_recv().is_err());
        assert!(job.resolve(Resolution::DeadlineReached));
        assert_eq!(rx.try_recv().unwrap().saved.len(), 1);
    }
}
