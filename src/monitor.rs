use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ProctorError, Result};
use crate::media::{MediaDevices, MediaRequest, MediaStream, TrackView};
use crate::policy::{PolicyDecision, ViolationEvent, ViolationKind, ViolationPolicy};

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Live integrity snapshot, updated on every sample and every discrete signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProctoringState {
    pub camera_enabled: bool,
    pub face_detected: bool,
    pub tab_focused: bool,
    pub violation_count: u32,
    pub is_disqualified: bool,
    pub last_violation: Option<ViolationKind>,
}

impl Default for ProctoringState {
    fn default() -> Self {
        Self {
            camera_enabled: false,
            face_detected: false,
            tab_focused: true,
            violation_count: 0,
            is_disqualified: false,
            last_violation: None,
        }
    }
}

/// Pluggable face-presence signal. Real detection lives outside this crate.
pub trait FaceDetector {
    fn face_present(&mut self, camera: &TrackView) -> bool;
}

/// Stand-in used when no detector is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeFacePresent;

impl FaceDetector for AssumeFacePresent {
    fn face_present(&mut self, _camera: &TrackView) -> bool {
        true
    }
}

/// Face signal driven from outside, e.g. a key binding or a test.
#[derive(Debug, Clone)]
pub struct SharedFaceSignal {
    present: Arc<AtomicBool>,
}

impl SharedFaceSignal {
    pub fn new(present: bool) -> Self {
        Self {
            present: Arc::new(AtomicBool::new(present)),
        }
    }

    pub fn set(&self, present: bool) {
        self.present.store(present, Ordering::SeqCst);
    }

    pub fn get(&self) -> bool {
        self.present.load(Ordering::SeqCst)
    }
}

impl FaceDetector for SharedFaceSignal {
    fn face_present(&mut self, _camera: &TrackView) -> bool {
        self.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorReport {
    pub event: ViolationEvent,
    pub decision: PolicyDecision,
}

/// Owns the camera stream and the violation counter for one session.
pub struct ProctoringMonitor {
    policy: ViolationPolicy,
    state: ProctoringState,
    stream: Option<MediaStream>,
    faces: Box<dyn FaceDetector>,
    interval: Duration,
    since_sample: Duration,
    sampling: bool,
}

impl ProctoringMonitor {
    pub fn new(max_violations: u32, interval: Duration, faces: Box<dyn FaceDetector>) -> Self {
        Self {
            policy: ViolationPolicy::new(max_violations),
            state: ProctoringState::default(),
            stream: None,
            faces,
            interval,
            since_sample: Duration::ZERO,
            sampling: false,
        }
    }

    pub fn state(&self) -> &ProctoringState {
        &self.state
    }

    pub fn policy(&self) -> &ViolationPolicy {
        &self.policy
    }

    pub fn is_sampling(&self) -> bool {
        self.sampling
    }

    pub fn has_camera(&self) -> bool {
        self.stream.is_some()
    }

    pub fn camera(&self) -> Option<TrackView> {
        self.stream
            .as_ref()
            .and_then(MediaStream::video)
            .map(|t| t.view())
    }

    /// Ask for camera and microphone. A denial leaves the monitor idle and may be retried.
    pub fn acquire(&mut self, devices: &mut dyn MediaDevices) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        match devices.acquire(MediaRequest::CAMERA_AND_MIC) {
            Ok(stream) => {
                self.state.camera_enabled = stream.video().is_some_and(|t| t.is_live());
                self.state.face_detected = true;
                info!(tracks = stream.tracks().len(), "camera acquired");
                self.stream = Some(stream);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "camera acquisition failed");
                Err(err)
            }
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_none() {
            return Err(ProctorError::InvalidAction(
                "monitoring needs an acquired camera".into(),
            ));
        }
        self.sampling = true;
        self.since_sample = Duration::ZERO;
        debug!(interval_ms = self.interval.as_millis() as u64, "sampling started");
        Ok(())
    }

    /// Advance the sampling loop by `dt`; samples at most once per call.
    pub fn tick(&mut self, dt: Duration) -> Vec<MonitorReport> {
        if !self.sampling {
            return Vec::new();
        }
        self.since_sample += dt;
        if self.since_sample < self.interval {
            return Vec::new();
        }
        self.since_sample = Duration::ZERO;
        self.sample()
    }

    /// Check every signal now, reporting each positive-to-negative transition.
    pub fn sample(&mut self) -> Vec<MonitorReport> {
        let mut reports = Vec::new();
        if !self.sampling {
            return reports;
        }

        let camera = self.camera();
        let camera_live = camera.as_ref().is_some_and(TrackView::is_live);

        if self.state.camera_enabled && !camera_live {
            self.state.camera_enabled = false;
            self.state.face_detected = false;
            reports.push(self.strike(ViolationKind::CameraOff));
            if !self.sampling {
                return reports;
            }
        } else if camera_live && !self.state.camera_enabled {
            info!("camera back online");
            self.state.camera_enabled = true;
        }

        if let Some(camera) = camera.filter(|_| camera_live) {
            let present = self.faces.face_present(&camera);
            let lost = self.state.face_detected && !present;
            self.state.face_detected = present;
            if lost {
                reports.push(self.strike(ViolationKind::NoFace));
            }
        }

        reports
    }

    /// Discrete focus change, handled immediately rather than at the next sample.
    pub fn set_focus(&mut self, focused: bool) -> Option<MonitorReport> {
        if self.state.tab_focused == focused {
            return None;
        }
        self.state.tab_focused = focused;
        if focused || !self.sampling {
            return None;
        }
        Some(self.strike(ViolationKind::TabSwitched))
    }

    /// Count a violation detected elsewhere (clipboard, shortcuts).
    pub fn report(&mut self, kind: ViolationKind) -> Option<MonitorReport> {
        if !self.sampling {
            return None;
        }
        Some(self.strike(kind))
    }

    fn strike(&mut self, kind: ViolationKind) -> MonitorReport {
        let event = ViolationEvent::now(kind);
        let decision = self.policy.record(kind);

        self.state.violation_count = decision.count;
        self.state.is_disqualified = self.policy.is_disqualified();
        self.state.last_violation = Some(kind);

        warn!(
            %kind,
            count = decision.count,
            max = self.policy.max_violations(),
            "integrity violation"
        );
        if decision.disqualify_now {
            self.sampling = false;
            warn!("violation limit reached, sampling stopped");
        }

        MonitorReport { event, decision }
    }

    /// Stop sampling and every device track. Safe to call any number of times.
    pub fn release(&mut self) {
        self.sampling = false;
        self.state.camera_enabled = false;
        if let Some(stream) = self.stream.take() {
            stream.stop_all();
            info!("camera released");
        }
    }
}

impl Drop for ProctoringMonitor {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ProctoringMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProctoringMonitor")
            .field("state", &self.state)
            .field("sampling", &self.sampling)
            .field("has_camera", &self.stream.is_some())
            .finish()
    }
}
