use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

use crate::clock::{SessionClock, SessionTimer};
use crate::error::{ProctorError, Result};
use crate::guard::{default_blocked_shortcuts, AntiTamperGuard, Interaction, Shortcut, Verdict};
use crate::media::MediaDevices;
use crate::modality::coding::SimulatedRunner;
use crate::modality::{Action, ActionOutcome, Answers, CodeRunner, Modality, ModalityState, QuestionSet};
use crate::monitor::{
    AssumeFacePresent, FaceDetector, MonitorReport, ProctoringMonitor, ProctoringState,
    DEFAULT_SAMPLE_INTERVAL,
};
use crate::policy::{ViolationEvent, DEFAULT_MAX_VIOLATIONS};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(String);

impl QuestionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for QuestionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for QuestionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
    Intro,
    Active,
    Completed,
    Disqualified,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Disqualified)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub max_violations: u32,
    pub total_seconds: u32,
    pub monitor_interval: Duration,
    pub blocked_shortcuts: Vec<Shortcut>,
    pub questions: QuestionSet,
}

impl SessionConfig {
    pub fn new(total_seconds: u32, questions: QuestionSet) -> Self {
        Self {
            max_violations: DEFAULT_MAX_VIOLATIONS,
            total_seconds,
            monitor_interval: DEFAULT_SAMPLE_INTERVAL,
            blocked_shortcuts: default_blocked_shortcuts(),
            questions,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_violations == 0 {
            return Err(ProctorError::InvalidConfig(
                "max_violations must be at least 1".into(),
            ));
        }
        if self.total_seconds == 0 {
            return Err(ProctorError::InvalidConfig(
                "total_seconds must be at least 1".into(),
            ));
        }
        if self.monitor_interval.is_zero() {
            return Err(ProctorError::InvalidConfig(
                "monitor_interval must be positive".into(),
            ));
        }
        if self.questions.is_empty() {
            return Err(ProctorError::InvalidConfig("no questions".into()));
        }
        if let Some(dup) = self.questions.ids().into_iter().duplicates().next() {
            return Err(ProctorError::InvalidConfig(format!(
                "duplicate question id `{dup}`"
            )));
        }
        if let QuestionSet::Interview(questions) = &self.questions {
            if let Some(q) = questions.iter().find(|q| q.time_limit_secs == Some(0)) {
                return Err(ProctorError::InvalidConfig(format!(
                    "question `{}` has a zero answer time limit",
                    q.id
                )));
            }
        }
        Ok(())
    }
}

/// The only value handed to persistence once a session is over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: String,
    pub modality: Modality,
    pub status: SessionStatus,
    pub answers: Answers,
    pub score: Option<u32>,
    pub violation_count: u32,
    pub elapsed_seconds: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Subscription interface for whatever renders or records a session.
pub trait SessionObserver {
    fn on_state(&mut self, _state: &ProctoringState) {}
    fn on_violation(&mut self, _event: &ViolationEvent, _state: &ProctoringState) {}
    fn on_disqualify(&mut self, _result: &SessionResult) {}
    fn on_complete(&mut self, _result: &SessionResult) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    State(ProctoringState),
    Violation(ViolationEvent, u32),
    Disqualified(SessionResult),
    Completed(SessionResult),
}

/// Observer that keeps a shared log of what it saw. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Observed>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Observed> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Most recent proctoring snapshot pushed through `on_state`.
    pub fn last_state(&self) -> Option<ProctoringState> {
        self.events.lock().ok().and_then(|events| {
            events.iter().rev().find_map(|e| match e {
                Observed::State(state) => Some(state.clone()),
                _ => None,
            })
        })
    }

    pub fn violations(&self) -> usize {
        self.count(|e| matches!(e, Observed::Violation(..)))
    }

    pub fn disqualifications(&self) -> usize {
        self.count(|e| matches!(e, Observed::Disqualified(_)))
    }

    pub fn completions(&self) -> usize {
        self.count(|e| matches!(e, Observed::Completed(_)))
    }

    fn count(&self, f: impl Fn(&Observed) -> bool) -> usize {
        self.events
            .lock()
            .map(|e| e.iter().filter(|o| f(o)).count())
            .unwrap_or(0)
    }

    fn push(&self, event: Observed) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl SessionObserver for EventLog {
    fn on_state(&mut self, state: &ProctoringState) {
        self.push(Observed::State(state.clone()));
    }

    fn on_violation(&mut self, event: &ViolationEvent, state: &ProctoringState) {
        self.push(Observed::Violation(*event, state.violation_count));
    }

    fn on_disqualify(&mut self, result: &SessionResult) {
        self.push(Observed::Disqualified(result.clone()));
    }

    fn on_complete(&mut self, result: &SessionResult) {
        self.push(Observed::Completed(result.clone()));
    }
}

fn new_session_id() -> String {
    format!(
        "{}-{:04x}",
        Utc::now().format("%Y%m%dT%H%M%S"),
        rand::random::<u16>()
    )
}

/// One monitored attempt at an assessment.
///
/// Every mutation goes through `&mut self`, so whoever owns the session is its
/// single writer. Ticks, focus changes, interceptions and user actions are
/// all funneled through here by the event loop.
pub struct AssessmentSession {
    id: String,
    status: SessionStatus,
    max_violations: u32,
    monitor_interval: Duration,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    monitor: ProctoringMonitor,
    clock: SessionClock,
    guard: AntiTamperGuard,
    modality: ModalityState,
    devices: Box<dyn MediaDevices>,
    observers: Vec<Box<dyn SessionObserver>>,
    result: Option<SessionResult>,
    last_error: Option<String>,
}

impl AssessmentSession {
    pub fn new(config: SessionConfig, devices: Box<dyn MediaDevices>) -> Result<Self> {
        config.validate()?;
        let SessionConfig {
            max_violations,
            total_seconds,
            monitor_interval,
            blocked_shortcuts,
            questions,
        } = config;

        Ok(Self {
            id: new_session_id(),
            status: SessionStatus::Intro,
            max_violations,
            monitor_interval,
            started_at: None,
            completed_at: None,
            monitor: ProctoringMonitor::new(
                max_violations,
                monitor_interval,
                Box::new(AssumeFacePresent),
            ),
            clock: SessionClock::new(total_seconds),
            guard: AntiTamperGuard::new(blocked_shortcuts),
            modality: ModalityState::new(questions, Box::<SimulatedRunner>::default()),
            devices,
            observers: Vec::new(),
            result: None,
            last_error: None,
        })
    }

    /// Replace the face-presence signal. Only meaningful before [`begin`](Self::begin).
    pub fn with_face_detector(mut self, faces: Box<dyn FaceDetector>) -> Self {
        self.monitor = ProctoringMonitor::new(self.max_violations, self.monitor_interval, faces);
        self
    }

    pub fn with_code_runner(mut self, runner: Box<dyn CodeRunner>) -> Self {
        if let ModalityState::Coding(state) = &mut self.modality {
            state.set_runner(runner);
        }
        self
    }

    pub fn subscribe(&mut self, observer: Box<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn modality(&self) -> Modality {
        self.modality.modality()
    }

    pub fn modality_state(&self) -> &ModalityState {
        &self.modality
    }

    pub fn proctoring(&self) -> &ProctoringState {
        self.monitor.state()
    }

    pub fn max_violations(&self) -> u32 {
        self.max_violations
    }

    pub fn timer(&self) -> SessionTimer {
        self.clock.timer()
    }

    pub fn guard(&self) -> &AntiTamperGuard {
        &self.guard
    }

    pub fn camera_held(&self) -> bool {
        self.monitor.has_camera()
    }

    /// Why the last attempt to enter the session failed, for the permission screen.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn result(&self) -> Option<&SessionResult> {
        self.result.as_ref()
    }

    /// Hand the result over to the caller; the session keeps nothing afterwards.
    pub fn take_result(&mut self) -> Option<SessionResult> {
        self.result.take()
    }

    fn ensure_active(&self) -> Result<()> {
        match self.status {
            SessionStatus::Active => Ok(()),
            SessionStatus::Disqualified => Err(ProctorError::Disqualified),
            status => Err(ProctorError::NotActive { status }),
        }
    }

    /// Leave the instructions screen: acquire the camera and start every monitor.
    /// A permission failure keeps the session in `Intro` so the user can retry.
    pub fn begin(&mut self) -> Result<()> {
        if self.status != SessionStatus::Intro {
            return Err(ProctorError::NotActive {
                status: self.status,
            });
        }
        let _span = info_span!("session", id = %self.id).entered();

        if let Err(err) = self.monitor.acquire(self.devices.as_mut()) {
            self.last_error = Some(err.to_string());
            return Err(err);
        }
        self.monitor.start()?;
        self.clock.start();
        self.guard.arm();
        self.last_error = None;
        self.status = SessionStatus::Active;
        self.started_at = Some(Utc::now());

        info!(modality = %self.modality(), "session started");
        self.notify_state();
        Ok(())
    }

    /// Advance all periodic work by `dt`. Monitoring runs before the clock so a
    /// disqualification in the same tick wins over expiry.
    pub fn tick(&mut self, dt: Duration) {
        if self.status != SessionStatus::Active {
            return;
        }
        let before = self.monitor.state().clone();
        let reports = self.monitor.tick(dt);
        if reports.is_empty() {
            // Recoveries (camera back, face back) change state without a violation.
            if *self.monitor.state() != before {
                self.notify_state();
            }
        } else if self.absorb(reports) {
            return;
        }

        self.modality.tick(dt);

        if let Some(tick) = self.clock.tick(dt) {
            if tick.expired {
                info!("time is up");
                self.finish(SessionStatus::Completed);
            }
        }
    }

    /// Discrete focus signal from the front end. Before `begin` the flag is
    /// only recorded, so the session starts with the real focus state.
    pub fn set_focus(&mut self, focused: bool) {
        if self.status.is_terminal() {
            return;
        }
        match self.monitor.set_focus(focused) {
            Some(report) => {
                self.absorb(vec![report]);
            }
            None => self.notify_state(),
        }
    }

    /// Let the guard look at an interaction before it reaches the assessment.
    pub fn intercept(&mut self, interaction: &Interaction) -> Verdict {
        if self.status != SessionStatus::Active {
            return Verdict::Allow;
        }
        let verdict = self.guard.intercept(interaction);
        if let Verdict::Blocked(kind) = verdict {
            let report = self.monitor.report(kind);
            self.absorb(report.into_iter().collect());
        }
        verdict
    }

    pub fn act(&mut self, action: Action) -> Result<()> {
        self.ensure_active()?;
        let camera = self.monitor.camera();
        let outcome = self.modality.apply(action, self.devices.as_mut(), camera)?;
        if outcome == ActionOutcome::Finished {
            self.finish(SessionStatus::Completed);
        }
        Ok(())
    }

    /// User-initiated submission. Loses to an expiry that already completed the session.
    pub fn submit(&mut self) -> Result<&SessionResult> {
        self.ensure_active()?;
        info!("submitted by candidate");
        self.finish(SessionStatus::Completed);
        self.result
            .as_ref()
            .ok_or(ProctorError::NotActive {
                status: self.status,
            })
    }

    /// Walk away without producing a result. Every device is released on drop.
    pub fn abandon(self) {
        if self.status == SessionStatus::Active {
            warn!(id = %self.id, "session abandoned");
        }
    }

    fn teardown(&mut self) {
        self.modality.abort();
        self.guard.disarm();
        self.clock.stop();
        self.monitor.release();
    }

    /// Feed monitor reports through the observers. Returns true if the session
    /// was disqualified as a result.
    fn absorb(&mut self, reports: Vec<MonitorReport>) -> bool {
        if reports.is_empty() {
            return false;
        }
        for report in reports {
            let state = self.monitor.state().clone();
            for observer in self.observers.iter_mut() {
                observer.on_violation(&report.event, &state);
            }
            if report.decision.disqualify_now {
                self.finish(SessionStatus::Disqualified);
                return true;
            }
        }
        self.notify_state();
        false
    }

    fn notify_state(&mut self) {
        let state = self.monitor.state().clone();
        for observer in self.observers.iter_mut() {
            observer.on_state(&state);
        }
    }

    /// The single terminal transition. Runs at most once per session.
    fn finish(&mut self, status: SessionStatus) {
        if self.status != SessionStatus::Active {
            return;
        }
        match status {
            SessionStatus::Completed => self.modality.finalize(),
            _ => self.modality.abort(),
        }
        self.teardown();

        let completed_at = Utc::now();
        self.status = status;
        self.completed_at = Some(completed_at);

        let result = SessionResult {
            session_id: self.id.clone(),
            modality: self.modality.modality(),
            status,
            answers: self.modality.answers(),
            score: self.modality.score(),
            violation_count: self.monitor.state().violation_count,
            elapsed_seconds: self.clock.timer().elapsed_seconds(),
            started_at: self.started_at.unwrap_or(completed_at),
            completed_at,
        };

        match status {
            SessionStatus::Disqualified => {
                warn!(
                    id = %self.id,
                    violations = result.violation_count,
                    "session disqualified"
                );
                for observer in self.observers.iter_mut() {
                    observer.on_disqualify(&result);
                }
            }
            _ => {
                info!(
                    id = %self.id,
                    answered = result.answers.len(),
                    elapsed = result.elapsed_seconds,
                    "session completed"
                );
                for observer in self.observers.iter_mut() {
                    observer.on_complete(&result);
                }
            }
        }
        self.notify_state();
        self.result = Some(result);
    }
}

impl Drop for AssessmentSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for AssessmentSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssessmentSession")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("proctoring", self.monitor.state())
            .field("timer", &self.clock.timer())
            .field("modality", &self.modality)
            .finish()
    }
}
