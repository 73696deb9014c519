//! Interactive front end state: turns terminal events into session calls.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::{info, warn};

use crate::error::Result;
use crate::guard::{Interaction, Verdict};
use crate::media::DeviceControl;
use crate::modality::{
    Action, CodingAction, InterviewAction, McqAction, ModalityState,
};
use crate::monitor::SharedFaceSignal;
use crate::runtime::ProctorEvent;
use crate::session::{AssessmentSession, SessionStatus};
use crate::store::{PendingSubmission, ResultSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppFlow {
    Continue,
    Quit,
}

/// Where the finished result currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionState {
    NotYet,
    Stored,
    Failed(String),
    /// No sink configured; the result only lives in memory.
    Unsaved,
}

pub struct App {
    pub session: AssessmentSession,
    pub bank_name: String,
    pub devices: DeviceControl,
    pub faces: SharedFaceSignal,
    /// Last message worth showing under the session, e.g. a refused action.
    pub notice: Option<String>,
    pub submission: SubmissionState,
    pending: Option<PendingSubmission>,
    sink: Option<Box<dyn ResultSink>>,
}

impl App {
    pub fn new(
        session: AssessmentSession,
        bank_name: impl Into<String>,
        devices: DeviceControl,
        faces: SharedFaceSignal,
    ) -> Self {
        Self {
            session,
            bank_name: bank_name.into(),
            devices,
            faces,
            notice: None,
            submission: SubmissionState::NotYet,
            pending: None,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn pending(&self) -> Option<&PendingSubmission> {
        self.pending.as_ref()
    }

    pub fn handle(&mut self, event: ProctorEvent) -> AppFlow {
        let flow = match event {
            ProctorEvent::Tick(dt) => {
                self.session.tick(dt);
                AppFlow::Continue
            }
            ProctorEvent::FocusLost => {
                self.session.set_focus(false);
                AppFlow::Continue
            }
            ProctorEvent::FocusGained => {
                self.session.set_focus(true);
                AppFlow::Continue
            }
            ProctorEvent::Paste(text) => {
                self.session.intercept(&Interaction::Paste(text));
                AppFlow::Continue
            }
            ProctorEvent::ContextMenu => {
                self.session.intercept(&Interaction::ContextMenu);
                AppFlow::Continue
            }
            ProctorEvent::Resize => AppFlow::Continue,
            ProctorEvent::Key(key) => self.on_key(key),
        };
        self.collect_result();
        flow
    }

    fn on_key(&mut self, key: KeyEvent) -> AppFlow {
        match self.session.status() {
            SessionStatus::Intro => match key.code {
                KeyCode::Enter => {
                    let begun = self.session.begin();
                    self.report(begun);
                    AppFlow::Continue
                }
                KeyCode::Esc | KeyCode::Char('q') => AppFlow::Quit,
                _ => AppFlow::Continue,
            },
            SessionStatus::Active => self.on_active_key(key),
            SessionStatus::Completed | SessionStatus::Disqualified => match key.code {
                KeyCode::Char('r') => {
                    self.retry_submission();
                    AppFlow::Continue
                }
                KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') => AppFlow::Quit,
                _ => AppFlow::Continue,
            },
        }
    }

    fn on_active_key(&mut self, key: KeyEvent) -> AppFlow {
        if let Verdict::Blocked(_) = self.session.intercept(&Interaction::Key(key)) {
            return AppFlow::Continue;
        }
        match key.code {
            KeyCode::Esc => {
                warn!("candidate quit an active session");
                return AppFlow::Quit;
            }
            KeyCode::F(2) => {
                let connected = !self.devices.camera_connected();
                self.devices.set_camera_connected(connected);
                return AppFlow::Continue;
            }
            KeyCode::F(3) => {
                self.faces.set(!self.faces.get());
                return AppFlow::Continue;
            }
            KeyCode::F(10) => {
                let submitted = self.session.submit().map(|_| ());
                self.report(submitted);
                return AppFlow::Continue;
            }
            _ => {}
        }
        if let Some(action) = key_action(self.session.modality_state(), key) {
            let applied = self.session.act(action);
            self.report(applied);
        }
        AppFlow::Continue
    }

    fn report(&mut self, outcome: Result<()>) {
        self.notice = match outcome {
            Ok(()) => None,
            Err(err) => Some(err.to_string()),
        };
    }

    /// Move a freshly finished result into a pending submission and try to store it.
    fn collect_result(&mut self) {
        if self.pending.is_some() {
            return;
        }
        if let Some(result) = self.session.take_result() {
            info!(status = %result.status, "session finished");
            self.pending = Some(PendingSubmission::new(result));
            self.retry_submission();
        }
    }

    pub fn retry_submission(&mut self) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        if self.submission == SubmissionState::Stored {
            return;
        }
        self.submission = match self.sink.as_mut() {
            None => SubmissionState::Unsaved,
            Some(sink) => match pending.submit_to(&mut **sink) {
                Ok(()) => SubmissionState::Stored,
                Err(err) => SubmissionState::Failed(err.to_string()),
            },
        };
    }
}

/// Keys that mean something for the current modality.
pub fn key_action(state: &ModalityState, key: KeyEvent) -> Option<Action> {
    if key
        .modifiers
        .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER)
    {
        return None;
    }
    match state {
        ModalityState::Mcq(_) => {
            let action = match key.code {
                KeyCode::Char(c @ '1'..='9') => McqAction::Select(c as usize - '1' as usize),
                KeyCode::Left | KeyCode::Char('h') => McqAction::Prev,
                KeyCode::Right | KeyCode::Char('l') => McqAction::Next,
                KeyCode::Char('f') => McqAction::ToggleFlag,
                _ => return None,
            };
            Some(Action::Mcq(action))
        }
        ModalityState::Coding(coding) => {
            let action = match key.code {
                KeyCode::Char(c) => CodingAction::Type(c),
                KeyCode::Enter => CodingAction::Type('\n'),
                KeyCode::Backspace => CodingAction::Backspace,
                KeyCode::Tab => {
                    let current = coding
                        .current_problem()
                        .and_then(|p| coding.buffer(&p.id))
                        .map(|b| b.language)
                        .unwrap_or_default();
                    CodingAction::SetLanguage(current.next())
                }
                KeyCode::F(5) => CodingAction::Run,
                KeyCode::PageDown => CodingAction::Next,
                KeyCode::PageUp => CodingAction::Prev,
                _ => return None,
            };
            Some(Action::Coding(action))
        }
        ModalityState::Interview(interview) => {
            let action = match key.code {
                KeyCode::Char(' ') if interview.is_recording() => InterviewAction::StopRecording,
                KeyCode::Char(' ') => InterviewAction::StartRecording,
                KeyCode::Char('n') | KeyCode::Right => InterviewAction::Next,
                _ => return None,
            };
            Some(Action::Interview(action))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::SimulatedDevices;
    use crate::modality::{McqQuestion, QuestionSet};
    use crate::session::{QuestionId, SessionConfig};
    use crate::store::ResultStore;
    use std::time::Duration;

    fn key(code: KeyCode) -> ProctorEvent {
        ProctorEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn app() -> App {
        let questions = QuestionSet::Mcq(vec![
            McqQuestion {
                id: QuestionId::from("q1"),
                prompt: "first".into(),
                options: vec!["a".into(), "b".into()],
            },
            McqQuestion {
                id: QuestionId::from("q2"),
                prompt: "second".into(),
                options: vec!["a".into(), "b".into()],
            },
        ]);
        let devices = SimulatedDevices::new();
        let control = devices.control();
        let faces = SharedFaceSignal::new(true);
        let session =
            AssessmentSession::new(SessionConfig::new(60, questions), Box::new(devices))
                .unwrap()
                .with_face_detector(Box::new(faces.clone()));
        App::new(session, "test bank", control, faces)
    }

    #[test]
    fn enter_begins_and_keys_answer() {
        let mut app = app();
        assert_eq!(app.handle(key(KeyCode::Enter)), AppFlow::Continue);
        assert_eq!(app.session.status(), SessionStatus::Active);

        app.handle(key(KeyCode::Char('2')));
        app.handle(key(KeyCode::Right));
        app.handle(key(KeyCode::Char('1')));
        let ModalityState::Mcq(mcq) = app.session.modality_state() else {
            panic!("expected mcq");
        };
        assert_eq!(mcq.answered(), 2);
        assert_eq!(mcq.selection(&QuestionId::from("q1")), Some(1));
    }

    #[test]
    fn out_of_range_option_sets_notice() {
        let mut app = app();
        app.handle(key(KeyCode::Enter));
        app.handle(key(KeyCode::Char('9')));
        assert!(app.notice.is_some());
        app.handle(key(KeyCode::Char('1')));
        assert!(app.notice.is_none());
    }

    #[test]
    fn blocked_shortcut_is_swallowed_and_counted() {
        let mut app = app();
        app.handle(key(KeyCode::Enter));
        app.handle(ProctorEvent::Key(KeyEvent::new(
            KeyCode::Char('c'),
            KeyModifiers::CONTROL,
        )));
        assert_eq!(app.session.proctoring().violation_count, 1);
        app.handle(ProctorEvent::Paste("cheat".into()));
        app.handle(ProctorEvent::FocusLost);
        app.handle(ProctorEvent::ContextMenu);
        assert_eq!(app.session.proctoring().violation_count, 4);
    }

    #[test]
    fn f2_toggles_simulated_camera() {
        let mut app = app();
        app.handle(key(KeyCode::Enter));
        app.handle(key(KeyCode::F(2)));
        app.handle(ProctorEvent::Tick(Duration::from_secs(1)));
        assert!(!app.session.proctoring().camera_enabled);
        assert_eq!(app.session.proctoring().violation_count, 1);
    }

    #[test]
    fn finished_result_goes_to_sink() {
        let mut app = app().with_sink(Box::new(ResultStore::open_in_memory().unwrap()));
        app.handle(key(KeyCode::Enter));
        app.handle(key(KeyCode::F(10)));
        assert_eq!(app.session.status(), SessionStatus::Completed);
        assert_eq!(app.submission, SubmissionState::Stored);
        assert_eq!(app.pending().unwrap().attempts(), 1);
        assert_eq!(app.handle(key(KeyCode::Enter)), AppFlow::Quit);
    }

    #[test]
    fn without_sink_result_is_kept_unsaved() {
        let mut app = app();
        app.handle(key(KeyCode::Enter));
        app.handle(ProctorEvent::Tick(Duration::from_secs(60)));
        assert_eq!(app.session.status(), SessionStatus::Completed);
        assert_eq!(app.submission, SubmissionState::Unsaved);
        assert!(app.pending().is_some());
    }
}
