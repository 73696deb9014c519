use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use proctor::app::{App, AppFlow};
use proctor::guard::Interaction;
use proctor::media::{
    MediaDevices, MediaRequest, MediaStream, Recorder, SimulatedDevices, TrackView,
};
use proctor::modality::coding::{CodeBuffer, CodingProblem, TestCase};
use proctor::modality::{
    Action, Answers, CodingAction, InterviewAction, InterviewQuestion, McqAction, McqQuestion,
    QuestionSet,
};
use proctor::monitor::SharedFaceSignal;
use proctor::policy::ViolationKind;
use proctor::runtime::{FixedTicker, ProctorEvent, Runner, TestEventSource};
use proctor::session::{
    AssessmentSession, EventLog, Observed, QuestionId, SessionConfig, SessionStatus,
};

fn mcq(n: usize) -> QuestionSet {
    QuestionSet::Mcq(
        (0..n)
            .map(|i| McqQuestion {
                id: QuestionId::from(format!("q{i}")),
                prompt: format!("Question {i}"),
                options: vec!["a".into(), "b".into(), "c".into()],
            })
            .collect(),
    )
}

struct Harness {
    session: AssessmentSession,
    devices: SimulatedDevices,
    faces: SharedFaceSignal,
    log: EventLog,
}

fn harness(total: u32, questions: QuestionSet) -> Harness {
    let devices = SimulatedDevices::new();
    let faces = SharedFaceSignal::new(true);
    let mut session =
        AssessmentSession::new(SessionConfig::new(total, questions), Box::new(devices.clone()))
            .unwrap()
            .with_face_detector(Box::new(faces.clone()));
    let log = EventLog::new();
    session.subscribe(Box::new(log.clone()));
    Harness {
        session,
        devices,
        faces,
        log,
    }
}

fn key(code: KeyCode) -> ProctorEvent {
    ProctorEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
}

// Five mixed violations: the fifth disqualifies, the camera is released and
// a sixth signal changes nothing.
#[test]
fn mixed_violations_disqualify_exactly_once() {
    let mut h = harness(600, mcq(3));
    h.session.begin().unwrap();
    assert!(h.session.camera_held());

    h.session.set_focus(false);
    h.session.set_focus(true);
    h.session.set_focus(false);
    h.session.set_focus(true);
    h.faces.set(false);
    h.session.tick(Duration::from_secs(1));
    h.session.set_focus(false);
    h.session.set_focus(true);
    assert_eq!(h.session.proctoring().violation_count, 4);
    assert_eq!(h.session.status(), SessionStatus::Active);

    h.session.intercept(&Interaction::Paste("x".into()));
    assert_eq!(h.session.status(), SessionStatus::Disqualified);
    assert!(h.session.proctoring().is_disqualified);
    assert!(!h.session.camera_held());

    h.session.set_focus(false);
    h.devices.control().set_camera_connected(false);
    h.session.tick(Duration::from_secs(5));

    let kinds: Vec<ViolationKind> = h
        .log
        .events()
        .iter()
        .filter_map(|e| match e {
            Observed::Violation(event, _) => Some(event.kind),
            _ => None,
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            ViolationKind::TabSwitched,
            ViolationKind::TabSwitched,
            ViolationKind::NoFace,
            ViolationKind::TabSwitched,
            ViolationKind::CopyPasteAttempt,
        ]
    );
    assert_eq!(h.log.disqualifications(), 1);
    assert_eq!(h.session.proctoring().violation_count, 5);
}

// Counts observed by subscribers never go down.
#[test]
fn violation_count_is_monotonic() {
    let mut h = harness(600, mcq(1));
    h.session.begin().unwrap();
    for _ in 0..3 {
        h.session.set_focus(false);
        h.session.set_focus(true);
    }
    let counts: Vec<u32> = h
        .log
        .events()
        .iter()
        .filter_map(|e| match e {
            Observed::Violation(_, count) => Some(*count),
            _ => None,
        })
        .collect();
    assert_eq!(counts, vec![1, 2, 3]);
}

// A 120 second session with no interaction completes on its own.
#[test]
fn idle_session_expires_with_partial_answers() {
    let mut h = harness(120, mcq(3));
    h.session.begin().unwrap();
    h.session.act(Action::Mcq(McqAction::Select(2))).unwrap();

    for _ in 0..119 {
        h.session.tick(Duration::from_secs(1));
    }
    assert_eq!(h.session.status(), SessionStatus::Active);
    h.session.tick(Duration::from_secs(1));
    assert_eq!(h.session.status(), SessionStatus::Completed);
    assert_eq!(h.log.completions(), 1);

    let result = h.session.result().unwrap();
    assert_eq!(result.elapsed_seconds, 120);
    assert_eq!(result.answers.len(), 1);
    assert_eq!(result.score, Some(10));
}

// Expiry and a manual submit in the same tick produce one result.
#[test]
fn expiry_and_submit_race_yields_one_result() {
    let mut h = harness(3, mcq(1));
    h.session.begin().unwrap();
    h.session.tick(Duration::from_secs(3));
    assert!(h.session.submit().is_err());
    assert_eq!(h.log.completions(), 1);
    assert_eq!(h.log.disqualifications(), 0);
}

// Starting over means a fresh session: nothing carries over.
#[test]
fn new_session_starts_clean() {
    let mut first = harness(60, mcq(1));
    first.session.begin().unwrap();
    first.session.set_focus(false);
    assert_eq!(first.session.proctoring().violation_count, 1);
    first.session.abandon();

    let mut second = harness(60, mcq(1));
    second.session.begin().unwrap();
    assert_eq!(second.session.status(), SessionStatus::Active);
    assert_eq!(second.session.proctoring().violation_count, 0);
    assert_eq!(second.session.timer().remaining_seconds, 60);
}

// Subscribers see recoveries too, not only the violations before them.
#[test]
fn observers_follow_face_and_camera_recovery() {
    let mut h = harness(600, mcq(1));
    h.session.begin().unwrap();

    h.faces.set(false);
    h.session.tick(Duration::from_secs(1));
    assert!(!h.log.last_state().unwrap().face_detected);
    h.faces.set(true);
    h.session.tick(Duration::from_secs(1));
    assert!(h.log.last_state().unwrap().face_detected);

    h.devices.control().set_camera_connected(false);
    h.session.tick(Duration::from_secs(1));
    assert!(!h.log.last_state().unwrap().camera_enabled);
    h.devices.control().set_camera_connected(true);
    h.session.tick(Duration::from_secs(1));
    let last = h.log.last_state().unwrap();
    assert!(last.camera_enabled);
    assert_eq!(&last, h.session.proctoring());
    assert_eq!(h.log.violations(), 2);
}

// Hands out simulated devices while keeping a view of every acquired track.
#[derive(Clone, Default)]
struct WatchedDevices {
    inner: SimulatedDevices,
    seen: Arc<Mutex<Vec<TrackView>>>,
}

impl MediaDevices for WatchedDevices {
    fn acquire(&mut self, request: MediaRequest) -> proctor::Result<MediaStream> {
        let stream = self.inner.acquire(request)?;
        if let Ok(mut seen) = self.seen.lock() {
            seen.extend(stream.tracks().iter().map(|t| t.view()));
        }
        Ok(stream)
    }

    fn open_recorder(&mut self, tracks: &[TrackView]) -> proctor::Result<Box<dyn Recorder>> {
        self.inner.open_recorder(tracks)
    }
}

// Once the session lets go of the camera, replugging the device does not revive it.
#[test]
fn released_camera_stays_released_across_device_events() {
    let devices = WatchedDevices::default();
    let control = devices.inner.control();
    let mut session =
        AssessmentSession::new(SessionConfig::new(600, mcq(1)), Box::new(devices.clone()))
            .unwrap();
    session.begin().unwrap();
    session.submit().unwrap();

    control.set_camera_connected(false);
    control.set_camera_connected(true);
    session.tick(Duration::from_secs(1));

    let seen = devices.seen.lock().unwrap().clone();
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|t| !t.is_live()));
    assert!(!session.camera_held());
    assert_eq!(session.proctoring().violation_count, 0);
}

#[test]
fn abandoning_produces_no_result() {
    let mut h = harness(60, mcq(1));
    h.session.begin().unwrap();
    let log = h.log.clone();
    h.session.abandon();
    assert_eq!(log.completions(), 0);
    assert_eq!(log.disqualifications(), 0);
}

#[test]
fn interview_rerecord_keeps_latest_take_and_finishes() {
    let questions = QuestionSet::Interview(vec![
        InterviewQuestion {
            id: QuestionId::from("iq1"),
            prompt: "Introduce yourself".into(),
            time_limit_secs: Some(30),
        },
        InterviewQuestion {
            id: QuestionId::from("iq2"),
            prompt: "Why this role?".into(),
            time_limit_secs: Some(2),
        },
    ]);
    let mut h = harness(600, questions);
    h.session.begin().unwrap();

    let record = |s: &mut AssessmentSession, secs: u64| {
        s.act(Action::Interview(InterviewAction::StartRecording))
            .unwrap();
        for _ in 0..secs {
            s.tick(Duration::from_secs(1));
        }
    };

    record(&mut h.session, 1);
    h.session
        .act(Action::Interview(InterviewAction::StopRecording))
        .unwrap();
    record(&mut h.session, 3);
    h.session
        .act(Action::Interview(InterviewAction::Next))
        .unwrap();

    // The per-question limit stops the recording, not the session.
    record(&mut h.session, 2);
    assert_eq!(h.session.status(), SessionStatus::Active);
    h.session
        .act(Action::Interview(InterviewAction::Next))
        .unwrap();

    assert_eq!(h.session.status(), SessionStatus::Completed);
    let result = h.session.take_result().unwrap();
    assert_eq!(result.score, None);
    let Answers::Interview(recordings) = result.answers else {
        panic!("expected interview answers");
    };
    assert_eq!(recordings.len(), 2);
    assert!(recordings[&QuestionId::from("iq1")].size > 0);
}

#[test]
fn recording_failure_is_retryable_and_not_a_violation() {
    let questions = QuestionSet::Interview(vec![InterviewQuestion {
        id: QuestionId::from("iq1"),
        prompt: "Walk us through a project".into(),
        time_limit_secs: None,
    }]);
    let mut h = harness(600, questions);
    h.session.begin().unwrap();

    h.devices.control().set_recorder_fails(true);
    let err = h
        .session
        .act(Action::Interview(InterviewAction::StartRecording))
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(h.session.proctoring().violation_count, 0);

    h.devices.control().set_recorder_fails(false);
    h.session
        .act(Action::Interview(InterviewAction::StartRecording))
        .unwrap();
}

#[test]
fn coding_passes_only_when_every_case_passes() {
    let problem = |id: &str| CodingProblem {
        id: QuestionId::from(id),
        title: id.into(),
        statement: "Echo the input".into(),
        test_cases: vec![
            TestCase {
                input: "a".into(),
                expected_output: "a".into(),
            },
            TestCase {
                input: "b".into(),
                expected_output: "b".into(),
            },
        ],
        starter_code: String::new(),
    };
    let mut h = harness(600, QuestionSet::Coding(vec![problem("p1"), problem("p2")]));
    // Runner that passes a case only when the code mentions its expected output.
    h.session = h.session.with_code_runner(Box::new(
        |p: &CodingProblem, b: &CodeBuffer| -> Vec<bool> {
            p.test_cases
                .iter()
                .map(|c| b.code.contains(&c.expected_output))
                .collect()
        },
    ));
    h.session.begin().unwrap();

    h.session
        .act(Action::Coding(CodingAction::Edit("print('ab')".into())))
        .unwrap();
    h.session.act(Action::Coding(CodingAction::Run)).unwrap();
    h.session.act(Action::Coding(CodingAction::Next)).unwrap();
    h.session
        .act(Action::Coding(CodingAction::Edit("print('a')".into())))
        .unwrap();
    h.session.act(Action::Coding(CodingAction::Run)).unwrap();

    let result = h.session.submit().unwrap().clone();
    assert_eq!(result.score, Some(1));
    let Answers::Coding(answers) = result.answers else {
        panic!("expected coding answers");
    };
    assert!(answers[&QuestionId::from("p1")].passed);
    assert!(!answers[&QuestionId::from("p2")].passed);
    assert_eq!(answers[&QuestionId::from("p2")].test_results, vec![true, false]);
}

// Drive the interactive app through the runner exactly as the binary does.
#[test]
fn runner_drives_app_to_completion() {
    let devices = SimulatedDevices::new();
    let control = devices.control();
    let faces = SharedFaceSignal::new(true);
    let session = AssessmentSession::new(SessionConfig::new(60, mcq(2)), Box::new(devices))
        .unwrap()
        .with_face_detector(Box::new(faces.clone()));
    let mut app = App::new(session, "headless", control, faces);

    let (tx, rx) = mpsc::channel();
    let es = TestEventSource::new(rx);
    let ticker = FixedTicker::new(Duration::from_millis(5));
    let mut runner = Runner::new(es, ticker);

    tx.send(key(KeyCode::Enter)).unwrap();
    tx.send(key(KeyCode::Char('2'))).unwrap();
    tx.send(ProctorEvent::FocusLost).unwrap();
    tx.send(ProctorEvent::FocusGained).unwrap();
    tx.send(ProctorEvent::Tick(Duration::from_secs(1))).unwrap();
    tx.send(key(KeyCode::Right)).unwrap();
    tx.send(key(KeyCode::Char('3'))).unwrap();
    tx.send(key(KeyCode::F(10))).unwrap();
    tx.send(key(KeyCode::Enter)).unwrap();

    let mut quit = false;
    for _ in 0..100u32 {
        if app.handle(runner.step()) == AppFlow::Quit {
            quit = true;
            break;
        }
    }

    assert!(quit, "app should quit after the terminal notice");
    assert_eq!(app.session.status(), SessionStatus::Completed);
    let result = app.pending().unwrap().result();
    assert_eq!(result.answers.len(), 2);
    assert_eq!(result.violation_count, 1);
    assert_eq!(result.score, Some(20));
}
