pub mod screen;

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget, Wrap},
};

use crate::app::App;
use crate::session::AssessmentSession;
use crate::util::format_clock;

use self::screen::current_screen;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 1;

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let inner = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN.min(area.width / 4))
            .vertical_margin(VERTICAL_MARGIN.min(area.height / 4))
            .constraints([Constraint::Min(0)].as_ref())
            .split(area)[0];

        current_screen(self.session.status()).render(self, inner, buf);
    }
}

pub(crate) fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

pub(crate) fn dim() -> Style {
    Style::default().add_modifier(Modifier::DIM)
}

/// `Violations 2/5`, turning red once half the allowance is used.
pub(crate) fn violation_badge(session: &AssessmentSession) -> Span<'static> {
    let count = session.proctoring().violation_count;
    let max = session.max_violations();
    let color = match count {
        0 => Color::Green,
        c if c * 2 < max => Color::Yellow,
        _ => Color::Red,
    };
    Span::styled(
        format!(" Violations {count}/{max} "),
        bold().fg(Color::Black).bg(color),
    )
}

pub(crate) fn timer_span(session: &AssessmentSession) -> Span<'static> {
    let remaining = session.timer().remaining_seconds;
    let style = if remaining <= 60 {
        bold().fg(Color::Red)
    } else {
        bold()
    };
    Span::styled(format!("⏱ {}", format_clock(remaining)), style)
}

pub(crate) fn status_lights(session: &AssessmentSession) -> Line<'static> {
    let state = session.proctoring();
    let light = |ok: bool, label: &str| {
        let style = if ok {
            Style::default().fg(Color::Green)
        } else {
            bold().fg(Color::Red)
        };
        Span::styled(format!("● {label}  "), style)
    };
    Line::from(vec![
        light(state.camera_enabled, "camera"),
        light(state.face_detected, "face"),
        light(state.tab_focused, "focus"),
    ])
}

pub(crate) fn paragraph(lines: Vec<Line<'static>>) -> Paragraph<'static> {
    Paragraph::new(lines).wrap(Wrap { trim: false })
}

pub(crate) fn centered(lines: Vec<Line<'static>>) -> Paragraph<'static> {
    paragraph(lines).alignment(Alignment::Center)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::SimulatedDevices;
    use crate::modality::{
        Action, CodingAction, CodingProblem, InterviewAction, InterviewQuestion, McqAction,
        McqQuestion, QuestionSet,
    };
    use crate::modality::coding::TestCase;
    use crate::monitor::SharedFaceSignal;
    use crate::session::{AssessmentSession, QuestionId, SessionConfig};
    use crate::guard::Interaction;
    use std::time::Duration;

    fn create_test_app(questions: QuestionSet, permission: bool) -> App {
        let devices = SimulatedDevices::new();
        let control = devices.control();
        control.set_permission(permission);
        let faces = SharedFaceSignal::new(true);
        let session = AssessmentSession::new(SessionConfig::new(90, questions), Box::new(devices))
            .unwrap()
            .with_face_detector(Box::new(faces.clone()));
        App::new(session, "Sample bank", control, faces)
    }

    fn mcq() -> QuestionSet {
        QuestionSet::Mcq(vec![McqQuestion {
            id: QuestionId::from("q1"),
            prompt: "Which keyword declares a trait?".into(),
            options: vec!["impl".into(), "trait".into()],
        }])
    }

    fn render(app: &App, width: u16, height: u16) -> String {
        let area = Rect::new(0, 0, width, height);
        let mut buffer = Buffer::empty(area);
        app.render(area, &mut buffer);
        buffer
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect::<String>()
    }

    #[test]
    fn test_intro_screen() {
        let app = create_test_app(mcq(), true);
        let rendered = render(&app, 100, 30);
        assert!(rendered.contains("Sample bank"));
        assert!(rendered.contains("Enter"));
    }

    #[test]
    fn test_permission_denied_screen() {
        let mut app = create_test_app(mcq(), false);
        let _ = app.session.begin();
        let rendered = render(&app, 100, 30);
        assert!(rendered.contains("permission denied"));
    }

    #[test]
    fn test_active_mcq_screen() {
        let mut app = create_test_app(mcq(), true);
        app.session.begin().unwrap();
        app.session.act(Action::Mcq(McqAction::Select(1))).unwrap();
        app.session.intercept(&Interaction::ContextMenu);
        app.session.tick(Duration::from_secs(1));

        let rendered = render(&app, 100, 30);
        assert!(rendered.contains("Which keyword declares a trait?"));
        assert!(rendered.contains("Violations 1/5"));
        assert!(rendered.contains("01:29"));
        assert!(rendered.contains("context menu is disabled"));
    }

    #[test]
    fn test_active_coding_screen() {
        let questions = QuestionSet::Coding(vec![CodingProblem {
            id: QuestionId::from("p1"),
            title: "Reverse".into(),
            statement: "Reverse the input".into(),
            test_cases: vec![TestCase {
                input: "ab".into(),
                expected_output: "ba".into(),
            }],
            starter_code: String::new(),
        }]);
        let mut app = create_test_app(questions, true);
        app.session.begin().unwrap();
        app.session
            .act(Action::Coding(CodingAction::Edit("print(x[::-1])".into())))
            .unwrap();

        let rendered = render(&app, 100, 30);
        assert!(rendered.contains("Reverse"));
        assert!(rendered.contains("print(x[::-1])"));
        assert!(rendered.contains("python"));
    }

    #[test]
    fn test_active_interview_screen() {
        let questions = QuestionSet::Interview(vec![InterviewQuestion {
            id: QuestionId::from("iq1"),
            prompt: "Tell us about yourself".into(),
            time_limit_secs: Some(60),
        }]);
        let mut app = create_test_app(questions, true);
        app.session.begin().unwrap();
        app.session
            .act(Action::Interview(InterviewAction::StartRecording))
            .unwrap();

        let rendered = render(&app, 100, 30);
        assert!(rendered.contains("Tell us about yourself"));
        assert!(rendered.contains("REC"));
    }

    #[test]
    fn test_disqualified_notice() {
        let mut app = create_test_app(mcq(), true);
        app.handle(crate::runtime::ProctorEvent::Key(
            crossterm::event::KeyEvent::new(
                crossterm::event::KeyCode::Enter,
                crossterm::event::KeyModifiers::NONE,
            ),
        ));
        for _ in 0..5 {
            app.handle(crate::runtime::ProctorEvent::ContextMenu);
        }
        let rendered = render(&app, 100, 30);
        assert!(rendered.contains("DISQUALIFIED"));
    }

    #[test]
    fn test_small_area_does_not_panic() {
        let mut app = create_test_app(mcq(), true);
        app.session.begin().unwrap();
        let rendered = render(&app, 20, 5);
        assert!(!rendered.is_empty());
    }
}
