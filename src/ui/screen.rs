use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

use crate::app::{App, SubmissionState};
use crate::modality::ModalityState;
use crate::session::SessionStatus;
use crate::util::{format_bytes, format_clock, format_elapsed};

use super::{bold, centered, dim, paragraph, status_lights, timer_span, violation_badge};

/// A UI screen boundary: one per session status.
pub trait Screen {
    fn render(&self, app: &App, area: Rect, buf: &mut Buffer);
}

/// Instructions and the blocking permission prompt.
pub struct IntroScreen;

impl Screen for IntroScreen {
    fn render(&self, app: &App, area: Rect, buf: &mut Buffer) {
        let session = &app.session;
        let mut lines = vec![
            Line::from(Span::styled(
                format!("Proctored assessment: {}", app.bank_name),
                bold(),
            )),
            Line::from(Span::styled(
                format!(
                    "{} · {} · up to {} violations",
                    session.modality(),
                    format_clock(session.timer().total_seconds),
                    session.max_violations()
                ),
                dim(),
            )),
            Line::default(),
            Line::from("Your camera stays on for the whole session."),
            Line::from("Stay in this window. Leaving it counts as a violation."),
            Line::from("Copy, paste, the context menu and shortcuts are disabled."),
            Line::from(format!(
                "Reaching {} violations ends the session immediately.",
                session.max_violations()
            )),
            Line::default(),
        ];

        match session.last_error() {
            Some(err) => {
                lines.push(Line::from(Span::styled(
                    err.to_string(),
                    bold().fg(Color::Red),
                )));
                lines.push(Line::from(
                    "Allow camera access, then press Enter to try again (Esc quits).",
                ));
            }
            None => lines.push(Line::from(Span::styled(
                "Press Enter to allow camera access and begin (Esc quits).",
                bold().fg(Color::Cyan),
            ))),
        }

        centered(lines).render(area, buf);
    }
}

/// The running assessment.
pub struct SessionScreen;

impl Screen for SessionScreen {
    fn render(&self, app: &App, area: Rect, buf: &mut Buffer) {
        let session = &app.session;
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints(
                [
                    Constraint::Length(1),
                    Constraint::Length(1),
                    Constraint::Min(3),
                    Constraint::Length(2),
                    Constraint::Length(1),
                ]
                .as_ref(),
            )
            .split(area);

        let (current, total) = session.modality_state().progress();
        let header = Line::from(vec![
            Span::styled(format!("{} ", session.modality()), bold()),
            Span::styled(format!("{}/{}  ", (current + 1).min(total), total), dim()),
            timer_span(session),
            Span::raw("  "),
            violation_badge(session),
        ]);
        paragraph(vec![header]).render(chunks[0], buf);
        paragraph(vec![status_lights(session)]).render(chunks[1], buf);

        let body = match session.modality_state() {
            ModalityState::Mcq(state) => mcq_lines(state),
            ModalityState::Coding(state) => coding_lines(state),
            ModalityState::Interview(state) => interview_lines(state),
        };
        paragraph(body)
            .block(Block::default().borders(Borders::TOP))
            .render(chunks[2], buf);

        let mut alerts = Vec::new();
        if let Some(kind) = session.proctoring().last_violation {
            alerts.push(Line::from(Span::styled(
                kind.warning(),
                bold().fg(Color::Yellow),
            )));
        }
        if let Some(notice) = &app.notice {
            alerts.push(Line::from(Span::styled(
                notice.clone(),
                Style::default().fg(Color::Red),
            )));
        }
        paragraph(alerts).render(chunks[3], buf);

        let hints = match session.modality_state() {
            ModalityState::Mcq(_) => "1-9 answer · ←/→ move · f flag · F10 submit · Esc quit",
            ModalityState::Coding(_) => {
                "type code · Tab language · F5 run · PgUp/PgDn problem · F10 submit"
            }
            ModalityState::Interview(_) => "Space record/stop · n next · F10 submit · Esc quit",
        };
        paragraph(vec![Line::from(Span::styled(hints, dim()))]).render(chunks[4], buf);
    }
}

fn mcq_lines(state: &crate::modality::McqState) -> Vec<Line<'static>> {
    let Some(question) = state.current_question() else {
        return vec![Line::from("No questions.")];
    };
    let selected = state.selection(&question.id);
    let flag = if state.is_flagged(&question.id) {
        " ⚑"
    } else {
        ""
    };
    let mut lines = vec![
        Line::from(Span::styled(format!("{}{}", question.prompt, flag), bold())),
        Line::default(),
    ];
    for (idx, option) in question.options.iter().enumerate() {
        let (marker, style) = if selected == Some(idx) {
            ("●", bold().fg(Color::Green))
        } else {
            ("○", Style::default())
        };
        lines.push(Line::from(Span::styled(
            format!("{marker} {}. {option}", idx + 1),
            style,
        )));
    }
    lines.push(Line::default());
    lines.push(Line::from(Span::styled(
        format!(
            "answered {}/{} · flagged {}",
            state.answered(),
            state.questions().len(),
            state.flagged().len()
        ),
        dim(),
    )));
    lines
}

fn coding_lines(state: &crate::modality::CodingState) -> Vec<Line<'static>> {
    let Some(problem) = state.current_problem() else {
        return vec![Line::from("No problems.")];
    };
    let buffer = state.buffer(&problem.id).cloned().unwrap_or_default();
    let mut lines = vec![
        Line::from(Span::styled(problem.title.clone(), bold())),
        Line::from(problem.statement.clone()),
        Line::from(Span::styled(format!("[{}]", buffer.language), dim())),
    ];
    lines.extend(
        buffer
            .code
            .lines()
            .map(|l| Line::from(Span::styled(l.to_string(), Style::default().fg(Color::Cyan)))),
    );
    match state.results(&problem.id) {
        Some(results) => {
            let spans = results
                .iter()
                .enumerate()
                .map(|(i, ok)| {
                    let (mark, color) = if *ok {
                        ("✓", Color::Green)
                    } else {
                        ("✗", Color::Red)
                    };
                    Span::styled(format!("{mark} case {}  ", i + 1), Style::default().fg(color))
                })
                .collect::<Vec<_>>();
            lines.push(Line::from(spans));
        }
        None => lines.push(Line::from(Span::styled("not run yet", dim()))),
    }
    lines
}

fn interview_lines(state: &crate::modality::InterviewState) -> Vec<Line<'static>> {
    let Some(question) = state.current_question() else {
        return vec![Line::from("All questions answered.")];
    };
    let mut lines = vec![
        Line::from(Span::styled(question.prompt.clone(), bold())),
        Line::default(),
    ];
    if state.is_recording() {
        lines.push(Line::from(Span::styled(
            format!(
                "● REC {} / {}",
                format_elapsed(state.recording_elapsed()),
                format_elapsed(question.time_limit())
            ),
            bold().fg(Color::Red),
        )));
    } else if let Some(blob) = state.recording(&question.id) {
        lines.push(Line::from(Span::styled(
            format!(
                "answer recorded ({}); Space records again",
                format_bytes(blob.size)
            ),
            Style::default().fg(Color::Green),
        )));
    } else {
        lines.push(Line::from("Press Space to start recording your answer."));
    }
    lines
}

/// Full-screen notice once the session is over.
pub struct NoticeScreen;

impl Screen for NoticeScreen {
    fn render(&self, app: &App, area: Rect, buf: &mut Buffer) {
        let session = &app.session;
        let result = app.pending().map(|p| p.result());
        let mut lines = Vec::new();

        if session.status() == SessionStatus::Disqualified {
            lines.push(Line::from(Span::styled(
                "DISQUALIFIED",
                bold().fg(Color::White).bg(Color::Red),
            )));
            lines.push(Line::default());
            lines.push(Line::from(format!(
                "The session ended after {} integrity violations.",
                session.proctoring().violation_count
            )));
            if let Some(kind) = session.proctoring().last_violation {
                lines.push(Line::from(format!("Last violation: {}", kind.warning())));
            }
        } else {
            lines.push(Line::from(Span::styled(
                "Assessment submitted",
                bold().fg(Color::Green),
            )));
            lines.push(Line::default());
            if let Some(result) = result {
                if let Some(score) = result.score {
                    lines.push(Line::from(format!("Score: {score}")));
                }
                lines.push(Line::from(format!(
                    "Answered: {} · Time used: {} · Violations: {}",
                    result.answers.len(),
                    format_clock(result.elapsed_seconds),
                    result.violation_count
                )));
            }
        }

        lines.push(Line::default());
        let saved = match &app.submission {
            SubmissionState::Stored => Span::styled("Result saved.", dim()),
            SubmissionState::Failed(err) => Span::styled(
                format!("Saving failed: {err}. Press r to retry."),
                Style::default().fg(Color::Red),
            ),
            SubmissionState::Unsaved => Span::styled("Result not saved.", dim()),
            SubmissionState::NotYet => Span::raw(""),
        };
        lines.push(Line::from(saved));
        lines.push(Line::from(Span::styled("Press Enter to exit.", dim())));

        centered(lines).render(area, buf);
    }
}

/// Helper to construct the appropriate screen for the current status
pub fn current_screen(status: SessionStatus) -> Box<dyn Screen> {
    match status {
        SessionStatus::Intro => Box::new(IntroScreen),
        SessionStatus::Active => Box::new(SessionScreen),
        SessionStatus::Completed | SessionStatus::Disqualified => Box::new(NoticeScreen),
    }
}
