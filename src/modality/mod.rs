//! Modality strategies layered on the shared session lifecycle.
//!
//! Each assessment type keeps its own answer storage; the session core talks
//! to all of them through [`ModalityState`].

pub mod coding;
pub mod interview;
pub mod mcq;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProctorError, Result};
use crate::media::{Blob, MediaDevices, TrackView};
use crate::session::QuestionId;

pub use coding::{CodeBuffer, CodeRunner, CodingAction, CodingAnswer, CodingProblem, CodingState};
pub use interview::{InterviewAction, InterviewQuestion, InterviewState};
pub use mcq::{McqAction, McqQuestion, McqState};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Modality {
    Mcq,
    Coding,
    Interview,
}

/// Questions for one session; the variant decides the modality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "modality", content = "questions", rename_all = "snake_case")]
pub enum QuestionSet {
    Mcq(Vec<McqQuestion>),
    Coding(Vec<CodingProblem>),
    Interview(Vec<InterviewQuestion>),
}

impl QuestionSet {
    pub fn modality(&self) -> Modality {
        match self {
            QuestionSet::Mcq(_) => Modality::Mcq,
            QuestionSet::Coding(_) => Modality::Coding,
            QuestionSet::Interview(_) => Modality::Interview,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            QuestionSet::Mcq(q) => q.len(),
            QuestionSet::Coding(q) => q.len(),
            QuestionSet::Interview(q) => q.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<&QuestionId> {
        match self {
            QuestionSet::Mcq(q) => q.iter().map(|q| &q.id).collect(),
            QuestionSet::Coding(q) => q.iter().map(|q| &q.id).collect(),
            QuestionSet::Interview(q) => q.iter().map(|q| &q.id).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "modality", content = "action", rename_all = "snake_case")]
pub enum Action {
    Mcq(McqAction),
    Coding(CodingAction),
    Interview(InterviewAction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Continue,
    /// The modality ran out of questions; the session should complete.
    Finished,
}

/// Whatever answers existed when the session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "modality", content = "answers", rename_all = "snake_case")]
pub enum Answers {
    Mcq(BTreeMap<QuestionId, usize>),
    Coding(BTreeMap<QuestionId, CodingAnswer>),
    Interview(BTreeMap<QuestionId, Blob>),
}

impl Answers {
    pub fn len(&self) -> usize {
        match self {
            Answers::Mcq(a) => a.len(),
            Answers::Coding(a) => a.len(),
            Answers::Interview(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub enum ModalityState {
    Mcq(McqState),
    Coding(CodingState),
    Interview(InterviewState),
}

impl ModalityState {
    pub fn new(questions: QuestionSet, runner: Box<dyn CodeRunner>) -> Self {
        match questions {
            QuestionSet::Mcq(q) => ModalityState::Mcq(McqState::new(q)),
            QuestionSet::Coding(q) => ModalityState::Coding(CodingState::new(q, runner)),
            QuestionSet::Interview(q) => ModalityState::Interview(InterviewState::new(q)),
        }
    }

    pub fn modality(&self) -> Modality {
        match self {
            ModalityState::Mcq(_) => Modality::Mcq,
            ModalityState::Coding(_) => Modality::Coding,
            ModalityState::Interview(_) => Modality::Interview,
        }
    }

    pub fn apply(
        &mut self,
        action: Action,
        devices: &mut dyn MediaDevices,
        camera: Option<TrackView>,
    ) -> Result<ActionOutcome> {
        match (self, action) {
            (ModalityState::Mcq(state), Action::Mcq(action)) => {
                state.apply(action).map(|_| ActionOutcome::Continue)
            }
            (ModalityState::Coding(state), Action::Coding(action)) => {
                state.apply(action).map(|_| ActionOutcome::Continue)
            }
            (ModalityState::Interview(state), Action::Interview(action)) => {
                match state.apply(action, devices, camera)? {
                    interview::Advance::Finished => Ok(ActionOutcome::Finished),
                    _ => Ok(ActionOutcome::Continue),
                }
            }
            (state, action) => Err(ProctorError::InvalidAction(format!(
                "{action:?} does not apply to a {} session",
                state.modality()
            ))),
        }
    }

    pub fn tick(&mut self, dt: Duration) {
        if let ModalityState::Interview(state) = self {
            state.tick(dt);
        }
    }

    /// Settle anything still in flight so it lands in the answers.
    pub fn finalize(&mut self) {
        if let ModalityState::Interview(state) = self {
            state.finalize();
        }
    }

    /// Discard anything still in flight.
    pub fn abort(&mut self) {
        if let ModalityState::Interview(state) = self {
            state.abort();
        }
    }

    pub fn score(&self) -> Option<u32> {
        match self {
            ModalityState::Mcq(state) => Some(state.score()),
            ModalityState::Coding(state) => Some(state.passed_count() as u32),
            ModalityState::Interview(_) => None,
        }
    }

    pub fn answers(&self) -> Answers {
        match self {
            ModalityState::Mcq(state) => Answers::Mcq(state.answers()),
            ModalityState::Coding(state) => Answers::Coding(state.answers()),
            ModalityState::Interview(state) => Answers::Interview(state.answers()),
        }
    }

    /// (current position, total questions) for progress displays.
    pub fn progress(&self) -> (usize, usize) {
        match self {
            ModalityState::Mcq(s) => (s.current(), s.questions().len()),
            ModalityState::Coding(s) => (s.current(), s.problems().len()),
            ModalityState::Interview(s) => (s.current(), s.questions().len()),
        }
    }
}
