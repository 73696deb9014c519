use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{ProctorError, Result};
use crate::session::QuestionId;

/// Flat score per answered question. Correctness is not taken into account.
pub const POINTS_PER_ANSWER: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McqQuestion {
    pub id: QuestionId,
    pub prompt: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "arg", rename_all = "snake_case")]
pub enum McqAction {
    Select(usize),
    Next,
    Prev,
    Jump(usize),
    ToggleFlag,
}

#[derive(Debug, Clone)]
pub struct McqState {
    questions: Vec<McqQuestion>,
    current: usize,
    selections: BTreeMap<QuestionId, usize>,
    flagged: BTreeSet<QuestionId>,
}

impl McqState {
    pub fn new(questions: Vec<McqQuestion>) -> Self {
        Self {
            questions,
            current: 0,
            selections: BTreeMap::new(),
            flagged: BTreeSet::new(),
        }
    }

    pub fn questions(&self) -> &[McqQuestion] {
        &self.questions
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn current_question(&self) -> Option<&McqQuestion> {
        self.questions.get(self.current)
    }

    pub fn selection(&self, id: &QuestionId) -> Option<usize> {
        self.selections.get(id).copied()
    }

    pub fn is_flagged(&self, id: &QuestionId) -> bool {
        self.flagged.contains(id)
    }

    pub fn flagged(&self) -> &BTreeSet<QuestionId> {
        &self.flagged
    }

    pub fn answered(&self) -> usize {
        self.selections.len()
    }

    pub fn is_last(&self) -> bool {
        self.current + 1 >= self.questions.len()
    }

    pub fn apply(&mut self, action: McqAction) -> Result<()> {
        match action {
            McqAction::Select(option) => {
                let question = self
                    .current_question()
                    .ok_or_else(|| ProctorError::InvalidAction("no questions".into()))?;
                if option >= question.options.len() {
                    return Err(ProctorError::InvalidAction(format!(
                        "question {} has no option {}",
                        question.id, option
                    )));
                }
                let id = question.id.clone();
                self.selections.insert(id, option);
            }
            McqAction::Next => {
                if !self.is_last() {
                    self.current += 1;
                }
            }
            McqAction::Prev => self.current = self.current.saturating_sub(1),
            McqAction::Jump(index) => {
                if index >= self.questions.len() {
                    return Err(ProctorError::InvalidAction(format!(
                        "no question at position {index}"
                    )));
                }
                self.current = index;
            }
            McqAction::ToggleFlag => {
                if let Some(id) = self.current_question().map(|q| q.id.clone()) {
                    if !self.flagged.remove(&id) {
                        self.flagged.insert(id);
                    }
                }
            }
        }
        Ok(())
    }

    pub fn score(&self) -> u32 {
        self.answered() as u32 * POINTS_PER_ANSWER
    }

    pub fn answers(&self) -> BTreeMap<QuestionId, usize> {
        self.selections.clone()
    }
}
