use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProctorError, Result};
use crate::session::QuestionId;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Language {
    #[default]
    Python,
    JavaScript,
    Java,
    Cpp,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::Python,
        Language::JavaScript,
        Language::Java,
        Language::Cpp,
    ];

    pub fn next(self) -> Language {
        let idx = Self::ALL.iter().position(|l| *l == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|l| l.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unsupported language `{s}`"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodingProblem {
    pub id: QuestionId,
    pub title: String,
    pub statement: String,
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub starter_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodeBuffer {
    pub code: String,
    pub language: Language,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodingAnswer {
    pub code: String,
    pub language: Language,
    pub test_results: Vec<bool>,
    pub passed: bool,
}

/// Executes a submission against a problem's test cases, one verdict per case.
pub trait CodeRunner {
    fn run(&mut self, problem: &CodingProblem, buffer: &CodeBuffer) -> Vec<bool>;
}

impl<F> CodeRunner for F
where
    F: FnMut(&CodingProblem, &CodeBuffer) -> Vec<bool>,
{
    fn run(&mut self, problem: &CodingProblem, buffer: &CodeBuffer) -> Vec<bool> {
        self(problem, buffer)
    }
}

/// Pretend execution: blank code fails, anything else passes each case with `pass_rate`.
#[derive(Debug, Clone)]
pub struct SimulatedRunner {
    rng: StdRng,
    pass_rate: f64,
}

impl SimulatedRunner {
    pub fn new(seed: u64, pass_rate: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            pass_rate: pass_rate.clamp(0.0, 1.0),
        }
    }
}

impl Default for SimulatedRunner {
    fn default() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            pass_rate: 0.7,
        }
    }
}

impl CodeRunner for SimulatedRunner {
    fn run(&mut self, problem: &CodingProblem, buffer: &CodeBuffer) -> Vec<bool> {
        if buffer.code.trim().is_empty() {
            return vec![false; problem.test_cases.len()];
        }
        problem
            .test_cases
            .iter()
            .map(|_| self.rng.gen_bool(self.pass_rate))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "arg", rename_all = "snake_case")]
pub enum CodingAction {
    Type(char),
    Backspace,
    /// Replace the whole buffer.
    Edit(String),
    SetLanguage(Language),
    Run,
    Select(usize),
    Next,
    Prev,
}

pub struct CodingState {
    problems: Vec<CodingProblem>,
    current: usize,
    buffers: BTreeMap<QuestionId, CodeBuffer>,
    results: BTreeMap<QuestionId, Vec<bool>>,
    runner: Box<dyn CodeRunner>,
}

impl CodingState {
    pub fn new(problems: Vec<CodingProblem>, runner: Box<dyn CodeRunner>) -> Self {
        let buffers = problems
            .iter()
            .map(|p| {
                (
                    p.id.clone(),
                    CodeBuffer {
                        code: p.starter_code.clone(),
                        language: Language::default(),
                    },
                )
            })
            .collect();
        Self {
            problems,
            current: 0,
            buffers,
            results: BTreeMap::new(),
            runner,
        }
    }

    pub fn set_runner(&mut self, runner: Box<dyn CodeRunner>) {
        self.runner = runner;
    }

    pub fn problems(&self) -> &[CodingProblem] {
        &self.problems
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn current_problem(&self) -> Option<&CodingProblem> {
        self.problems.get(self.current)
    }

    pub fn buffer(&self, id: &QuestionId) -> Option<&CodeBuffer> {
        self.buffers.get(id)
    }

    pub fn results(&self, id: &QuestionId) -> Option<&[bool]> {
        self.results.get(id).map(Vec::as_slice)
    }

    /// True only when the latest run covered every case and all of them passed.
    pub fn passed(&self, id: &QuestionId) -> bool {
        let Some(problem) = self.problems.iter().find(|p| p.id == *id) else {
            return false;
        };
        self.results.get(id).is_some_and(|r| {
            r.len() == problem.test_cases.len() && r.iter().all(|passed| *passed)
        })
    }

    fn current_id(&self) -> Result<QuestionId> {
        self.current_problem()
            .map(|p| p.id.clone())
            .ok_or_else(|| ProctorError::InvalidAction("no problems".into()))
    }

    fn edit(&mut self, f: impl FnOnce(&mut CodeBuffer)) -> Result<()> {
        let id = self.current_id()?;
        let buffer = self.buffers.entry(id.clone()).or_default();
        f(buffer);
        // The previous run no longer describes this code.
        self.results.remove(&id);
        Ok(())
    }

    pub fn apply(&mut self, action: CodingAction) -> Result<()> {
        match action {
            CodingAction::Type(c) => self.edit(|b| b.code.push(c))?,
            CodingAction::Backspace => self.edit(|b| {
                b.code.pop();
            })?,
            CodingAction::Edit(code) => self.edit(|b| b.code = code)?,
            CodingAction::SetLanguage(language) => self.edit(|b| b.language = language)?,
            CodingAction::Run => {
                let id = self.current_id()?;
                let problem = &self.problems[self.current];
                let buffer = self.buffers.get(&id).cloned().unwrap_or_default();
                let mut verdicts = self.runner.run(problem, &buffer);
                verdicts.resize(problem.test_cases.len(), false);
                debug!(
                    problem = %id,
                    passed = verdicts.iter().filter(|v| **v).count(),
                    total = verdicts.len(),
                    "code run"
                );
                self.results.insert(id, verdicts);
            }
            CodingAction::Select(index) => {
                if index >= self.problems.len() {
                    return Err(ProctorError::InvalidAction(format!(
                        "no problem at position {index}"
                    )));
                }
                self.current = index;
            }
            CodingAction::Next => {
                if self.current + 1 < self.problems.len() {
                    self.current += 1;
                }
            }
            CodingAction::Prev => self.current = self.current.saturating_sub(1),
        }
        Ok(())
    }

    pub fn passed_count(&self) -> usize {
        self.problems.iter().filter(|p| self.passed(&p.id)).count()
    }

    pub fn answers(&self) -> BTreeMap<QuestionId, CodingAnswer> {
        self.problems
            .iter()
            .map(|p| {
                let buffer = self.buffers.get(&p.id).cloned().unwrap_or_default();
                let answer = CodingAnswer {
                    code: buffer.code,
                    language: buffer.language,
                    test_results: self.results.get(&p.id).cloned().unwrap_or_default(),
                    passed: self.passed(&p.id),
                };
                (p.id.clone(), answer)
            })
            .collect()
    }
}

impl std::fmt::Debug for CodingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodingState")
            .field("current", &self.current)
            .field("buffers", &self.buffers)
            .field("results", &self.results)
            .finish()
    }
}
