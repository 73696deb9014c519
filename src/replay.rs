//! Scripted, headless sessions.
//!
//! A script is a JSON document listing the signals a candidate's environment
//! would produce. Replaying it drives a real [`AssessmentSession`] over
//! simulated devices, which makes it handy for demos and for reproducing
//! disputes about a disqualification.

use std::path::Path;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bank::Bank;
use crate::config::Config;
use crate::error::Result;
use crate::guard::{Interaction, Shortcut, Verdict};
use crate::media::SimulatedDevices;
use crate::modality::coding::SimulatedRunner;
use crate::modality::{Action, Modality, QuestionSet};
use crate::monitor::SharedFaceSignal;
use crate::session::{AssessmentSession, SessionResult, SessionStatus};

fn default_pass_rate() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    /// Inline questions. When absent the built-in bank for `modality` is used.
    #[serde(default)]
    pub questions: Option<QuestionSet>,
    #[serde(default)]
    pub modality: Option<Modality>,
    #[serde(default)]
    pub total_secs: Option<u32>,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_pass_rate")]
    pub pass_rate: f64,
    pub steps: Vec<ScriptStep>,
}

impl Script {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptInteraction {
    Copy,
    Paste(String),
    ContextMenu,
    Shortcut(Shortcut),
}

impl ScriptInteraction {
    fn to_interaction(&self) -> Interaction {
        match self {
            ScriptInteraction::Copy => Interaction::Copy,
            ScriptInteraction::Paste(text) => Interaction::Paste(text.clone()),
            ScriptInteraction::ContextMenu => Interaction::ContextMenu,
            ScriptInteraction::Shortcut(s) => {
                let mut modifiers = KeyModifiers::CONTROL;
                if s.shift {
                    modifiers |= KeyModifiers::SHIFT;
                }
                Interaction::Key(KeyEvent::new(KeyCode::Char(s.key), modifiers))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScriptStep {
    Permission { granted: bool },
    Begin,
    Tick { millis: u64 },
    Focus { focused: bool },
    Camera { connected: bool },
    Face { present: bool },
    Intercept { interaction: ScriptInteraction },
    Act { action: Action },
    Submit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayOutcome {
    pub status: SessionStatus,
    pub result: Option<SessionResult>,
    /// Steps the session refused, as `(step index, message)`.
    pub rejected: Vec<(usize, String)>,
    pub blocked: usize,
}

fn questions_for(script: &Script, config: &Config) -> Result<QuestionSet> {
    if let Some(questions) = &script.questions {
        return Ok(questions.clone());
    }
    let bank = Bank::builtin(script.modality.unwrap_or(Modality::Mcq))?;
    let mut rng = StdRng::seed_from_u64(script.seed);
    Ok(bank.questions(
        config.shuffle_questions,
        config.interview_answer_secs,
        &mut rng,
    ))
}

/// Run every step of `script` and report where the session ended up.
pub fn run_script(script: &Script, config: &Config) -> Result<ReplayOutcome> {
    let devices = SimulatedDevices::new();
    let control = devices.control();
    let faces = SharedFaceSignal::new(true);

    let session_config = config.session_config(questions_for(script, config)?, script.total_secs)?;
    let mut session = AssessmentSession::new(session_config, Box::new(devices))?
        .with_face_detector(Box::new(faces.clone()))
        .with_code_runner(Box::new(SimulatedRunner::new(script.seed, script.pass_rate)));

    info!(steps = script.steps.len(), modality = %session.modality(), "replaying script");

    let mut rejected = Vec::new();
    let mut blocked = 0;
    for (index, step) in script.steps.iter().enumerate() {
        debug!(index, ?step, "replay step");
        let outcome = match step {
            ScriptStep::Permission { granted } => {
                control.set_permission(*granted);
                Ok(())
            }
            ScriptStep::Begin => session.begin(),
            ScriptStep::Tick { millis } => {
                session.tick(Duration::from_millis(*millis));
                Ok(())
            }
            ScriptStep::Focus { focused } => {
                session.set_focus(*focused);
                Ok(())
            }
            ScriptStep::Camera { connected } => {
                control.set_camera_connected(*connected);
                Ok(())
            }
            ScriptStep::Face { present } => {
                faces.set(*present);
                Ok(())
            }
            ScriptStep::Intercept { interaction } => {
                if let Verdict::Blocked(_) = session.intercept(&interaction.to_interaction()) {
                    blocked += 1;
                }
                Ok(())
            }
            ScriptStep::Act { action } => session.act(action.clone()),
            ScriptStep::Submit => session.submit().map(|_| ()),
        };
        if let Err(err) = outcome {
            rejected.push((index, err.to_string()));
        }
    }

    let status = session.status();
    let result = session.take_result();
    if result.is_none() {
        session.abandon();
    }
    Ok(ReplayOutcome {
        status,
        result,
        rejected,
        blocked,
    })
}
