use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ProctorError, Result};
use crate::media::{Blob, MediaDevices, TrackView};
use crate::recording::{RecordingCapture, RecordingHandle};
use crate::session::QuestionId;

pub const DEFAULT_ANSWER_SECS: u32 = 120;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewQuestion {
    pub id: QuestionId,
    pub prompt: String,
    /// Falls back to [`DEFAULT_ANSWER_SECS`] when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_secs: Option<u32>,
}

impl InterviewQuestion {
    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(u64::from(
            self.time_limit_secs.unwrap_or(DEFAULT_ANSWER_SECS),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewAction {
    StartRecording,
    StopRecording,
    /// Finish the current question and move on; past the last one the session completes.
    Next,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Stay,
    Moved,
    Finished,
}

#[derive(Debug)]
pub struct InterviewState {
    questions: Vec<InterviewQuestion>,
    current: usize,
    recordings: BTreeMap<QuestionId, Blob>,
    capture: RecordingCapture,
    handle: Option<RecordingHandle>,
}

impl InterviewState {
    pub fn new(questions: Vec<InterviewQuestion>) -> Self {
        Self {
            questions,
            current: 0,
            recordings: BTreeMap::new(),
            capture: RecordingCapture::new(),
            handle: None,
        }
    }

    pub fn questions(&self) -> &[InterviewQuestion] {
        &self.questions
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn current_question(&self) -> Option<&InterviewQuestion> {
        self.questions.get(self.current)
    }

    pub fn is_recording(&self) -> bool {
        self.handle.is_some()
    }

    pub fn recording_elapsed(&self) -> Duration {
        self.capture.elapsed()
    }

    pub fn recording(&self, id: &QuestionId) -> Option<&Blob> {
        self.recordings.get(id)
    }

    pub fn recorded(&self) -> usize {
        self.recordings.len()
    }

    pub fn apply(
        &mut self,
        action: InterviewAction,
        devices: &mut dyn MediaDevices,
        camera: Option<TrackView>,
    ) -> Result<Advance> {
        match action {
            InterviewAction::StartRecording => {
                let question = self
                    .current_question()
                    .ok_or_else(|| ProctorError::InvalidAction("no questions left".into()))?;
                let id = question.id.clone();
                let camera = camera.ok_or_else(|| {
                    ProctorError::RecordingFailure("no camera available".into())
                })?;
                let handle = self.capture.begin(devices, camera, id)?;
                self.handle = Some(handle);
                Ok(Advance::Stay)
            }
            InterviewAction::StopRecording => {
                if self.handle.is_none() {
                    return Err(ProctorError::InvalidAction("not recording".into()));
                }
                self.stop()?;
                Ok(Advance::Stay)
            }
            InterviewAction::Next => {
                if self.handle.is_some() {
                    self.stop()?;
                }
                self.current += 1;
                if self.current >= self.questions.len() {
                    info!(recorded = self.recordings.len(), "interview finished");
                    Ok(Advance::Finished)
                } else {
                    Ok(Advance::Moved)
                }
            }
        }
    }

    /// Buffer recorder output and enforce the per-question time limit.
    /// Returns the question whose recording was cut off, if any.
    pub fn tick(&mut self, dt: Duration) -> Option<QuestionId> {
        self.handle.as_ref()?;
        self.capture.poll(dt);

        let limit = self.current_question().map(InterviewQuestion::time_limit)?;
        if self.capture.elapsed() < limit {
            return None;
        }
        let id = self.handle.as_ref().map(|h| h.question_id.clone());
        match self.stop() {
            Ok(()) => info!("answer time limit reached, recording stopped"),
            Err(err) => warn!(error = %err, "could not stop recording at time limit"),
        }
        id
    }

    /// Keep whatever is being recorded right now.
    pub fn finalize(&mut self) {
        if self.handle.is_some() {
            if let Err(err) = self.stop() {
                warn!(error = %err, "in-progress recording lost during finalize");
            }
        }
    }

    pub fn abort(&mut self) {
        self.handle = None;
        self.capture.abort();
    }

    /// A new take replaces any earlier recording for the same question.
    fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let blob = self.capture.end(&handle)?;
        self.recordings.insert(handle.question_id, blob);
        Ok(())
    }

    pub fn answers(&self) -> BTreeMap<QuestionId, Blob> {
        self.recordings.clone()
    }
}
