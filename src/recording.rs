use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{ProctorError, Result};
use crate::media::{Blob, MediaDevices, MediaRequest, MediaStream, Recorder, TrackView};
use crate::session::QuestionId;

/// Addresses one in-flight recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingHandle {
    pub question_id: QuestionId,
    seq: u64,
}

struct ActiveRecording {
    handle: RecordingHandle,
    recorder: Box<dyn Recorder>,
    audio: MediaStream,
    chunks: Vec<Vec<u8>>,
    elapsed: Duration,
}

/// One recorder at a time over the shared camera plus a private microphone stream.
#[derive(Default)]
pub struct RecordingCapture {
    active: Option<ActiveRecording>,
    next_seq: u64,
}

impl RecordingCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn current(&self) -> Option<&RecordingHandle> {
        self.active.as_ref().map(|a| &a.handle)
    }

    pub fn elapsed(&self) -> Duration {
        self.active.as_ref().map_or(Duration::ZERO, |a| a.elapsed)
    }

    pub fn begin(
        &mut self,
        devices: &mut dyn MediaDevices,
        video: TrackView,
        question_id: QuestionId,
    ) -> Result<RecordingHandle> {
        if let Some(active) = &self.active {
            return Err(ProctorError::RecordingFailure(format!(
                "already recording question {}",
                active.handle.question_id
            )));
        }
        if !video.is_live() {
            return Err(ProctorError::RecordingFailure("camera track has ended".into()));
        }

        let audio = devices
            .acquire(MediaRequest::MIC_ONLY)
            .map_err(|e| ProctorError::RecordingFailure(e.to_string()))?;
        let mut tracks = vec![video];
        tracks.extend(audio.audio().map(|t| t.view()));

        let recorder = match devices.open_recorder(&tracks) {
            Ok(recorder) => recorder,
            Err(err) => {
                audio.stop_all();
                warn!(error = %err, "recorder failed to start");
                return Err(match err {
                    ProctorError::RecordingFailure(_) => err,
                    other => ProctorError::RecordingFailure(other.to_string()),
                });
            }
        };

        self.next_seq += 1;
        let handle = RecordingHandle {
            question_id,
            seq: self.next_seq,
        };
        info!(question = %handle.question_id, "recording started");
        self.active = Some(ActiveRecording {
            handle: handle.clone(),
            recorder,
            audio,
            chunks: Vec::new(),
            elapsed: Duration::ZERO,
        });
        Ok(handle)
    }

    /// Pull whatever the encoder buffered since the last poll.
    pub fn poll(&mut self, dt: Duration) {
        if let Some(active) = self.active.as_mut() {
            active.elapsed += dt;
            if let Some(chunk) = active.recorder.poll_chunk() {
                active.chunks.push(chunk);
            }
        }
    }

    pub fn end(&mut self, handle: &RecordingHandle) -> Result<Blob> {
        let mut active = match self.active.take() {
            Some(active) if active.handle == *handle => active,
            other => {
                self.active = other;
                return Err(ProctorError::RecordingFailure(format!(
                    "no active recording for question {}",
                    handle.question_id
                )));
            }
        };

        let tail = active.recorder.stop();
        active.audio.stop_all();
        let tail = tail.map_err(|e| ProctorError::RecordingFailure(e.to_string()))?;
        active.chunks.extend(tail);

        let mime = active.recorder.mime().to_string();
        let blob = Blob::from_chunks(mime, active.chunks);
        info!(
            question = %handle.question_id,
            bytes = blob.size,
            secs = active.elapsed.as_secs(),
            "recording finished"
        );
        Ok(blob)
    }

    /// Drop an in-flight recording without producing a blob.
    pub fn abort(&mut self) {
        if let Some(mut active) = self.active.take() {
            let _ = active.recorder.stop();
            active.audio.stop_all();
            debug!(question = %active.handle.question_id, "recording discarded");
        }
    }
}

impl Drop for RecordingCapture {
    fn drop(&mut self) {
        self.abort();
    }
}

impl std::fmt::Debug for RecordingCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingCapture")
            .field("current", &self.current())
            .field("elapsed", &self.elapsed())
            .finish()
    }
}
