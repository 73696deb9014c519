//! Media boundary: camera/microphone acquisition and stream recording.
//!
//! The engine never touches a platform API directly. Everything goes through
//! [`MediaDevices`], so the terminal front end and the tests can run on
//! [`SimulatedDevices`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ProctorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaRequest {
    pub video: bool,
    pub audio: bool,
}

impl MediaRequest {
    pub const CAMERA_AND_MIC: MediaRequest = MediaRequest {
        video: true,
        audio: true,
    };
    pub const MIC_ONLY: MediaRequest = MediaRequest {
        video: false,
        audio: true,
    };
}

/// A live device track. Clones share liveness, like handles onto one device.
///
/// `connected` follows the device and may come back; `stopped` is set once by
/// [`Track::stop`] and never cleared.
#[derive(Debug, Clone)]
pub struct Track {
    id: String,
    kind: TrackKind,
    connected: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl Track {
    pub fn new(id: impl Into<String>, kind: TrackKind, connected: Arc<AtomicBool>) -> Self {
        Self {
            id: id.into(),
            kind,
            connected,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_live(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Read-only view for components that may consume but never stop the track.
    pub fn view(&self) -> TrackView {
        TrackView {
            id: self.id.clone(),
            kind: self.kind,
            connected: Arc::clone(&self.connected),
            stopped: Arc::clone(&self.stopped),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackView {
    id: String,
    kind: TrackKind,
    connected: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl TrackView {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_live(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct MediaStream {
    tracks: Vec<Track>,
}

impl MediaStream {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }

    pub fn video(&self) -> Option<&Track> {
        self.tracks.iter().find(|t| t.kind == TrackKind::Video)
    }

    pub fn audio(&self) -> Option<&Track> {
        self.tracks.iter().find(|t| t.kind == TrackKind::Audio)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// Encoded media produced by one recording.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Blob {
    pub mime: String,
    pub size: usize,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl Blob {
    pub fn from_chunks(mime: impl Into<String>, chunks: Vec<Vec<u8>>) -> Self {
        let data = chunks.concat();
        Self {
            mime: mime.into(),
            size: data.len(),
            data,
        }
    }
}

/// A running encoder over a set of tracks.
pub trait Recorder {
    fn mime(&self) -> &str;
    /// Chunk for the timeslice that just ended, if the encoder produced one.
    fn poll_chunk(&mut self) -> Option<Vec<u8>>;
    /// Stop encoding and hand back whatever was still buffered.
    fn stop(&mut self) -> Result<Vec<Vec<u8>>>;
}

pub trait MediaDevices {
    fn acquire(&mut self, request: MediaRequest) -> Result<MediaStream>;
    fn open_recorder(&mut self, tracks: &[TrackView]) -> Result<Box<dyn Recorder>>;
}

#[derive(Debug)]
struct SimState {
    permission: AtomicBool,
    /// Shared by every camera track handed out.
    camera_connected: Arc<AtomicBool>,
    recorder_fails: AtomicBool,
    next_id: AtomicU64,
}

/// Devices that exist only in memory. Cloning shares the same device state.
#[derive(Debug, Clone)]
pub struct SimulatedDevices {
    state: Arc<SimState>,
}

/// Handle for flipping simulated device conditions from outside the session.
#[derive(Debug, Clone)]
pub struct DeviceControl {
    state: Arc<SimState>,
}

impl SimulatedDevices {
    pub fn new() -> Self {
        Self {
            state: Arc::new(SimState {
                permission: AtomicBool::new(true),
                camera_connected: Arc::new(AtomicBool::new(true)),
                recorder_fails: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn control(&self) -> DeviceControl {
        DeviceControl {
            state: Arc::clone(&self.state),
        }
    }

    fn next_track(&self, kind: TrackKind, live: Arc<AtomicBool>) -> Track {
        let n = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        Track::new(format!("sim-{kind}-{n}"), kind, live)
    }
}

impl Default for SimulatedDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceControl {
    pub fn set_permission(&self, granted: bool) {
        self.state.permission.store(granted, Ordering::SeqCst);
    }

    /// Unplugging ends every camera track handed out so far. Replugging revives
    /// only the tracks nobody stopped.
    pub fn set_camera_connected(&self, connected: bool) {
        self.state
            .camera_connected
            .store(connected, Ordering::SeqCst);
    }

    pub fn camera_connected(&self) -> bool {
        self.state.camera_connected.load(Ordering::SeqCst)
    }

    pub fn set_recorder_fails(&self, fails: bool) {
        self.state.recorder_fails.store(fails, Ordering::SeqCst);
    }
}

impl MediaDevices for SimulatedDevices {
    fn acquire(&mut self, request: MediaRequest) -> Result<MediaStream> {
        if !self.state.permission.load(Ordering::SeqCst) {
            return Err(ProctorError::PermissionDenied(
                "user dismissed the permission prompt".into(),
            ));
        }
        if request.video && !self.state.camera_connected.load(Ordering::SeqCst) {
            return Err(ProctorError::PermissionDenied("no camera found".into()));
        }

        let mut tracks = Vec::new();
        if request.video {
            let link = Arc::clone(&self.state.camera_connected);
            tracks.push(self.next_track(TrackKind::Video, link));
        }
        if request.audio {
            tracks.push(self.next_track(TrackKind::Audio, Arc::new(AtomicBool::new(true))));
        }
        Ok(MediaStream::new(tracks))
    }

    fn open_recorder(&mut self, tracks: &[TrackView]) -> Result<Box<dyn Recorder>> {
        if self.state.recorder_fails.load(Ordering::SeqCst) {
            return Err(ProctorError::RecordingFailure("encoder unavailable".into()));
        }
        if let Some(dead) = tracks.iter().find(|t| !t.is_live()) {
            return Err(ProctorError::RecordingFailure(format!(
                "track {} has ended",
                dead.id()
            )));
        }
        Ok(Box::new(SimulatedRecorder {
            tracks: tracks.to_vec(),
            frame: 0,
        }))
    }
}

/// Emits one small chunk per poll while all its tracks are live.
#[derive(Debug)]
pub struct SimulatedRecorder {
    tracks: Vec<TrackView>,
    frame: u32,
}

impl Recorder for SimulatedRecorder {
    fn mime(&self) -> &str {
        "video/webm"
    }

    fn poll_chunk(&mut self) -> Option<Vec<u8>> {
        if self.tracks.iter().any(|t| !t.is_live()) {
            return None;
        }
        self.frame += 1;
        Some(format!("frame{};", self.frame).into_bytes())
    }

    fn stop(&mut self) -> Result<Vec<Vec<u8>>> {
        Ok(vec![b"eos;".to_vec()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_shares_liveness_but_cannot_stop() {
        let track = Track::new("cam", TrackKind::Video, Arc::new(AtomicBool::new(true)));
        let view = track.view();
        assert!(view.is_live());
        track.stop();
        assert!(!view.is_live());
    }

    #[test]
    fn denied_permission_is_reported() {
        let mut devices = SimulatedDevices::new();
        devices.control().set_permission(false);
        let err = devices.acquire(MediaRequest::CAMERA_AND_MIC).unwrap_err();
        assert!(matches!(err, ProctorError::PermissionDenied(_)));
    }

    #[test]
    fn unplugging_ends_camera_tracks() {
        let mut devices = SimulatedDevices::new();
        let stream = devices.acquire(MediaRequest::CAMERA_AND_MIC).unwrap();
        let camera = stream.video().unwrap().view();
        let mic = stream.audio().unwrap().view();

        devices.control().set_camera_connected(false);
        assert!(!camera.is_live());
        assert!(mic.is_live());

        devices.control().set_camera_connected(true);
        assert!(camera.is_live());
    }

    #[test]
    fn stopped_track_stays_dead_across_replug() {
        let mut devices = SimulatedDevices::new();
        let stream = devices.acquire(MediaRequest::CAMERA_AND_MIC).unwrap();
        let camera = stream.video().unwrap().view();
        stream.stop_all();

        devices.control().set_camera_connected(false);
        devices.control().set_camera_connected(true);
        assert!(!camera.is_live());

        let fresh = devices.acquire(MediaRequest::CAMERA_AND_MIC).unwrap();
        assert!(fresh.video().unwrap().is_live());
    }

    #[test]
    fn blob_concatenates_chunks() {
        let blob = Blob::from_chunks("video/webm", vec![b"ab".to_vec(), b"cd".to_vec()]);
        assert_eq!(blob.data, b"abcd");
        assert_eq!(blob.size, 4);
    }

    #[test]
    fn recorder_stops_emitting_when_track_ends() {
        let mut devices = SimulatedDevices::new();
        let stream = devices.acquire(MediaRequest::CAMERA_AND_MIC).unwrap();
        let views: Vec<TrackView> = stream.tracks().iter().map(Track::view).collect();
        let mut recorder = devices.open_recorder(&views).unwrap();

        assert_eq!(recorder.poll_chunk(), Some(b"frame1;".to_vec()));
        stream.stop_all();
        assert_eq!(recorder.poll_chunk(), None);
    }
}
