use std::collections::HashMap;
use std::path::Path;

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::infrastructure::onnx_face_detector::OnnxFaceDetector;
use crate::runtime::config::{validate_face_size, TrackerConfig};
use crate::runtime::session::TrackerSession;
use crate::shared::error::TrackError;
use crate::shared::frame::FrameView;
use crate::tracking::domain::track_set::TrackSet;

/// Opaque identifier for one tracker session.
///
/// Plain data: holding a handle grants nothing by itself, every operation
/// goes through the registry that issued it, and the registry rejects
/// handles it no longer knows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TrackerHandle(u64);

impl TrackerHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Owning registry for tracker sessions.
///
/// The handle is an index into this registry; lifecycle is enforced here
/// rather than by raw pointers. Handle values are never reused, so a
/// use-after-destroy is always `InvalidHandle` instead of silently hitting
/// a newer session. Callers drive one frame at a time per handle; `&mut
/// self` makes concurrent `process_frame` calls on the same registry a
/// compile error rather than a data race.
pub struct TrackerRegistry {
    sessions: HashMap<u64, TrackerSession>,
    next_handle: u64,
}

impl TrackerRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            next_handle: 1,
        }
    }

    /// Creates a session backed by an ONNX model on disk.
    ///
    /// A model that fails to load is `DetectorUnavailable` and no handle
    /// is allocated, so no partially-initialized session can leak.
    pub fn create(
        &mut self,
        model_path: &Path,
        min_face_size: i32,
    ) -> Result<TrackerHandle, TrackError> {
        let min_face_size = validate_face_size(min_face_size)?;
        let detector = OnnxFaceDetector::open(model_path)?;
        let config = TrackerConfig {
            min_face_size,
            ..Default::default()
        };
        Ok(self.insert(Box::new(detector), config))
    }

    /// Creates a session with an injected detector backend.
    pub fn create_with_detector(
        &mut self,
        detector: Box<dyn FaceDetector>,
        config: TrackerConfig,
    ) -> Result<TrackerHandle, TrackError> {
        let config = config.validated()?;
        Ok(self.insert(detector, config))
    }

    fn insert(&mut self, detector: Box<dyn FaceDetector>, config: TrackerConfig) -> TrackerHandle {
        let handle = TrackerHandle(self.next_handle);
        self.next_handle += 1;
        self.sessions
            .insert(handle.0, TrackerSession::new(detector, config));
        log::info!("created tracker session {}", handle.0);
        handle
    }

    /// Tears the session down, quiescing its detection worker before any
    /// state is released. Destroying an already-destroyed handle is
    /// `InvalidHandle`.
    pub fn destroy(&mut self, handle: TrackerHandle) -> Result<(), TrackError> {
        // Dropping the session joins the worker.
        self.sessions
            .remove(&handle.0)
            .map(drop)
            .ok_or(TrackError::InvalidHandle(handle.0))?;
        log::info!("destroyed tracker session {}", handle.0);
        Ok(())
    }

    pub fn start(&mut self, handle: TrackerHandle) -> Result<(), TrackError> {
        self.session_mut(handle)?.start();
        Ok(())
    }

    pub fn stop(&mut self, handle: TrackerHandle) -> Result<(), TrackError> {
        self.session_mut(handle)?.stop();
        Ok(())
    }

    pub fn set_face_size(&mut self, handle: TrackerHandle, size: i32) -> Result<(), TrackError> {
        let session = self.session_mut(handle)?;
        let size = validate_face_size(size)?;
        session.set_min_face_size(size);
        Ok(())
    }

    /// Runs one frame through the handle's session and returns the current
    /// track snapshot.
    pub fn process_frame(
        &mut self,
        handle: TrackerHandle,
        frame: &FrameView<'_>,
    ) -> Result<TrackSet, TrackError> {
        Ok(self.session_mut(handle)?.process_frame(frame))
    }

    /// Current snapshot without advancing tracking state.
    pub fn track_set(&self, handle: TrackerHandle) -> Result<TrackSet, TrackError> {
        self.sessions
            .get(&handle.0)
            .map(|s| s.snapshot())
            .ok_or(TrackError::InvalidHandle(handle.0))
    }

    pub fn is_started(&self, handle: TrackerHandle) -> Result<bool, TrackError> {
        self.sessions
            .get(&handle.0)
            .map(|s| s.is_started())
            .ok_or(TrackError::InvalidHandle(handle.0))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn session_mut(&mut self, handle: TrackerHandle) -> Result<&mut TrackerSession, TrackError> {
        self.sessions
            .get_mut(&handle.0)
            .ok_or(TrackError::InvalidHandle(handle.0))
    }
}

impl Default for TrackerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
