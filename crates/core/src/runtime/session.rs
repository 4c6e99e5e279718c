use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::detection::domain::face_detector::FaceDetector;
use crate::runtime::config::TrackerConfig;
use crate::runtime::detection_worker::{spawn_detection_worker, DetectJob, DetectOutcome};
use crate::shared::frame::FrameView;
use crate::tracking::domain::track_set::TrackSet;
use crate::tracking::face_tracker::FaceTracker;

/// State owned by one tracker handle: the fast tracker, its configuration,
/// and the background detection worker.
///
/// Calls arrive serially from one caller thread; the worker is the only
/// other execution context. The two meet at a pair of single-slot
/// channels: one job out, one outcome back, so at most one detection cycle
/// is ever in flight.
pub(crate) struct TrackerSession {
    tracker: FaceTracker,
    config: TrackerConfig,
    started: bool,
    frames_processed: u64,
    /// Bumped by `stop`; an outcome from an older epoch is discarded.
    epoch: u64,
    in_flight: bool,
    cancelled: Arc<AtomicBool>,
    job_tx: Option<Sender<DetectJob>>,
    outcome_rx: Receiver<DetectOutcome>,
    worker: Option<JoinHandle<()>>,
}

impl TrackerSession {
    pub fn new(detector: Box<dyn FaceDetector>, config: TrackerConfig) -> Self {
        let (job_tx, job_rx) = crossbeam_channel::bounded(1);
        let (outcome_tx, outcome_rx) = crossbeam_channel::bounded(1);
        let cancelled = Arc::new(AtomicBool::new(false));
        let worker = spawn_detection_worker(detector, job_rx, outcome_tx, cancelled.clone());

        Self {
            tracker: FaceTracker::new(config.miss_limit),
            config,
            started: false,
            frames_processed: 0,
            epoch: 0,
            in_flight: false,
            cancelled,
            job_tx: Some(job_tx),
            outcome_rx,
            worker: Some(worker),
        }
    }

    /// Enables detection dispatch. Fast tracking runs regardless.
    pub fn start(&mut self) {
        self.started = true;
        self.cancelled.store(false, Ordering::Relaxed);
    }

    /// Suspends detection dispatch and requests best-effort cancellation of
    /// a cycle already running; its late result is discarded by the epoch
    /// bump. Fast tracking keeps running.
    pub fn stop(&mut self) {
        self.started = false;
        self.cancelled.store(true, Ordering::Relaxed);
        self.epoch += 1;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Takes effect at the next dispatched detection cycle.
    pub fn set_min_face_size(&mut self, size: u32) {
        self.config.min_face_size = size;
    }

    /// One frame through the pipeline: drain any landed detection result
    /// into a merge, advance every track with the fast update, and (while
    /// started, at the configured cadence) hand an owned copy of the frame
    /// to the worker. Never blocks on detection; a cycle's effect reaches
    /// the caller of the next call at the earliest.
    pub fn process_frame(&mut self, frame: &FrameView<'_>) -> TrackSet {
        self.drain_pending(frame);
        let set = self.tracker.update(frame);
        self.frames_processed += 1;

        if self.started && self.frames_processed % self.config.detection_interval as u64 == 0 {
            self.dispatch(frame);
        }

        set
    }

    pub fn snapshot(&self) -> TrackSet {
        self.tracker.snapshot()
    }

    fn drain_pending(&mut self, frame: &FrameView<'_>) {
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            self.in_flight = false;
            if outcome.epoch != self.epoch {
                log::debug!("discarding detection result from a stopped cycle");
                continue;
            }
            if let Some(detections) = outcome.detections {
                log::debug!("merging {} detections", detections.len());
                self.tracker.merge(frame, &detections);
            }
        }
    }

    fn dispatch(&mut self, frame: &FrameView<'_>) {
        if self.in_flight {
            log::debug!("skipping detection cycle, previous one still in flight");
            return;
        }
        let Some(job_tx) = &self.job_tx else {
            return;
        };
        let job = DetectJob {
            frame: frame.to_frame(),
            min_face_size: self.config.min_face_size,
            epoch: self.epoch,
        };
        match job_tx.try_send(job) {
            Ok(()) => self.in_flight = true,
            Err(TrySendError::Full(_)) => {
                log::debug!("skipping detection cycle, job slot occupied");
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("detection worker is gone, cycle dropped");
            }
        }
    }

    /// Quiesces the worker: cancels any running cycle, disconnects the job
    /// channel, and joins the thread so no detector state outlives the
    /// session.
    fn shutdown(&mut self) {
        self.cancelled.store(true, Ordering::Relaxed);
        self.job_tx = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("detection worker panicked during shutdown");
            }
        }
    }
}

impl Drop for TrackerSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use crate::detection::domain::face_detector::RawDetection;
    use crate::shared::bounding_box::BoundingBox;
    use crate::shared::error::TrackError;
    use crate::shared::frame::PixelFormat;

    const W: u32 = 100;
    const H: u32 = 100;

    /// Returns a fixed detection set and counts invocations.
    struct ScriptedDetector {
        detections: Vec<RawDetection>,
        calls: Arc<AtomicUsize>,
    }

    impl FaceDetector for ScriptedDetector {
        fn detect(
            &mut self,
            _frame: &FrameView<'_>,
            min_face_size: u32,
        ) -> Result<Vec<RawDetection>, TrackError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .detections
                .iter()
                .filter(|d| {
                    d.bounding_box.width >= min_face_size as i32
                        && d.bounding_box.height >= min_face_size as i32
                })
                .cloned()
                .collect())
        }
    }

    fn square_frame(x: i32, y: i32, side: i32) -> Vec<u8> {
        let mut data = vec![0u8; (W * H) as usize];
        for py in y..y + side {
            for px in x..x + side {
                data[py as usize * W as usize + px as usize] = 255;
            }
        }
        data
    }

    fn view(data: &[u8]) -> FrameView<'_> {
        FrameView::wrap(data, W, H, W as usize, PixelFormat::Gray8).unwrap()
    }

    fn detection(x: i32, y: i32, side: i32) -> RawDetection {
        RawDetection {
            bounding_box: BoundingBox::new(x, y, side, side),
            confidence: 0.9,
        }
    }

    fn session_with_square(interval: usize) -> (TrackerSession, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let detector = ScriptedDetector {
            detections: vec![detection(20, 20, 50)],
            calls: calls.clone(),
        };
        let config = TrackerConfig {
            detection_interval: interval,
            ..Default::default()
        };
        (TrackerSession::new(Box::new(detector), config), calls)
    }

    fn pump_until_tracked(session: &mut TrackerSession, data: &[u8]) -> TrackSet {
        for _ in 0..100 {
            let set = session.process_frame(&view(data));
            if !set.is_empty() {
                return set;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("detection result never reached the track set");
    }

    #[test]
    fn test_no_dispatch_before_start() {
        let (mut session, calls) = session_with_square(1);
        let data = square_frame(20, 20, 50);
        for _ in 0..5 {
            assert!(session.process_frame(&view(&data)).is_empty());
        }
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_detection_result_lands_on_a_later_call() {
        let (mut session, _calls) = session_with_square(1);
        session.start();
        let data = square_frame(20, 20, 50);

        let set = pump_until_tracked(&mut session, &data);
        assert_eq!(set.len(), 1);
        assert!(set.tracks()[0].confidence > 0.0);
        assert_eq!(
            set.tracks()[0].bounding_box,
            BoundingBox::new(20, 20, 50, 50)
        );
    }

    #[test]
    fn test_stop_suspends_dispatch_but_not_tracking() {
        let (mut session, calls) = session_with_square(1);
        session.start();
        let data = square_frame(20, 20, 50);
        pump_until_tracked(&mut session, &data);

        session.stop();
        // Let a possibly in-flight cycle finish before freezing the count.
        std::thread::sleep(Duration::from_millis(50));
        let frozen = calls.load(Ordering::SeqCst);

        for _ in 0..10 {
            let set = session.process_frame(&view(&data));
            // Tracking-only updates keep the existing track alive.
            assert_eq!(set.len(), 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), frozen);
    }

    #[test]
    fn test_result_from_before_stop_is_discarded() {
        let (mut session, _calls) = session_with_square(1);
        session.start();
        let data = square_frame(20, 20, 50);

        // Dispatch one cycle, then stop before draining its result.
        session.process_frame(&view(&data));
        session.stop();
        std::thread::sleep(Duration::from_millis(50));

        for _ in 0..5 {
            let set = session.process_frame(&view(&data));
            assert!(set.is_empty(), "stale result must not be merged");
        }
    }

    #[test]
    fn test_interval_gates_dispatch() {
        let (mut session, calls) = session_with_square(4);
        session.start();
        let data = square_frame(20, 20, 50);

        // Frames 1..=3 are below the cadence.
        for _ in 0..3 {
            session.process_frame(&view(&data));
        }
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // Frame 4 dispatches.
        session.process_frame(&view(&data));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_set_min_face_size_applies_to_next_cycle() {
        let (mut session, calls) = session_with_square(1);
        session.start();
        let data = square_frame(20, 20, 50);

        // The scripted face is 50px; raising the floor above it must
        // filter it out of later cycles.
        session.set_min_face_size(60);
        for _ in 0..10 {
            let set = session.process_frame(&view(&data));
            assert!(set.is_empty());
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(calls.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn test_failing_detector_keeps_session_alive() {
        struct FailingDetector;
        impl FaceDetector for FailingDetector {
            fn detect(
                &mut self,
                _frame: &FrameView<'_>,
                _min_face_size: u32,
            ) -> Result<Vec<RawDetection>, TrackError> {
                Err(TrackError::DetectorUnavailable("scripted failure".into()))
            }
        }

        let mut session =
            TrackerSession::new(Box::new(FailingDetector), TrackerConfig::default());
        session.start();
        let data = square_frame(20, 20, 50);

        for _ in 0..10 {
            let set = session.process_frame(&view(&data));
            assert!(set.is_empty());
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_shutdown_joins_worker() {
        let (session, _calls) = session_with_square(1);
        // Dropping must not hang or leak the worker thread.
        drop(session);
    }
}
