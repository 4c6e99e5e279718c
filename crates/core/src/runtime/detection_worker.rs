use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::detection::domain::face_detector::{FaceDetector, RawDetection};
use crate::shared::frame::Frame;

/// One detection cycle: an owned copy of the frame plus the minimum face
/// size in force when the cycle was dispatched.
pub(crate) struct DetectJob {
    pub frame: Frame,
    pub min_face_size: u32,
    pub epoch: u64,
}

/// Worker-to-session report. `detections: None` means the cycle was
/// cancelled or failed; the session still needs it to clear its
/// in-flight slot.
pub(crate) struct DetectOutcome {
    pub detections: Option<Vec<RawDetection>>,
    pub epoch: u64,
}

/// Spawns the per-session detection worker.
///
/// The worker drains jobs until the job channel disconnects, checks the
/// cancel flag before starting each cycle, and always reports an outcome.
/// A failed cycle is logged and dropped; tracking continues from the
/// existing tracks.
pub(crate) fn spawn_detection_worker(
    mut detector: Box<dyn FaceDetector>,
    job_rx: Receiver<DetectJob>,
    outcome_tx: Sender<DetectOutcome>,
    cancelled: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for job in job_rx {
            let detections = if cancelled.load(Ordering::Relaxed) {
                log::debug!("detection cycle cancelled before start");
                None
            } else {
                match detector.detect(&job.frame.view(), job.min_face_size) {
                    Ok(detections) => Some(detections),
                    Err(e) => {
                        log::warn!("detection cycle failed, dropping its result: {e}");
                        None
                    }
                }
            };

            let outcome = DetectOutcome {
                detections,
                epoch: job.epoch,
            };
            if outcome_tx.send(outcome).is_err() {
                break;
            }
        }
        log::debug!("detection worker shut down");
    })
}
