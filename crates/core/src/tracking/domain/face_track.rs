use crate::shared::bounding_box::BoundingBox;

/// Track lifecycle: spawned `New`, confirmed `Tracked` by the first
/// successful correspondence or detector refresh, degraded to `Stale` by
/// failed correspondences. Past the miss limit the track is removed and
/// its id is never reissued.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackState {
    New,
    Tracked,
    Stale,
}

/// A face identity persisted across frames.
#[derive(Clone, Debug)]
pub struct FaceTrack {
    pub id: u32,
    pub bounding_box: BoundingBox,
    pub confidence: f64,
    pub last_seen_frame: u64,
    pub state: TrackState,
    misses: usize,
}

impl FaceTrack {
    pub fn spawn(id: u32, bounding_box: BoundingBox, confidence: f64, frame_index: u64) -> Self {
        Self {
            id,
            bounding_box,
            confidence,
            last_seen_frame: frame_index,
            state: TrackState::New,
            misses: 0,
        }
    }

    /// A successful fast-correspondence step: the box moved, the face is
    /// still there.
    pub fn record_hit(&mut self, bounding_box: BoundingBox, frame_index: u64) {
        self.bounding_box = bounding_box;
        self.last_seen_frame = frame_index;
        self.state = TrackState::Tracked;
        self.misses = 0;
    }

    /// A detector hit matched this track: box and confidence are refreshed.
    pub fn refresh_from_detection(
        &mut self,
        bounding_box: BoundingBox,
        confidence: f64,
        frame_index: u64,
    ) {
        self.confidence = confidence;
        self.record_hit(bounding_box, frame_index);
    }

    /// A failed correspondence step.
    pub fn record_miss(&mut self) {
        self.state = TrackState::Stale;
        self.misses += 1;
    }

    pub fn misses(&self) -> usize {
        self.misses
    }
}
