/// Per-frame face tracker.
///
/// Two operations drive every track's lifecycle: `update` advances boxes by
/// cheap template correspondence on every frame, and `merge` reconciles the
/// track set against heavyweight detector output when a detection cycle
/// lands. Detections anchor appearance; correspondence carries it between
/// detections.
use std::collections::{HashMap, HashSet};

use crate::detection::domain::face_detector::RawDetection;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::MATCH_IOU_THRESHOLD;
use crate::shared::frame::FrameView;
use crate::tracking::domain::face_track::FaceTrack;
use crate::tracking::domain::track_set::TrackSet;

/// Side length of the mean-sampled luma template grid.
const TEMPLATE_GRID: usize = 8;

/// Correspondence search half-width in pixels.
const SEARCH_RADIUS: i32 = 8;

/// Correspondence search step in pixels.
const SEARCH_STEP: usize = 2;

/// Mean absolute luma difference above which a correspondence is a miss.
const CORRESPONDENCE_SAD_LIMIT: f64 = 28.0;

pub struct FaceTracker {
    tracks: Vec<FaceTrack>,
    templates: HashMap<u32, Vec<f64>>,
    next_id: u32,
    miss_limit: usize,
    frame_index: u64,
}

impl FaceTracker {
    /// `miss_limit` is the number of consecutive failed correspondences
    /// after which a track is removed.
    pub fn new(miss_limit: usize) -> Self {
        Self {
            tracks: Vec::new(),
            templates: HashMap::new(),
            next_id: 1,
            miss_limit,
            frame_index: 0,
        }
    }

    /// Fast correspondence step over every live track.
    ///
    /// Each track's stored template is matched against a deterministic
    /// offset spiral around its current box; the lowest-cost position wins,
    /// with the zero offset preferred on ties. A hit moves the box and
    /// re-anchors the template at the new position, so repeating `update`
    /// on an unchanged frame is a fixed point. A miss leaves the box where
    /// it was and counts toward removal. `update` never spawns tracks.
    pub fn update(&mut self, frame: &FrameView<'_>) -> TrackSet {
        self.frame_index += 1;
        let fw = frame.width();
        let fh = frame.height();
        let frame_index = self.frame_index;

        let offsets = search_offsets();
        let Self {
            tracks, templates, ..
        } = self;

        for track in tracks.iter_mut() {
            // Frame geometry may differ from the previous update.
            let anchor = track.bounding_box.clamped(fw, fh);
            track.bounding_box = anchor;
            let template = templates
                .entry(track.id)
                .or_insert_with(|| sample_patch(frame, &anchor));

            let mut best_box = anchor;
            let mut best_cost = f64::MAX;
            for &(dx, dy) in &offsets {
                let candidate = anchor.shifted(dx, dy).clamped(fw, fh);
                let cost = patch_distance(frame, &candidate, template);
                if cost < best_cost {
                    best_cost = cost;
                    best_box = candidate;
                }
            }

            if best_cost <= CORRESPONDENCE_SAD_LIMIT {
                track.record_hit(best_box, frame_index);
                *template = sample_patch(frame, &best_box);
            } else {
                track.record_miss();
            }
        }

        self.evict_missed();
        self.snapshot()
    }

    /// Reconciles detector output with the live tracks.
    ///
    /// Greedy nearest-box matching: all (track, detection) pairs with IoU
    /// at or above the match threshold, taken in order of descending IoU
    /// with ties broken by higher detection confidence; each track and each
    /// detection is used at most once. Matched detections refresh the
    /// track; unmatched detections spawn new tracks with fresh ids.
    /// Existing tracks no detection claimed are left to the miss-count
    /// policy, so a single skipped or empty detection cycle does not drop
    /// them.
    pub fn merge(&mut self, frame: &FrameView<'_>, detections: &[RawDetection]) -> TrackSet {
        let fw = frame.width();
        let fh = frame.height();
        let frame_index = self.frame_index;

        let boxes: Vec<BoundingBox> = detections
            .iter()
            .map(|d| d.bounding_box.clamped(fw, fh))
            .collect();

        let mut pairs: Vec<(usize, usize, f64)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (di, bbox) in boxes.iter().enumerate() {
                let iou = track.bounding_box.iou(bbox);
                if iou >= MATCH_IOU_THRESHOLD {
                    pairs.push((ti, di, iou));
                }
            }
        }
        pairs.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    detections[b.1]
                        .confidence
                        .partial_cmp(&detections[a.1].confidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| (a.0, a.1).cmp(&(b.0, b.1)))
        });

        let mut used_tracks = HashSet::new();
        let mut used_dets = HashSet::new();
        for (ti, di, _) in pairs {
            if used_tracks.contains(&ti) || used_dets.contains(&di) {
                continue;
            }
            used_tracks.insert(ti);
            used_dets.insert(di);

            let track = &mut self.tracks[ti];
            track.refresh_from_detection(boxes[di], detections[di].confidence, frame_index);
            self.templates
                .insert(track.id, sample_patch(frame, &boxes[di]));
        }

        for (di, detection) in detections.iter().enumerate() {
            if used_dets.contains(&di) || boxes[di].area() == 0 {
                continue;
            }
            let id = self.next_id;
            self.next_id += 1;
            self.tracks.push(FaceTrack::spawn(
                id,
                boxes[di],
                detection.confidence,
                frame_index,
            ));
            self.templates.insert(id, sample_patch(frame, &boxes[di]));
        }

        self.snapshot()
    }

    /// Current track set without advancing any state.
    pub fn snapshot(&self) -> TrackSet {
        TrackSet::new(self.frame_index, self.tracks.clone())
    }

    fn evict_missed(&mut self) {
        let miss_limit = self.miss_limit;
        let templates = &mut self.templates;
        self.tracks.retain(|t| {
            let keep = t.misses() < miss_limit;
            if !keep {
                templates.remove(&t.id);
            }
            keep
        });
    }
}

/// Offsets ordered by distance from the origin, zero first, so the search
/// is deterministic and stationary content resolves to no movement.
fn search_offsets() -> Vec<(i32, i32)> {
    let mut offsets = Vec::new();
    for dy in (-SEARCH_RADIUS..=SEARCH_RADIUS).step_by(SEARCH_STEP) {
        for dx in (-SEARCH_RADIUS..=SEARCH_RADIUS).step_by(SEARCH_STEP) {
            offsets.push((dx, dy));
        }
    }
    offsets.sort_by_key(|&(dx, dy)| (dx * dx + dy * dy, dy, dx));
    offsets
}

/// Mean-pooled luma patch on a `TEMPLATE_GRID`² grid over `bbox`.
fn sample_patch(frame: &FrameView<'_>, bbox: &BoundingBox) -> Vec<f64> {
    let mut patch = Vec::with_capacity(TEMPLATE_GRID * TEMPLATE_GRID);
    for gy in 0..TEMPLATE_GRID {
        for gx in 0..TEMPLATE_GRID {
            patch.push(sample_luma(frame, bbox, gx, gy));
        }
    }
    patch
}

/// Mean absolute luma difference between the patch under `bbox` and a
/// stored template.
fn patch_distance(frame: &FrameView<'_>, bbox: &BoundingBox, template: &[f64]) -> f64 {
    let mut total = 0.0;
    for gy in 0..TEMPLATE_GRID {
        for gx in 0..TEMPLATE_GRID {
            let sample = sample_luma(frame, bbox, gx, gy);
            total += (sample - template[gy * TEMPLATE_GRID + gx]).abs();
        }
    }
    total / (TEMPLATE_GRID * TEMPLATE_GRID) as f64
}

fn sample_luma(frame: &FrameView<'_>, bbox: &BoundingBox, gx: usize, gy: usize) -> f64 {
    let x = bbox.x + ((gx as f64 + 0.5) * bbox.width as f64 / TEMPLATE_GRID as f64) as i32;
    let y = bbox.y + ((gy as f64 + 0.5) * bbox.height as f64 / TEMPLATE_GRID as f64) as i32;
    let cx = x.clamp(0, frame.width() as i32 - 1) as u32;
    let cy = y.clamp(0, frame.height() as i32 - 1) as u32;
    frame.luma(cx, cy) as f64
}
