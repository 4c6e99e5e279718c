/// IoU floor for matching a detector hit to an existing track.
pub const MATCH_IOU_THRESHOLD: f64 = 0.3;

/// Consecutive failed correspondence updates before a track is removed.
pub const DEFAULT_MISS_LIMIT: usize = 5;

/// Run the heavyweight detector every Nth processed frame.
pub const DEFAULT_DETECTION_INTERVAL: usize = 3;
