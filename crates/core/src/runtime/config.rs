use crate::shared::constants::{DEFAULT_DETECTION_INTERVAL, DEFAULT_MISS_LIMIT};
use crate::shared::error::TrackError;

/// Per-session tuning.
///
/// `min_face_size` is mutable after creation through the registry's
/// `set_face_size`; the other fields are fixed for the session's lifetime.
#[derive(Clone, Copy, Debug)]
pub struct TrackerConfig {
    /// Detections smaller than this on either side are rejected.
    pub min_face_size: u32,
    /// Dispatch a detection cycle every Nth processed frame.
    pub detection_interval: usize,
    /// Consecutive failed correspondences before a track is removed.
    pub miss_limit: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_face_size: 0,
            detection_interval: DEFAULT_DETECTION_INTERVAL,
            miss_limit: DEFAULT_MISS_LIMIT,
        }
    }
}

impl TrackerConfig {
    pub fn validated(self) -> Result<Self, TrackError> {
        if self.detection_interval < 1 {
            return Err(TrackError::invalid_argument(
                "detection interval must be at least 1 frame",
            ));
        }
        if self.miss_limit < 1 {
            return Err(TrackError::invalid_argument(
                "miss limit must be at least 1",
            ));
        }
        Ok(self)
    }
}

/// Converts a caller-facing signed size to the stored form, rejecting
/// negatives the way the binding surface requires.
pub fn validate_face_size(size: i32) -> Result<u32, TrackError> {
    if size < 0 {
        return Err(TrackError::invalid_argument(format!(
            "minimum face size must be non-negative, got {size}"
        )));
    }
    Ok(size as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(TrackerConfig::default().validated().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = TrackerConfig {
            detection_interval: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validated(),
            Err(TrackError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_zero_miss_limit_rejected() {
        let config = TrackerConfig {
            miss_limit: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validated(),
            Err(TrackError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_negative_face_size_rejected() {
        assert!(matches!(
            validate_face_size(-1),
            Err(TrackError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_face_size_zero_and_positive_accepted() {
        assert_eq!(validate_face_size(0).unwrap(), 0);
        assert_eq!(validate_face_size(20).unwrap(), 20);
    }
}
