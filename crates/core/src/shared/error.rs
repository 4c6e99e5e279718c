use thiserror::Error;

/// Error taxonomy for the tracking core.
///
/// `DetectorUnavailable` is fatal for the handle being created; the other
/// variants leave session state untouched.
#[derive(Error, Debug)]
pub enum TrackError {
    #[error("no live tracker session for handle {0}")]
    InvalidHandle(u64),

    #[error("invalid frame: {reason} ({width}x{height}, stride {stride_bytes} bytes)")]
    InvalidFrame {
        reason: &'static str,
        width: u32,
        height: u32,
        stride_bytes: usize,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("detector unavailable: {0}")]
    DetectorUnavailable(String),
}

impl TrackError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        TrackError::InvalidArgument(message.into())
    }
}
