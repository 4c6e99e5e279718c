use crate::shared::bounding_box::BoundingBox;
use crate::shared::error::TrackError;
use crate::shared::frame::FrameView;

/// A single detector hit in frame coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub bounding_box: BoundingBox,
    pub confidence: f64,
}

/// Domain interface for the heavyweight face detector.
///
/// Implementations must be deterministic for identical input and return
/// hits sorted by descending confidence; an empty vec means no faces and
/// is not an error. Boxes smaller than `min_face_size` on either side are
/// dropped. `Send` because detection runs on a worker thread; `&mut self`
/// because backends hold session state.
pub trait FaceDetector: Send {
    fn detect(
        &mut self,
        frame: &FrameView<'_>,
        min_face_size: u32,
    ) -> Result<Vec<RawDetection>, TrackError>;
}
