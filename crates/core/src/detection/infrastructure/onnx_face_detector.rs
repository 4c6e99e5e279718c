/// Face detector using ONNX Runtime via `ort`.
///
/// Letterbox preprocessing, NCHW inference, greedy NMS, minimum-size
/// filtering. Output is clamped to the frame and sorted by descending
/// confidence with a positional tie-break so identical input always yields
/// identical output.
use std::path::Path;

use crate::detection::domain::face_detector::{FaceDetector, RawDetection};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::error::TrackError;
use crate::shared::frame::FrameView;

/// Fallback model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Detections below this confidence are discarded before NMS.
pub const DEFAULT_CONFIDENCE_FLOOR: f64 = 0.25;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// Face detector backed by an ONNX Runtime session.
#[derive(Debug)]
pub struct OnnxFaceDetector {
    session: ort::session::Session,
    confidence_floor: f64,
    input_size: u32,
}

impl OnnxFaceDetector {
    /// Load a face-detection ONNX model and prepare for inference.
    ///
    /// Any load failure is `DetectorUnavailable`: the model is the handle's
    /// one heavyweight resource, and without it the handle is useless.
    /// The input resolution is read from the model's input shape (expecting
    /// NCHW); falls back to 640 when the shape is dynamic or unreadable.
    pub fn open(model_path: &Path) -> Result<Self, TrackError> {
        Self::with_confidence_floor(model_path, DEFAULT_CONFIDENCE_FLOOR)
    }

    pub fn with_confidence_floor(
        model_path: &Path,
        confidence_floor: f64,
    ) -> Result<Self, TrackError> {
        let session = ort::session::Session::builder()
            .and_then(|mut b| b.commit_from_file(model_path))
            .map_err(|e| {
                TrackError::DetectorUnavailable(format!(
                    "failed to load model {}: {e}",
                    model_path.display()
                ))
            })?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    // shape is [N, C, H, W] — use H (square input expected)
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        Ok(Self {
            session,
            confidence_floor,
            input_size,
        })
    }
}

impl FaceDetector for OnnxFaceDetector {
    fn detect(
        &mut self,
        frame: &FrameView<'_>,
        min_face_size: u32,
    ) -> Result<Vec<RawDetection>, TrackError> {
        let fw = frame.width();
        let fh = frame.height();
        let unavailable = |e: ort::Error| TrackError::DetectorUnavailable(e.to_string());

        // 1. Preprocess: letterbox + normalize → NCHW float32
        let (input_tensor, scale, pad_x, pad_y) = letterbox(frame, self.input_size);

        // 2. Inference
        let input_value = ort::value::Tensor::from_array(input_tensor).map_err(unavailable)?;
        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(unavailable)?;
        if outputs.len() == 0 {
            return Err(TrackError::DetectorUnavailable(
                "model produced no outputs".into(),
            ));
        }
        let tensor = outputs[0].try_extract_array::<f32>().map_err(unavailable)?;
        let shape = tensor.shape();

        // Output shape is [1, num_features, num_detections] (transposed)
        // or [1, num_detections, num_features]. Handle both.
        let (num_dets, num_feats) = if shape.len() == 3 {
            if shape[1] < shape[2] {
                (shape[2], shape[1])
            } else {
                (shape[1], shape[2])
            }
        } else {
            return Err(TrackError::DetectorUnavailable(format!(
                "unexpected model output shape: {shape:?}"
            )));
        };

        let data = tensor.as_slice().ok_or_else(|| {
            TrackError::DetectorUnavailable("model output is not contiguous".into())
        })?;
        let transposed = shape.len() == 3 && shape[1] < shape[2];

        // 3. Parse rows: [cx, cy, w, h, conf, ...]
        let mut candidates = Vec::new();
        for i in 0..num_dets {
            let row = if transposed {
                (0..num_feats)
                    .map(|f| data[f * num_dets + i])
                    .collect::<Vec<f32>>()
            } else {
                data[i * num_feats..(i + 1) * num_feats].to_vec()
            };

            if row.len() < 5 {
                continue;
            }
            let conf = (row[4] as f64).clamp(0.0, 1.0);
            if conf < self.confidence_floor {
                continue;
            }

            let cx = row[0] as f64;
            let cy = row[1] as f64;
            let w = row[2] as f64;
            let h = row[3] as f64;

            // Map from letterbox coords back to original frame coords
            let x1 = ((cx - w / 2.0) - pad_x as f64) / scale;
            let y1 = ((cy - h / 2.0) - pad_y as f64) / scale;
            let x2 = ((cx + w / 2.0) - pad_x as f64) / scale;
            let y2 = ((cy + h / 2.0) - pad_y as f64) / scale;

            candidates.push(Candidate {
                bbox: [x1, y1, x2, y2],
                confidence: conf,
            });
        }

        // 4. NMS, then convert to integer frame-space boxes
        let kept = nms(&mut candidates, NMS_IOU_THRESH);

        let min_side = min_face_size as i32;
        let mut detections: Vec<RawDetection> = kept
            .into_iter()
            .filter_map(|c| {
                let bbox = BoundingBox::new(
                    c.bbox[0].round() as i32,
                    c.bbox[1].round() as i32,
                    (c.bbox[2] - c.bbox[0]).round() as i32,
                    (c.bbox[3] - c.bbox[1]).round() as i32,
                )
                .clamped(fw, fh);
                if bbox.width < min_side || bbox.height < min_side {
                    return None;
                }
                if bbox.area() == 0 {
                    return None;
                }
                Some(RawDetection {
                    bounding_box: bbox,
                    confidence: c.confidence,
                })
            })
            .collect();

        // 5. Confidence-descending order, position as deterministic tie-break
        detections.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    (a.bounding_box.y, a.bounding_box.x)
                        .cmp(&(b.bounding_box.y, b.bounding_box.x))
                })
        });

        Ok(detections)
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Letterbox-resize a frame to `target_size` × `target_size`.
///
/// Returns `(NCHW float32 tensor, scale, pad_x, pad_y)`. Gray frames are
/// replicated across the three input channels.
fn letterbox(frame: &FrameView<'_>, target_size: u32) -> (ndarray::Array4<f32>, f64, u32, u32) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = (fw * scale).round() as u32;
    let new_h = (fh * scale).round() as u32;
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Pad with 114/255 gray, the YOLO convention
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray(); // [H, W, C] u8, stride-aware
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let src_c = frame.format().bytes_per_pixel().min(3);

    // Nearest-neighbor resize + copy into the padded region
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                let value = src[[src_y, src_x, c.min(src_c - 1)]] as f32 / 255.0;
                tensor[[0, c, ty, tx]] = value;
            }
        }
    }

    (tensor, scale, pad_x, pad_y)
}

// ---------------------------------------------------------------------------
// NMS
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct Candidate {
    bbox: [f64; 4],
    confidence: f64,
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
fn nms(candidates: &mut [Candidate], iou_thresh: f64) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; candidates.len()];

    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(candidates[i].clone());
        for j in (i + 1)..candidates.len() {
            if suppressed[j] {
                continue;
            }
            if corner_iou(&candidates[i].bbox, &candidates[j].bbox) > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

/// IoU of two `[x1, y1, x2, y2]` boxes in letterbox-mapped float space.
fn corner_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::frame::PixelFormat;

    fn rgb_view(data: &[u8], w: u32, h: u32) -> FrameView<'_> {
        FrameView::wrap(data, w, h, w as usize * 3, PixelFormat::Rgb8).unwrap()
    }

    #[test]
    fn test_letterbox_preserves_aspect_ratio() {
        // 200x100 frame → letterbox to 640x640
        // Scale = min(640/200, 640/100) = 3.2, new_w = 640, new_h = 320
        let data = vec![128u8; 200 * 100 * 3];
        let frame = rgb_view(&data, 200, 100);
        let (tensor, scale, pad_x, pad_y) = letterbox(&frame, 640);

        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert!((scale - 3.2).abs() < 0.01);
        assert_eq!(pad_x, 0);
        assert_eq!(pad_y, 160);
    }

    #[test]
    fn test_letterbox_square_frame() {
        let data = vec![128u8; 100 * 100 * 3];
        let frame = rgb_view(&data, 100, 100);
        let (tensor, scale, pad_x, pad_y) = letterbox(&frame, 640);

        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert!((scale - 6.4).abs() < 0.01);
        assert_eq!(pad_x, 0);
        assert_eq!(pad_y, 0);
    }

    #[test]
    fn test_letterbox_values_normalized() {
        let data = vec![255u8; 100 * 50 * 3];
        let frame = rgb_view(&data, 100, 50);
        let (tensor, _, pad_x, pad_y) = letterbox(&frame, 640);

        // Wide frame: scale = 6.4, new_h = 320, pad_y = 160
        assert_eq!(pad_x, 0);
        assert!(pad_y > 0);

        // Image region pixel is ~1.0
        let y = pad_y as usize + 1;
        assert!((tensor[[0, 0, y, 1]] - 1.0).abs() < 0.01);

        // Pad pixel stays at the 114/255 fill
        let pad_val = 114.0 / 255.0;
        assert!((tensor[[0, 0, 0, 0]] - pad_val).abs() < 0.01);
    }

    #[test]
    fn test_letterbox_replicates_gray_channel() {
        let data = vec![200u8; 50 * 50];
        let frame = FrameView::wrap(&data, 50, 50, 50, PixelFormat::Gray8).unwrap();
        let (tensor, _, _, _) = letterbox(&frame, 640);

        let expected = 200.0 / 255.0;
        for c in 0..3 {
            assert!((tensor[[0, c, 320, 320]] - expected).abs() < 0.01);
        }
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let mut candidates = vec![
            Candidate {
                bbox: [0.0, 0.0, 100.0, 100.0],
                confidence: 0.9,
            },
            Candidate {
                bbox: [5.0, 5.0, 105.0, 105.0],
                confidence: 0.8,
            },
        ];
        let kept = nms(&mut candidates, 0.3);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_nms_keeps_non_overlapping() {
        let mut candidates = vec![
            Candidate {
                bbox: [0.0, 0.0, 50.0, 50.0],
                confidence: 0.9,
            },
            Candidate {
                bbox: [200.0, 200.0, 250.0, 250.0],
                confidence: 0.8,
            },
        ];
        let kept = nms(&mut candidates, 0.3);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_nms_empty_input() {
        let mut candidates: Vec<Candidate> = Vec::new();
        assert!(nms(&mut candidates, 0.3).is_empty());
    }

    #[test]
    fn test_nms_higher_confidence_wins() {
        let mut candidates = vec![
            Candidate {
                bbox: [0.0, 0.0, 100.0, 100.0],
                confidence: 0.5,
            },
            Candidate {
                bbox: [2.0, 2.0, 102.0, 102.0],
                confidence: 0.9,
            },
        ];
        let kept = nms(&mut candidates, 0.3);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_corner_iou_no_overlap() {
        assert_eq!(
            corner_iou(&[0.0, 0.0, 10.0, 10.0], &[20.0, 20.0, 30.0, 30.0]),
            0.0
        );
    }

    #[test]
    fn test_corner_iou_perfect() {
        let b = [0.0, 0.0, 10.0, 10.0];
        assert!((corner_iou(&b, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_open_missing_model_is_detector_unavailable() {
        let err = OnnxFaceDetector::open(Path::new("/nonexistent/model.onnx")).unwrap_err();
        assert!(matches!(err, TrackError::DetectorUnavailable(_)));
    }
}
