//! Detector output decoding and box geometry.
//!
//! Detectors emit two flat arrays per run: two confidence slots per candidate
//! and four normalized coordinate slots (cx, cy, w, h) per candidate.

use std::fmt;

use crate::error::PipelineError;

/// Confidence slots per candidate.
pub const CONFIDENCE_STRIDE: usize = 2;
/// Coordinate slots per candidate.
pub const COORDINATE_STRIDE: usize = 4;

/// First-slot confidence above which a candidate takes `label_order[1]`.
const LABEL_SPLIT: f32 = 0.5;

/// Eye side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

/// Detector class label. `"L"` and `"R"` map to eye sides; anything else is
/// carried through for drawing but never measured.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Label {
    Left,
    Right,
    Other(String),
}

impl Label {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "L" => Label::Left,
            "R" => Label::Right,
            other => Label::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Label::Left => "L",
            Label::Right => "R",
            Label::Other(raw) => raw,
        }
    }

    pub fn side(&self) -> Option<Side> {
        match self {
            Label::Left => Some(Side::Left),
            Label::Right => Some(Side::Right),
            Label::Other(_) => None,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One localized periocular region with a normalized center box.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    label: Label,
    center_x: f32,
    center_y: f32,
    width: f32,
    height: f32,
}

impl Detection {
    /// Fails when the box has non-positive or non-finite extent.
    pub fn new(
        label: Label,
        center_x: f32,
        center_y: f32,
        width: f32,
        height: f32,
    ) -> Result<Self, PipelineError> {
        let finite = [center_x, center_y, width, height]
            .iter()
            .all(|v| v.is_finite());
        if !finite || width <= 0.0 || height <= 0.0 {
            return Err(PipelineError::malformed(format!(
                "invalid box cx={center_x} cy={center_y} w={width} h={height}"
            )));
        }
        Ok(Self {
            label,
            center_x,
            center_y,
            width,
            height,
        })
    }

    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn center_x(&self) -> f32 {
        self.center_x
    }

    pub fn center_y(&self) -> f32 {
        self.center_y
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }
}

/// Axis-aligned rectangle in pixel units. May extend past the image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelRect {
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

/// Number of candidates implied by each raw array.
pub fn candidate_counts(confidences: &[f32], coordinates: &[f32]) -> (usize, usize) {
    (
        confidences.len() / CONFIDENCE_STRIDE,
        coordinates.len() / COORDINATE_STRIDE,
    )
}

/// Decode raw detector arrays into detections.
///
/// A candidate whose first confidence slot exceeds 0.5 gets `label_order[1]`,
/// otherwise `label_order[0]`. Both arrays must describe the same number of
/// whole candidates; anything else is `MalformedOutput` since pairing labels
/// with boxes by position would be meaningless.
pub fn decode_detections(
    confidences: &[f32],
    coordinates: &[f32],
    label_order: &[Label; 2],
) -> Result<Vec<Detection>, PipelineError> {
    if confidences.len() % CONFIDENCE_STRIDE != 0 {
        return Err(PipelineError::malformed(format!(
            "confidence array length {} is not a multiple of {}",
            confidences.len(),
            CONFIDENCE_STRIDE
        )));
    }
    if coordinates.len() % COORDINATE_STRIDE != 0 {
        return Err(PipelineError::malformed(format!(
            "coordinate array length {} is not a multiple of {}",
            coordinates.len(),
            COORDINATE_STRIDE
        )));
    }
    let (by_confidence, by_coordinates) = candidate_counts(confidences, coordinates);
    if by_confidence != by_coordinates {
        return Err(PipelineError::malformed(format!(
            "confidences imply {} candidates, coordinates imply {}",
            by_confidence, by_coordinates
        )));
    }

    confidences
        .chunks_exact(CONFIDENCE_STRIDE)
        .zip(coordinates.chunks_exact(COORDINATE_STRIDE))
        .map(|(scores, bbox)| {
            let label = if scores[0] > LABEL_SPLIT {
                label_order[1].clone()
            } else {
                label_order[0].clone()
            };
            Detection::new(label, bbox[0], bbox[1], bbox[2], bbox[3])
        })
        .collect()
}

/// Map a normalized detection into pixel space. No clamping.
pub fn to_pixel_rect(detection: &Detection, image_width: u32, image_height: u32) -> PixelRect {
    let w = f64::from(image_width);
    let h = f64::from(image_height);
    let cx = f64::from(detection.center_x);
    let cy = f64::from(detection.center_y);
    let bw = f64::from(detection.width);
    let bh = f64::from(detection.height);
    PixelRect {
        x: (cx - bw / 2.0) * w,
        y: (cy - bh / 2.0) * h,
        width: bw * w,
        height: bh * h,
    }
}

/// Inverse of [`to_pixel_rect`]: (cx, cy, w, h) normalized to the image.
pub fn to_normalized(rect: &PixelRect, image_width: u32, image_height: u32) -> [f64; 4] {
    let w = f64::from(image_width);
    let h = f64::from(image_height);
    [
        (rect.x + rect.width / 2.0) / w,
        (rect.y + rect.height / 2.0) / h,
        rect.width / w,
        rect.height / h,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER: [Label; 2] = [Label::Left, Label::Right];

    #[test]
    fn single_clean_detection_maps_to_pixels() {
        let detections = decode_detections(&[0.9, 0.1], &[0.5, 0.5, 0.2, 0.3], &ORDER).unwrap();
        assert_eq!(detections.len(), 1);
        let det = &detections[0];
        assert_eq!(det.label(), &Label::Right);
        assert_eq!(
            (det.center_x(), det.center_y(), det.width(), det.height()),
            (0.5, 0.5, 0.2, 0.3)
        );

        let rect = to_pixel_rect(det, 1000, 1000);
        assert!((rect.x - 400.0).abs() < 1e-3);
        assert!((rect.y - 350.0).abs() < 1e-3);
        assert!((rect.width - 200.0).abs() < 1e-3);
        assert!((rect.height - 300.0).abs() < 1e-3);
    }

    #[test]
    fn tie_resolves_to_low_index_label() {
        let detections = decode_detections(
            &[0.5, 0.5, 0.2, 0.8],
            &[0.3, 0.5, 0.1, 0.1, 0.7, 0.5, 0.1, 0.1],
            &ORDER,
        )
        .unwrap();
        let labels: Vec<&Label> = detections.iter().map(Detection::label).collect();
        assert_eq!(labels, vec![&Label::Left, &Label::Left]);
    }

    #[test]
    fn custom_label_order_is_respected() {
        let order = [Label::parse("R"), Label::parse("X")];
        let detections = decode_detections(
            &[0.9, 0.1, 0.1, 0.9],
            &[0.3, 0.5, 0.1, 0.1, 0.7, 0.5, 0.1, 0.1],
            &order,
        )
        .unwrap();
        assert_eq!(detections[0].label(), &Label::Other("X".to_string()));
        assert_eq!(detections[1].label(), &Label::Right);
    }

    #[test]
    fn empty_output_decodes_to_nothing() {
        assert!(decode_detections(&[], &[], &ORDER).unwrap().is_empty());
    }

    #[test]
    fn mismatched_counts_are_malformed() {
        let err = decode_detections(&[0.9, 0.1, 0.2, 0.8], &[0.5, 0.5, 0.2, 0.3], &ORDER)
            .unwrap_err();
        assert!(matches!(err, PipelineError::MalformedOutput(_)));

        let err = decode_detections(&[0.9], &[0.5, 0.5, 0.2, 0.3], &ORDER).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedOutput(_)));

        let err = decode_detections(&[0.9, 0.1], &[0.5, 0.5, 0.2], &ORDER).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedOutput(_)));
    }

    #[test]
    fn degenerate_boxes_are_malformed() {
        let err = decode_detections(&[0.9, 0.1], &[0.5, 0.5, 0.0, 0.3], &ORDER).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedOutput(_)));
        assert!(Detection::new(Label::Left, f32::NAN, 0.5, 0.1, 0.1).is_err());
    }

    #[test]
    fn pixel_rect_round_trips() {
        let sizes = [(1000, 1000), (640, 480), (37, 1201), (1, 1)];
        let boxes = [
            (0.5, 0.5, 0.2, 0.3),
            (0.1, 0.9, 0.2, 0.2),
            (0.25, 0.75, 0.5, 0.5),
            (0.5, 0.5, 1.0, 1.0),
            (0.33, 0.41, 0.07, 0.13),
        ];
        for &(w, h) in &sizes {
            for &(cx, cy, bw, bh) in &boxes {
                let det = Detection::new(Label::Left, cx, cy, bw, bh).unwrap();
                let rect = to_pixel_rect(&det, w, h);
                let back = to_normalized(&rect, w, h);
                let expected = [f64::from(cx), f64::from(cy), f64::from(bw), f64::from(bh)];
                for (got, want) in back.iter().zip(expected.iter()) {
                    assert!((got - want).abs() < 1e-9, "{got} vs {want} at {w}x{h}");
                }
            }
        }
    }

    #[test]
    fn pixel_rect_is_not_clamped() {
        let det = Detection::new(Label::Right, 0.05, 0.05, 0.2, 0.2).unwrap();
        let rect = to_pixel_rect(&det, 100, 100);
        assert!(rect.x < 0.0 && rect.y < 0.0);
        assert!((rect.right() - 15.0).abs() < 1e-4);
    }
}
