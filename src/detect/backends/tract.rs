#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetections;
use crate::frame::Frame;
use crate::onnx::{self, OnnxPlan};

/// Box geometry plus objectness slot in a YOLOv5 head row.
const YOLO_BOX_SLOTS: usize = 5;
/// Class slots the pipeline expects per candidate.
const CLASS_SLOTS: usize = 2;

/// Tract-based periocular detector.
///
/// Accepts two kinds of export:
/// - two outputs `(confidence [N,2], coordinates [N,4])` with NMS baked in,
///   passed through unchanged;
/// - a raw YOLOv5 head `[1, N, 5 + 2]` in input-pixel units, which is scored
///   (objectness x class), thresholded, NMS-filtered and normalized here.
pub struct TractBackend {
    model: OnnxPlan,
    width: u32,
    height: u32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model = onnx::load_model(model_path.as_ref(), width, height)?;
        Ok(Self {
            model,
            width,
            height,
        })
    }

    fn decode_yolo_head(
        &self,
        values: &[f32],
        iou_threshold: f32,
        confidence_threshold: f32,
    ) -> Result<RawDetections> {
        let stride = YOLO_BOX_SLOTS + CLASS_SLOTS;
        if values.len() % stride != 0 {
            return Err(anyhow!(
                "YOLO head length {} is not a multiple of {}",
                values.len(),
                stride
            ));
        }

        let w = self.width as f32;
        let h = self.height as f32;
        let mut candidates: Vec<Candidate> = values
            .chunks_exact(stride)
            .filter_map(|row| {
                let objectness = row[4];
                let classes = &row[YOLO_BOX_SLOTS..];
                let best = classes.iter().copied().fold(0.0_f32, f32::max);
                let score = objectness * best;
                if !(score >= confidence_threshold) {
                    return None;
                }
                let total: f32 = classes.iter().sum();
                let scores = if total > 0.0 {
                    [classes[0] / total, classes[1] / total]
                } else {
                    [0.0, 0.0]
                };
                Some(Candidate {
                    score,
                    scores,
                    bbox: [row[0] / w, row[1] / h, row[2] / w, row[3] / h],
                })
            })
            .collect();

        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        let kept = non_max_suppression(candidates, iou_threshold);

        let mut output = RawDetections::empty();
        for candidate in kept {
            output.push(candidate.scores, candidate.bbox);
        }
        Ok(output)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(
        &mut self,
        input: &Frame,
        iou_threshold: f32,
        confidence_threshold: f32,
    ) -> Result<RawDetections> {
        let tensor = onnx::frame_to_tensor(input, self.width, self.height)?;
        let outputs = onnx::run(&self.model, tensor)?;
        match outputs.len() {
            0 => Err(anyhow!("model produced no outputs")),
            1 => {
                let head = onnx::flatten(&outputs[0])?;
                self.decode_yolo_head(&head, iou_threshold, confidence_threshold)
            }
            _ => Ok(RawDetections::new(
                onnx::flatten(&outputs[0])?,
                onnx::flatten(&outputs[1])?,
            )),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    score: f32,
    scores: [f32; CLASS_SLOTS],
    /// Normalized (cx, cy, w, h).
    bbox: [f32; 4],
}

/// Greedy NMS over score-sorted candidates.
fn non_max_suppression(sorted: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in sorted {
        if kept
            .iter()
            .all(|k| iou(&k.bbox, &candidate.bbox) <= iou_threshold)
        {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let (ax0, ay0, ax1, ay1) = corners(a);
    let (bx0, by0, bx1, by1) = corners(b);
    let iw = (ax1.min(bx1) - ax0.max(bx0)).max(0.0);
    let ih = (ay1.min(by1) - ay0.max(by0)).max(0.0);
    let inter = iw * ih;
    let union = a[2] * a[3] + b[2] * b[3] - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

fn corners(b: &[f32; 4]) -> (f32, f32, f32, f32) {
    (
        b[0] - b[2] / 2.0,
        b[1] - b[3] / 2.0,
        b[0] + b[2] / 2.0,
        b[1] + b[3] / 2.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(score: f32, bbox: [f32; 4]) -> Candidate {
        Candidate {
            score,
            scores: [1.0, 0.0],
            bbox,
        }
    }

    #[test]
    fn nms_drops_overlapping_lower_scores() {
        let sorted = vec![
            candidate(0.9, [0.3, 0.5, 0.2, 0.2]),
            candidate(0.8, [0.31, 0.5, 0.2, 0.2]),
            candidate(0.7, [0.7, 0.5, 0.2, 0.2]),
        ];
        let kept = non_max_suppression(sorted, 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.9);
        assert_eq!(kept[1].score, 0.7);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        assert_eq!(iou(&[0.1, 0.1, 0.1, 0.1], &[0.9, 0.9, 0.1, 0.1]), 0.0);
        assert!((iou(&[0.5, 0.5, 0.2, 0.2], &[0.5, 0.5, 0.2, 0.2]) - 1.0).abs() < 1e-6);
    }
}
