use crate::geometry::{candidate_counts, CONFIDENCE_STRIDE, COORDINATE_STRIDE};

/// Raw detector output for one frame.
///
/// `confidences` holds two class slots per candidate, `coordinates` holds
/// normalized (cx, cy, w, h) per candidate. Thresholding and NMS have already
/// been applied by the backend.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawDetections {
    pub confidences: Vec<f32>,
    pub coordinates: Vec<f32>,
}

impl RawDetections {
    pub fn new(confidences: Vec<f32>, coordinates: Vec<f32>) -> Self {
        Self {
            confidences,
            coordinates,
        }
    }

    /// Output with no candidates.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Append one candidate.
    pub fn push(&mut self, scores: [f32; CONFIDENCE_STRIDE], bbox: [f32; COORDINATE_STRIDE]) {
        self.confidences.extend_from_slice(&scores);
        self.coordinates.extend_from_slice(&bbox);
    }

    /// Largest candidate count implied by either array.
    pub fn implied_candidates(&self) -> usize {
        let (by_confidence, by_coordinates) =
            candidate_counts(&self.confidences, &self.coordinates);
        by_confidence.max(by_coordinates)
    }

    pub fn is_empty(&self) -> bool {
        self.confidences.is_empty() && self.coordinates.is_empty()
    }
}
