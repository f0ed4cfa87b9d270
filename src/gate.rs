//! Acceptance rule over one run's detections.

use std::fmt;

use crate::geometry::{Detection, Label, Side};

/// Why a detection set was refused. Not an error: the pipeline carries the
/// previous estimates forward and shows the unannotated frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// Neither an `L` nor an `R` detection.
    NoDetections,
    /// More than one detection for the same side; there is no way to tell
    /// which one is the eye.
    DuplicateSide(Side),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NoDetections => f.write_str("no eye detected"),
            Rejection::DuplicateSide(side) => write!(f, "more than one {side} eye detected"),
        }
    }
}

/// Accept iff at most one `R`, at most one `L`, and at least one of them.
pub fn evaluate(detections: &[Detection]) -> Result<(), Rejection> {
    let count = |wanted: Label| {
        detections
            .iter()
            .filter(|det| *det.label() == wanted)
            .count()
    };
    let right = count(Label::Right);
    let left = count(Label::Left);

    if right > 1 {
        return Err(Rejection::DuplicateSide(Side::Right));
    }
    if left > 1 {
        return Err(Rejection::DuplicateSide(Side::Left));
    }
    if right + left == 0 {
        return Err(Rejection::NoDetections);
    }
    Ok(())
}

pub fn is_acceptable(detections: &[Detection]) -> bool {
    evaluate(detections).is_ok()
}
