//! Bilateral symmetry score from 68-point landmarks.
//!
//! The score sums the raw Manhattan distance between fixed left/right
//! landmark pairs and maps it linearly onto 0..=100. Coordinates are not
//! normalized for face position, size or pose, so a translated or tilted
//! face already scores below 100.

use facesym_vision::LandmarkSet;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Landmark index pairs expected to mirror each other.
pub const SYMMETRY_PAIRS: [(usize, usize); 13] = [
    // jaw
    (0, 16),
    (1, 15),
    (2, 14),
    (3, 13),
    (4, 12),
    (5, 11),
    (6, 10),
    (7, 9),
    // eyes
    (37, 43),
    (38, 42),
    (39, 41),
    (40, 40),
    // nose
    (31, 35),
];

/// Total difference that maps to a score of 0.
pub const MAX_DIFFERENCE: f64 = 100.0;

/// Smallest landmark set the pair table can be evaluated on.
pub const REQUIRED_LANDMARKS: usize = max_pair_index() + 1;

const fn max_pair_index() -> usize {
    let mut max = 0;
    let mut i = 0;
    while i < SYMMETRY_PAIRS.len() {
        let (l, r) = SYMMETRY_PAIRS[i];
        if l > max {
            max = l;
        }
        if r > max {
            max = r;
        }
        i += 1;
    }
    max
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SymmetryError {
    #[error("landmark index {index} out of range for a set of {len} points")]
    LandmarkOutOfRange { index: usize, len: usize },
}

/// A symmetry score in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SymmetryScore(u8);

impl SymmetryScore {
    pub fn value(self) -> u8 {
        self.0
    }

    fn from_total(total: f64) -> Self {
        let normalized = total / MAX_DIFFERENCE * 100.0;
        // f64::max drops NaN, so a non-finite total lands on 0
        let score = (100.0 - normalized).max(0.0).round();
        Self(score.min(100.0) as u8)
    }
}

impl fmt::Display for SymmetryScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

fn check_len(landmarks: &LandmarkSet) -> Result<(), SymmetryError> {
    let len = landmarks.len();
    match SYMMETRY_PAIRS
        .iter()
        .flat_map(|&(l, r)| [l, r])
        .find(|&i| i >= len)
    {
        Some(index) => Err(SymmetryError::LandmarkOutOfRange { index, len }),
        None => Ok(()),
    }
}

/// Sum of `|l.x - r.x| + |l.y - r.y|` over [`SYMMETRY_PAIRS`].
pub fn total_difference(landmarks: &LandmarkSet) -> Result<f64, SymmetryError> {
    check_len(landmarks)?;

    let points = landmarks.points();
    let total = SYMMETRY_PAIRS
        .iter()
        .map(|&(l, r)| {
            let (left, right) = (points[l], points[r]);
            (left.x as f64 - right.x as f64).abs() + (left.y as f64 - right.y as f64).abs()
        })
        .sum();
    Ok(total)
}

/// Score one face. Fails without reading anything if the set is too short
/// for the pair table.
pub fn score(landmarks: &LandmarkSet) -> Result<SymmetryScore, SymmetryError> {
    let total = total_difference(landmarks)?;
    log::debug!("symmetry: total difference {:.2}", total);
    Ok(SymmetryScore::from_total(total))
}
