//! 68-point facial landmark types.
//!
//! Points follow the iBUG 300-W numbering:
//! - 0-16: jaw contour
//! - 17-21 / 22-26: eyebrows
//! - 27-30: nose bridge, 31-35: nose base
//! - 36-41 / 42-47: eyes
//! - 48-59: outer lips, 60-67: inner lips

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Number of points produced by the landmark model.
pub const LANDMARK_COUNT: usize = 68;

/// A 2D point in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Ordered landmark points for one face.
///
/// There is no mutating API: once the provider builds a set it is only read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet {
    points: Vec<Point>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Point> {
        self.points.get(index)
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point> {
        self.points.iter()
    }
}

/// A connected run of landmarks drawn as one polyline.
#[derive(Debug, Clone)]
pub struct Contour {
    pub name: &'static str,
    pub indices: Range<usize>,
    pub closed: bool,
}

const fn contour(name: &'static str, indices: Range<usize>, closed: bool) -> Contour {
    Contour {
        name,
        indices,
        closed,
    }
}

/// Polylines that make up the 68-point face outline.
pub const CONTOURS: [Contour; 9] = [
    contour("jaw", 0..17, false),
    contour("right_eyebrow", 17..22, false),
    contour("left_eyebrow", 22..27, false),
    contour("nose_bridge", 27..31, false),
    contour("nose_base", 30..36, false),
    contour("right_eye", 36..42, true),
    contour("left_eye", 42..48, true),
    contour("outer_lips", 48..60, true),
    contour("inner_lips", 60..68, true),
];
