//! Landmark overlay rendering.
//!
//! The overlay is a transparent canvas with the exact pixel size of the
//! analysed image, so it can be laid over the image or composited onto it.

use facesym_vision::landmarks::CONTOURS;
use facesym_vision::DetectedFace;
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayStyle {
    /// RGBA
    pub line_color: [u8; 4],
    /// RGBA
    pub point_color: [u8; 4],
    pub point_radius: u32,
    pub draw_lines: bool,
    pub draw_points: bool,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            line_color: [0, 255, 255, 255],
            point_color: [255, 0, 255, 255],
            point_radius: 2,
            draw_lines: true,
            draw_points: true,
        }
    }
}

/// Draw the landmarks of every face onto a transparent `width` x `height`
/// canvas.
pub fn render_overlay(
    width: u32,
    height: u32,
    faces: &[DetectedFace],
    style: &OverlayStyle,
) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
    let line = Rgba(style.line_color);
    let point = Rgba(style.point_color);

    for face in faces {
        let pts = face.landmarks.points();

        if style.draw_lines {
            for contour in &CONTOURS {
                let Some(run) = pts.get(contour.indices.clone()) else {
                    log::debug!("skipping {}: only {} landmarks", contour.name, pts.len());
                    continue;
                };
                for pair in run.windows(2) {
                    draw_line_segment_mut(
                        &mut canvas,
                        (pair[0].x, pair[0].y),
                        (pair[1].x, pair[1].y),
                        line,
                    );
                }
                if contour.closed && run.len() > 2 {
                    let (first, last) = (run[0], run[run.len() - 1]);
                    draw_line_segment_mut(&mut canvas, (last.x, last.y), (first.x, first.y), line);
                }
            }
        }

        if style.draw_points {
            for p in pts {
                draw_filled_circle_mut(
                    &mut canvas,
                    (p.x.round() as i32, p.y.round() as i32),
                    style.point_radius as i32,
                    point,
                );
            }
        }
    }

    canvas
}

/// The image with `overlay` blended on top.
pub fn composite(image: &DynamicImage, overlay: &RgbaImage) -> RgbaImage {
    let mut out = image.to_rgba8();
    image::imageops::overlay(&mut out, overlay, 0, 0);
    out
}

/// Hands out overlay file names inside one output directory.
///
/// Images that share a file stem get `-2`, `-3`, ... appended so no overlay
/// written in the same run is overwritten.
#[derive(Debug)]
pub struct OverlayNames {
    dir: PathBuf,
    taken: HashSet<PathBuf>,
}

impl OverlayNames {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            taken: HashSet::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve the overlay path for `image`.
    pub fn claim(&mut self, image: &Path) -> PathBuf {
        let stem = image
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        let mut file = self.dir.join(format!("{stem}.landmarks.png"));
        let mut n = 2;
        while self.taken.contains(&file) {
            file = self.dir.join(format!("{stem}-{n}.landmarks.png"));
            n += 1;
        }
        self.taken.insert(file.clone());
        file
    }
}
