use anyhow::{Context, Result};
use image::DynamicImage;
use ort::session::Session;

use crate::face::{self, DetectedFace};
use crate::model::{self, ModelPaths};

/// Anything that turns an image into faces with landmarks.
///
/// Faces come back in the provider's own order; callers rely on that order
/// when they pick a face.
pub trait LandmarkProvider {
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<DetectedFace>>;
}

#[derive(Debug, Clone, Copy)]
pub struct DetectionOptions {
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            score_threshold: 0.6,
            nms_threshold: 0.3,
        }
    }
}

/// Full pipeline: detect faces → crop → regress landmarks
pub struct Pipeline {
    pub detector: Session,
    pub landmarker: Session,
    pub options: DetectionOptions,
}

impl Pipeline {
    /// Load every model in the bundle. Fails if any one of them fails.
    pub fn load(paths: &ModelPaths, options: DetectionOptions) -> Result<Self> {
        Ok(Self {
            detector: model::detector_session(paths)?,
            landmarker: model::landmark_session(paths)?,
            options,
        })
    }
}

impl LandmarkProvider for Pipeline {
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<DetectedFace>> {
        let boxes = face::detect_faces(
            &mut self.detector,
            image,
            self.options.score_threshold,
            self.options.nms_threshold,
        )
        .context("detecting faces")?;

        let mut faces = Vec::with_capacity(boxes.len());
        for (i, det) in boxes.into_iter().enumerate() {
            let landmarks = face::predict_landmarks(&mut self.landmarker, image, &det.bbox)
                .with_context(|| format!("predicting landmarks for face {i}"))?;
            faces.push(DetectedFace {
                bbox: det.bbox,
                score: det.score,
                landmarks,
            });
        }
        Ok(faces)
    }
}
