use crate::landmarks::{LandmarkSet, Point, LANDMARK_COUNT};
use crate::yunet;
use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::{session::Session, value::Value};
use serde::Serialize;

/// YuNet runs on a fixed square input.
pub const DETECTOR_INPUT: u32 = 640;

/// Side of the square crop fed to the landmark model.
pub const LANDMARK_INPUT: u32 = 112;

/// Crop side relative to the larger side of the detection box.
pub const LANDMARK_CROP_SCALE: f32 = 1.2;

/// Largest crop side accepted, relative to the larger image side.
pub const MAX_CROP_RATIO: f32 = 4.0;

/// One detected face with its 68 landmarks, in original image pixels.
#[derive(Debug, Clone, Serialize)]
pub struct DetectedFace {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: LandmarkSet,
}

/// Box-only detection before landmark regression.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
}

/// Placement of the original image inside the square detector canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl Letterbox {
    pub fn fit(width: u32, height: u32, target: u32) -> Self {
        let scale = target as f32 / width.max(height) as f32;
        let new_w = (width as f32 * scale) as u32;
        let new_h = (height as f32 * scale) as u32;
        Self {
            scale,
            offset_x: (target - new_w.min(target)) / 2,
            offset_y: (target - new_h.min(target)) / 2,
        }
    }

    /// Canvas pixel box back to original image pixels.
    pub fn unmap_bbox(&self, b: [f32; 4]) -> [f32; 4] {
        [
            (b[0] - self.offset_x as f32) / self.scale,
            (b[1] - self.offset_y as f32) / self.scale,
            b[2] / self.scale,
            b[3] / self.scale,
        ]
    }
}

/// Square region around a detection that the landmark model sees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRegion {
    pub x: f32,
    pub y: f32,
    pub side: f32,
}

impl CropRegion {
    pub fn around(bbox: &[f32; 4]) -> Self {
        let side = bbox[2].max(bbox[3]) * LANDMARK_CROP_SCALE;
        let cx = bbox[0] + bbox[2] / 2.0;
        let cy = bbox[1] + bbox[3] / 2.0;
        Self {
            x: cx - side / 2.0,
            y: cy - side / 2.0,
            side,
        }
    }

    /// Crop-normalized `[0, 1]` coordinates to image pixels.
    pub fn to_image(&self, nx: f32, ny: f32) -> Point {
        Point::new(self.x + nx * self.side, self.y + ny * self.side)
    }

    /// Cut the region out of `img`, zero padding whatever falls outside.
    pub fn extract(&self, img: &DynamicImage) -> Result<DynamicImage> {
        let (w, h) = img.dimensions();
        let limit = w.max(h) as f32 * MAX_CROP_RATIO;
        if !(self.x.is_finite() && self.y.is_finite() && self.side <= limit) {
            anyhow::bail!(
                "crop region {:?} does not fit a {}x{} image",
                self,
                w,
                h
            );
        }
        let side = self.side.round().max(1.0) as u32;
        let mut canvas = DynamicImage::new_rgb8(side, side);

        let x0 = self.x.round() as i64;
        let y0 = self.y.round() as i64;
        let sx = x0.clamp(0, w as i64) as u32;
        let sy = y0.clamp(0, h as i64) as u32;
        let ex = (x0 + side as i64).clamp(0, w as i64) as u32;
        let ey = (y0 + side as i64).clamp(0, h as i64) as u32;

        if ex > sx && ey > sy {
            let part = img.crop_imm(sx, sy, ex - sx, ey - sy);
            image::imageops::overlay(&mut canvas, &part, sx as i64 - x0, sy as i64 - y0);
        }
        Ok(canvas)
    }
}

/// Pack an RGB image into a `[1, 3, H, W]` tensor.
///
/// `bgr` swaps channel order; `scale` multiplies every value.
fn to_chw(img: &image::RgbImage, bgr: bool, scale: f32) -> Result<Array4<f32>> {
    let (w, h) = img.dimensions();
    let plane = (w * h) as usize;
    let mut data = vec![0.0f32; 3 * plane];
    let (first, rest) = data.split_at_mut(plane);
    let (second, third) = rest.split_at_mut(plane);
    let (c0, c2) = if bgr { (2, 0) } else { (0, 2) };

    for (i, px) in img.as_raw().chunks_exact(3).enumerate() {
        first[i] = px[c0] as f32 * scale;
        second[i] = px[1] as f32 * scale;
        third[i] = px[c2] as f32 * scale;
    }

    Ok(Array4::from_shape_vec((1, 3, h as usize, w as usize), data)?)
}

/// Run a single-input session and copy out every output tensor.
fn run_session(session: &mut Session, input: Array4<f32>) -> Result<Vec<(Vec<i64>, Vec<f32>)>> {
    let tensor = Value::from_array(input)?;
    let outputs = session.run(ort::inputs![tensor])?;
    let mut out = Vec::new();
    for (_name, value) in outputs.iter() {
        let (shape, data) = value.try_extract_tensor::<f32>()?;
        out.push((shape.iter().copied().collect(), data.to_vec()));
    }
    Ok(out)
}

/// Detect face boxes with YuNet. Results are sorted by score, highest first.
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        anyhow::bail!("empty image");
    }
    let letterbox = Letterbox::fit(width, height, DETECTOR_INPUT);
    let new_w = ((width as f32 * letterbox.scale) as u32).max(1);
    let new_h = ((height as f32 * letterbox.scale) as u32).max(1);

    let resized = img.resize_exact(new_w, new_h, image::imageops::FilterType::Triangle);
    let mut canvas = DynamicImage::new_rgb8(DETECTOR_INPUT, DETECTOR_INPUT);
    image::imageops::overlay(
        &mut canvas,
        &resized,
        letterbox.offset_x as i64,
        letterbox.offset_y as i64,
    );

    // YuNet takes BGR in [0, 255]
    let input = to_chw(&canvas.to_rgb8(), true, 1.0)?;
    let raw = run_session(session, input).context("running detector")?;
    let refs: Vec<(&[i64], &[f32])> = raw
        .iter()
        .map(|(s, d)| (s.as_slice(), d.as_slice()))
        .collect();

    let heads = yunet::parse_outputs(&refs, DETECTOR_INPUT as usize)?;
    let decoded = yunet::decode(&heads, score_threshold, DETECTOR_INPUT as usize)?;
    log::debug!("yunet: {} candidates above {}", decoded.len(), score_threshold);

    let detections: Vec<Detection> = decoded
        .into_iter()
        .map(|d| Detection {
            bbox: letterbox.unmap_bbox(d.bbox),
            score: d.score,
        })
        .collect();

    Ok(nms(&detections, nms_threshold))
}

/// Regress 68 landmarks for one detection.
pub fn predict_landmarks(
    session: &mut Session,
    img: &DynamicImage,
    bbox: &[f32; 4],
) -> Result<LandmarkSet> {
    let region = CropRegion::around(bbox);
    let crop = region
        .extract(img)?
        .resize_exact(
            LANDMARK_INPUT,
            LANDMARK_INPUT,
            image::imageops::FilterType::Triangle,
        )
        .to_rgb8();

    let input = to_chw(&crop, false, 1.0 / 255.0)?;
    let raw = run_session(session, input).context("running landmark model")?;
    let coords = raw
        .first()
        .map(|(_, d)| d.as_slice())
        .ok_or_else(|| anyhow::anyhow!("landmark model produced no output"))?;

    let (w, h) = img.dimensions();
    landmarks_from_output(coords, &region, w, h)
}

/// Map normalized model output to clamped image pixels.
pub fn landmarks_from_output(
    coords: &[f32],
    region: &CropRegion,
    width: u32,
    height: u32,
) -> Result<LandmarkSet> {
    if coords.len() != LANDMARK_COUNT * 2 {
        anyhow::bail!(
            "landmark model produced {} values, expected {}",
            coords.len(),
            LANDMARK_COUNT * 2
        );
    }
    let points = coords
        .chunks_exact(2)
        .map(|c| {
            let p = region.to_image(c[0], c[1]);
            Point::new(p.x.clamp(0.0, width as f32), p.y.clamp(0.0, height as f32))
        })
        .collect();
    Ok(LandmarkSet::new(points))
}

/// Non-maximum suppression. Output is ordered by descending score.
pub fn nms(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    if iou_threshold >= 1.0 {
        return sorted;
    }

    let mut keep: Vec<Detection> = Vec::new();
    for det in sorted {
        if keep
            .iter()
            .all(|k| compute_iou(&k.bbox, &det.bbox) <= iou_threshold)
        {
            keep.push(det);
        }
    }
    keep
}

fn compute_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let inter = (x2 - x1) * (y2 - y1);
    let area_a = a[2] * a[3];
    let area_b = b[2] * b[3];
    inter / (area_a + area_b - inter)
}
