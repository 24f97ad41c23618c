//! YuNet face detector output decoding.
//!
//! The 2023mar model emits 12 tensors, four heads at each stride (8, 16, 32):
//! `cls_8, cls_16, cls_32, obj_8, obj_16, obj_32, bbox_8, bbox_16, bbox_32,
//! kps_8, kps_16, kps_32`, each shaped `[1, H*W, C]` with C = 1, 1, 4, 10.
//!
//! Decoding is anchor-free. For grid cell (row, col) at a given stride:
//! cx = (col + dx) * stride, cy = (row + dy) * stride,
//! w = exp(dw) * stride, h = exp(dh) * stride.
//! Everything here is in pixels of the square network input. The five
//! coarse keypoints are not decoded; the landmark model replaces them.

use anyhow::Result;
use ndarray::Array2;

pub const STRIDES: [usize; 3] = [8, 16, 32];

#[derive(Debug, Clone)]
pub struct RawDetection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
}

/// Per-stride head outputs, each row one grid cell.
#[derive(Debug)]
pub struct YunetHeads {
    pub scores: Vec<Array2<f32>>,
    pub bboxes: Vec<Array2<f32>>,
}

fn cells(input_size: usize, stride: usize) -> usize {
    let side = input_size / stride;
    side * side
}

/// Pull one head (three strides) out of the flat output list.
fn take_head(
    outputs: &[(&[i64], &[f32])],
    first: usize,
    width: usize,
    name: &str,
    input_size: usize,
) -> Result<Vec<Array2<f32>>> {
    let mut head = Vec::with_capacity(STRIDES.len());
    for (k, &stride) in STRIDES.iter().enumerate() {
        let idx = first + k;
        let Some((shape, data)) = outputs.get(idx) else {
            anyhow::bail!("missing {name} output at index {idx}");
        };
        let expected = cells(input_size, stride);
        if shape.len() != 3 || shape[0] != 1 || shape[2] as usize != width {
            anyhow::bail!(
                "unexpected {name} shape at index {idx}: {shape:?}, expected [1, {expected}, {width}]"
            );
        }
        if shape[1] as usize != expected {
            anyhow::bail!(
                "{name} at stride {stride} has {} cells, expected {expected}",
                shape[1]
            );
        }
        head.push(Array2::from_shape_vec((expected, width), data.to_vec())?);
    }
    Ok(head)
}

/// Split the 12 raw YuNet outputs into per-stride heads.
///
/// The returned scores are already the final confidence:
/// `sqrt(clamp(cls) * clamp(obj))`.
pub fn parse_outputs(outputs: &[(&[i64], &[f32])], input_size: usize) -> Result<YunetHeads> {
    let cls = take_head(outputs, 0, 1, "cls", input_size)?;
    let obj = take_head(outputs, 3, 1, "obj", input_size)?;
    let bboxes = take_head(outputs, 6, 4, "bbox", input_size)?;

    let scores = cls
        .iter()
        .zip(obj.iter())
        .map(|(c, o)| {
            let mut s = c.mapv(|v| v.clamp(0.0, 1.0)) * o.mapv(|v| v.clamp(0.0, 1.0));
            s.mapv_inplace(f32::sqrt);
            s
        })
        .collect();

    Ok(YunetHeads { scores, bboxes })
}

/// Decode every grid cell whose confidence reaches `score_threshold`.
pub fn decode(
    heads: &YunetHeads,
    score_threshold: f32,
    input_size: usize,
) -> Result<Vec<RawDetection>> {
    if heads.scores.len() != STRIDES.len() || heads.bboxes.len() != STRIDES.len() {
        anyhow::bail!("expected {} strides per head", STRIDES.len());
    }

    let mut detections = Vec::new();

    for (s, &stride) in STRIDES.iter().enumerate() {
        let side = input_size / stride;
        let scores = &heads.scores[s];
        let bboxes = &heads.bboxes[s];

        if scores.nrows() != side * side {
            anyhow::bail!(
                "stride {stride}: expected {} cells, got {}",
                side * side,
                scores.nrows()
            );
        }

        let step = stride as f32;
        for row in 0..side {
            for col in 0..side {
                let idx = row * side + col;
                let score = scores[[idx, 0]];
                if score < score_threshold {
                    continue;
                }

                let cx = (col as f32 + bboxes[[idx, 0]]) * step;
                let cy = (row as f32 + bboxes[[idx, 1]]) * step;
                let w = bboxes[[idx, 2]].exp() * step;
                let h = bboxes[[idx, 3]].exp() * step;
                if !(cx.is_finite() && cy.is_finite() && w.is_finite() && h.is_finite()) {
                    continue;
                }

                detections.push(RawDetection {
                    bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
                    score,
                });
            }
        }
    }

    Ok(detections)
}
