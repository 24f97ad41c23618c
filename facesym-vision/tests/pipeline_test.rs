//! End-to-end checks against the real models.
//!
//! Needs the ONNX Runtime library, `models/` (see `facesym models`) and
//! `test_faces/` next to this crate, so these are ignored by default:
//! `cargo test -p facesym-vision -- --ignored`
use anyhow::Result;
use facesym_vision::{
    landmarks::LANDMARK_COUNT, DetectionOptions, LandmarkProvider, ModelPaths, Pipeline,
};
use image::GenericImageView;

const MODELS_DIR: &str = "models";
const FACE_IMAGE: &str = "test_faces/frontal.jpg";

fn pipeline() -> Result<Pipeline> {
    Pipeline::load(&ModelPaths::in_dir(MODELS_DIR), DetectionOptions::default())
}

#[test]
#[ignore]
fn test_pipeline_initialization() -> Result<()> {
    let _pipeline = pipeline()?;
    println!("✓ Pipeline initialized successfully");
    Ok(())
}

#[test]
#[ignore]
fn test_pipeline_load_is_all_or_nothing() {
    let err = Pipeline::load(
        &ModelPaths::in_dir("/nonexistent/facesym/models"),
        DetectionOptions::default(),
    )
    .err()
    .expect("loading from a missing directory must fail");
    assert!(format!("{err:#}").contains("detector"));
}

#[test]
#[ignore]
fn test_landmarks_inside_image() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut pipeline = pipeline()?;

    let img = image::open(FACE_IMAGE)?;
    let (w, h) = img.dimensions();
    let faces = pipeline.detect(&img)?;
    println!("Found {} face(s) in {} ({}x{})", faces.len(), FACE_IMAGE, w, h);
    assert!(!faces.is_empty());

    for pair in faces.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }

    let face = &faces[0];
    assert_eq!(face.landmarks.len(), LANDMARK_COUNT);
    for p in face.landmarks.iter() {
        assert!(p.x >= 0.0 && p.x <= w as f32);
        assert!(p.y >= 0.0 && p.y <= h as f32);
    }

    // jaw should run left to right across the detection box
    let jaw_left = face.landmarks.get(0).unwrap();
    let jaw_right = face.landmarks.get(16).unwrap();
    assert!(jaw_left.x < jaw_right.x);
    Ok(())
}

#[test]
#[ignore]
fn test_blank_image_has_no_faces() -> Result<()> {
    let mut pipeline = pipeline()?;
    let img = image::DynamicImage::new_rgb8(320, 240);
    assert!(pipeline.detect(&img)?.is_empty());
    Ok(())
}
