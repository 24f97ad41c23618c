pub mod face;
pub mod landmarks;
pub mod model;
pub mod pipeline;
pub mod yunet;

// Re-export commonly used types
pub use face::DetectedFace;
pub use landmarks::{LandmarkSet, Point, LANDMARK_COUNT};
pub use model::ModelPaths;
pub use pipeline::{DetectionOptions, LandmarkProvider, Pipeline};
