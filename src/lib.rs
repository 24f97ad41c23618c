pub mod config;
pub mod overlay;
pub mod report;
pub mod selection;
pub mod session;
pub mod symmetry;

// Re-export vision types for convenience
pub use facesym_vision::{
    face, model, DetectedFace, LandmarkProvider, LandmarkSet, ModelPaths, Pipeline, Point,
};
pub use session::{Analysis, AnalysisSession, DisplayState};
pub use symmetry::{SymmetryError, SymmetryScore};
