//! Human and JSON readouts of the display state.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::session::DisplayState;

/// One line of text for the current display.
pub fn render_text(state: &DisplayState) -> String {
    match state {
        DisplayState::Loading => "Loading models...".to_string(),
        DisplayState::Ready => "Ready".to_string(),
        DisplayState::Analyzing { .. } => "Analyzing...".to_string(),
        DisplayState::Done(analysis) => match analysis.score {
            Some(score) => format!("Symmetry Score: {}", score),
            None => "No face detected".to_string(),
        },
        DisplayState::Failed { message, .. } => format!("Analysis failed: {}", message),
    }
}

/// Machine-readable result for one image.
#[derive(Debug, Serialize)]
pub struct ImageReport {
    pub image: PathBuf,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub faces: usize,
    pub score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay: Option<PathBuf>,
}

impl ImageReport {
    pub fn new(image: &Path, state: &DisplayState) -> Self {
        let mut report = Self {
            image: image.to_path_buf(),
            width: None,
            height: None,
            faces: 0,
            score: None,
            error: None,
            overlay: None,
        };
        match state {
            DisplayState::Done(a) => {
                report.width = Some(a.width);
                report.height = Some(a.height);
                report.faces = a.faces.len();
                report.score = a.score.map(|s| s.value());
            }
            DisplayState::Failed { message, .. } => report.error = Some(message.clone()),
            other => report.error = Some(render_text(other)),
        }
        report
    }

    /// Report for an image that never made it into the session.
    pub fn failed(image: &Path, error: &anyhow::Error) -> Self {
        Self {
            image: image.to_path_buf(),
            width: None,
            height: None,
            faces: 0,
            score: None,
            error: Some(format!("{error:#}")),
            overlay: None,
        }
    }
}
