//! Upload lifecycle.
//!
//! Each upload gets a generation number and its own worker thread. The
//! worker hands its result back over a one-shot channel, and only the
//! result for the latest generation is allowed to reach the display.

use anyhow::{Context, Result};
use facesym_vision::{DetectedFace, LandmarkProvider};
use image::{DynamicImage, GenericImageView};
use serde::Serialize;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crate::selection;
use crate::symmetry::{self, SymmetryScore};

/// Outcome of one upload.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub generation: u64,
    pub width: u32,
    pub height: u32,
    pub faces: Vec<DetectedFace>,
    /// `None` exactly when no face was found.
    pub score: Option<SymmetryScore>,
}

/// Detect, pick the first face, score it.
pub fn analyze<P>(provider: &mut P, image: &DynamicImage, generation: u64) -> Result<Analysis>
where
    P: LandmarkProvider + ?Sized,
{
    let (width, height) = image.dimensions();
    let faces = provider.detect(image)?;
    log::debug!("upload {}: {} face(s)", generation, faces.len());

    let score = match selection::first_face(&faces) {
        Some(face) => Some(symmetry::score(&face.landmarks).context("scoring face")?),
        None => None,
    };

    Ok(Analysis {
        generation,
        width,
        height,
        faces,
        score,
    })
}

/// What the user currently sees.
#[derive(Debug, Clone)]
pub enum DisplayState {
    Loading,
    Ready,
    Analyzing { generation: u64 },
    Done(Analysis),
    Failed { generation: u64, message: String },
}

enum ModelState<P> {
    Loading,
    Ready(Arc<Mutex<P>>),
}

/// An upload whose detection is still running.
pub struct PendingAnalysis {
    generation: u64,
    result: Receiver<Result<Analysis>>,
    worker: JoinHandle<()>,
}

impl PendingAnalysis {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

pub struct AnalysisSession<P> {
    models: ModelState<P>,
    generation: u64,
    display: DisplayState,
}

impl<P> AnalysisSession<P>
where
    P: LandmarkProvider + Send + 'static,
{
    /// Load the models. A failed load is logged and the session stays in
    /// the loading state for good.
    pub fn start<F>(loader: F) -> Self
    where
        F: FnOnce() -> Result<P>,
    {
        match loader() {
            Ok(provider) => {
                log::info!("models loaded");
                Self {
                    models: ModelState::Ready(Arc::new(Mutex::new(provider))),
                    generation: 0,
                    display: DisplayState::Ready,
                }
            }
            Err(e) => {
                log::error!("Error loading models: {:#}", e);
                Self {
                    models: ModelState::Loading,
                    generation: 0,
                    display: DisplayState::Loading,
                }
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.models, ModelState::Loading)
    }

    pub fn display(&self) -> &DisplayState {
        &self.display
    }

    /// Start analysing a new image. Any earlier upload still in flight
    /// becomes stale.
    pub fn upload(&mut self, image: DynamicImage) -> Result<PendingAnalysis> {
        let provider = match &self.models {
            ModelState::Ready(p) => Arc::clone(p),
            ModelState::Loading => anyhow::bail!("models are still loading"),
        };

        self.generation += 1;
        let generation = self.generation;
        self.display = DisplayState::Analyzing { generation };

        let (tx, rx) = mpsc::sync_channel(1);
        let worker = thread::Builder::new()
            .name(format!("facesym-upload-{generation}"))
            .spawn(move || {
                // providers keep no per-upload state, so a lock poisoned by
                // a panicked upload is still usable
                let mut guard = provider.lock().unwrap_or_else(PoisonError::into_inner);
                let result = analyze(&mut *guard, &image, generation);
                drop(guard);
                // receiver gone means the upload was abandoned
                let _ = tx.send(result);
            })
            .context("spawning detection worker")?;

        Ok(PendingAnalysis {
            generation,
            result: rx,
            worker,
        })
    }

    /// Wait for an upload and apply it to the display if it is still the
    /// latest one. Stale results are dropped and `None` is returned.
    pub fn complete(&mut self, pending: PendingAnalysis) -> Option<&DisplayState> {
        let PendingAnalysis {
            generation,
            result,
            worker,
        } = pending;

        let outcome = result
            .recv()
            .unwrap_or_else(|_| Err(anyhow::anyhow!("detection worker exited without a result")));
        if worker.join().is_err() {
            log::warn!("detection worker for upload {} panicked", generation);
        }

        if generation != self.generation {
            log::debug!(
                "dropping result of upload {} (latest is {})",
                generation,
                self.generation
            );
            return None;
        }

        self.display = match outcome {
            Ok(analysis) => DisplayState::Done(analysis),
            Err(e) => {
                log::warn!("upload {} failed: {:#}", generation, e);
                DisplayState::Failed {
                    generation,
                    message: format!("{e:#}"),
                }
            }
        };
        Some(&self.display)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facesym_vision::{LandmarkSet, Point, LANDMARK_COUNT};

    struct FakeProvider {
        faces: Vec<DetectedFace>,
    }

    impl LandmarkProvider for FakeProvider {
        fn detect(&mut self, _image: &DynamicImage) -> Result<Vec<DetectedFace>> {
            Ok(self.faces.clone())
        }
    }

    struct FailingProvider;

    impl LandmarkProvider for FailingProvider {
        fn detect(&mut self, _image: &DynamicImage) -> Result<Vec<DetectedFace>> {
            anyhow::bail!("detector exploded")
        }
    }

    /// Panics on its first call, then behaves.
    struct PanicOnceProvider {
        calls: usize,
    }

    impl LandmarkProvider for PanicOnceProvider {
        fn detect(&mut self, _image: &DynamicImage) -> Result<Vec<DetectedFace>> {
            self.calls += 1;
            if self.calls == 1 {
                panic!("detector crashed");
            }
            Ok(vec![offset_face(0.0)])
        }
    }

    /// Echoes the image width into the jaw pair so results can be told apart.
    struct WidthProvider;

    impl LandmarkProvider for WidthProvider {
        fn detect(&mut self, image: &DynamicImage) -> Result<Vec<DetectedFace>> {
            let mut points = vec![Point::new(0.0, 0.0); LANDMARK_COUNT];
            points[16] = Point::new(image.width() as f32, 0.0);
            Ok(vec![face_with(points)])
        }
    }

    fn face_with(points: Vec<Point>) -> DetectedFace {
        DetectedFace {
            bbox: [0.0, 0.0, 10.0, 10.0],
            score: 0.9,
            landmarks: LandmarkSet::new(points),
        }
    }

    fn offset_face(dx: f32) -> DetectedFace {
        let mut points = vec![Point::new(5.0, 5.0); LANDMARK_COUNT];
        points[16] = Point::new(5.0 + dx, 5.0);
        face_with(points)
    }

    fn image(width: u32) -> DynamicImage {
        DynamicImage::new_rgb8(width, 8)
    }

    #[test]
    fn analyze_scores_only_the_first_face() {
        let mut provider = FakeProvider {
            faces: vec![offset_face(30.0), offset_face(0.0), offset_face(90.0)],
        };
        let analysis = analyze(&mut provider, &image(16), 1).unwrap();
        assert_eq!(analysis.faces.len(), 3);
        assert_eq!(analysis.score.map(|s| s.value()), Some(70));
        assert_eq!((analysis.width, analysis.height), (16, 8));
    }

    #[test]
    fn analyze_without_faces_has_no_score() {
        let mut provider = FakeProvider { faces: vec![] };
        let analysis = analyze(&mut provider, &image(16), 1).unwrap();
        assert!(analysis.faces.is_empty());
        assert!(analysis.score.is_none());
    }

    #[test]
    fn analyze_short_landmarks_is_an_error() {
        let mut provider = FakeProvider {
            faces: vec![face_with(vec![Point::new(0.0, 0.0); 10])],
        };
        let err = analyze(&mut provider, &image(16), 1).unwrap_err();
        assert!(format!("{err:#}").contains("out of range"));
    }

    #[test]
    fn failed_load_stays_loading() {
        let mut session: AnalysisSession<FakeProvider> =
            AnalysisSession::start(|| anyhow::bail!("no such file"));
        assert!(session.is_loading());
        assert!(matches!(session.display(), DisplayState::Loading));

        let err = session.upload(image(4)).err().unwrap();
        assert!(err.to_string().contains("still loading"));
        assert!(matches!(session.display(), DisplayState::Loading));
    }

    #[test]
    fn upload_then_complete() {
        let mut session = AnalysisSession::start(|| {
            Ok(FakeProvider {
                faces: vec![offset_face(0.0)],
            })
        });
        assert!(matches!(session.display(), DisplayState::Ready));

        let pending = session.upload(image(4)).unwrap();
        assert_eq!(pending.generation(), 1);
        assert!(matches!(session.display(), DisplayState::Analyzing { generation: 1 }));

        match session.complete(pending) {
            Some(DisplayState::Done(a)) => assert_eq!(a.score.map(|s| s.value()), Some(100)),
            other => panic!("unexpected display: {other:?}"),
        }
    }

    #[test]
    fn stale_result_does_not_overwrite_newer_upload() {
        let mut session = AnalysisSession::start(|| Ok(WidthProvider));

        let first = session.upload(image(40)).unwrap();
        let second = session.upload(image(10)).unwrap();

        // newer upload lands first
        assert!(session.complete(second).is_some());
        assert!(session.complete(first).is_none());

        match session.display() {
            DisplayState::Done(a) => {
                assert_eq!(a.generation, 2);
                assert_eq!(a.score.map(|s| s.value()), Some(90));
            }
            other => panic!("unexpected display: {other:?}"),
        }
    }

    #[test]
    fn new_upload_clears_previous_score() {
        let mut session = AnalysisSession::start(|| Ok(WidthProvider));
        let first = session.upload(image(10)).unwrap();
        session.complete(first);
        assert!(matches!(session.display(), DisplayState::Done(_)));

        let _second = session.upload(image(20)).unwrap();
        assert!(matches!(session.display(), DisplayState::Analyzing { generation: 2 }));
    }

    #[test]
    fn provider_failure_is_shown_as_failed() {
        let mut session = AnalysisSession::start(|| Ok(FailingProvider));
        let pending = session.upload(image(4)).unwrap();
        match session.complete(pending) {
            Some(DisplayState::Failed {
                generation,
                message,
            }) => {
                assert_eq!(*generation, 1);
                assert!(message.contains("detector exploded"));
            }
            other => panic!("unexpected display: {other:?}"),
        }
    }

    #[test]
    fn panicked_upload_does_not_block_the_next_one() {
        let mut session = AnalysisSession::start(|| Ok(PanicOnceProvider { calls: 0 }));

        let first = session.upload(image(4)).unwrap();
        match session.complete(first) {
            Some(DisplayState::Failed { generation, .. }) => assert_eq!(*generation, 1),
            other => panic!("unexpected display: {other:?}"),
        }

        let second = session.upload(image(4)).unwrap();
        match session.complete(second) {
            Some(DisplayState::Done(a)) => {
                assert_eq!(a.generation, 2);
                assert_eq!(a.score.map(|s| s.value()), Some(100));
            }
            other => panic!("unexpected display: {other:?}"),
        }
    }
}
