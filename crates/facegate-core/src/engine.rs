//! Pipeline steps shared by every command: load an image, find the first
//! face, align it, and embed it.

use crate::alignment::{self, AlignedChip};
use crate::detector::{Detect, DetectorError};
use crate::frame::{Frame, FrameError};
use crate::recognizer::{Embed, RecognizerError};
use crate::types::{BoundingBox, Embedding};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("no face detected in {0}")]
    NoFaceDetected(PathBuf),
}

/// A face found in an image, aligned and embedded.
pub struct PreparedFace {
    pub source: PathBuf,
    pub face: BoundingBox,
    /// Aligned chip at the engine's chip size.
    pub chip: AlignedChip,
    pub embedding: Embedding,
}

/// Outcome of comparing the first face of two images.
#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    pub verified: bool,
    pub similarity: f32,
    pub distance: f32,
    pub threshold: f32,
    pub model: Option<String>,
}

/// Detector + recognizer pair driving every pipeline step.
pub struct FaceEngine<D, E> {
    detector: D,
    recognizer: E,
    chip_size: u32,
}

impl<D: Detect, E: Embed> FaceEngine<D, E> {
    pub fn new(detector: D, recognizer: E, chip_size: u32) -> Self {
        Self {
            detector,
            recognizer,
            chip_size,
        }
    }

    pub fn chip_size(&self) -> u32 {
        self.chip_size
    }

    /// Every face in the image, highest confidence first.
    pub fn detect_faces(&mut self, path: &Path) -> Result<Vec<BoundingBox>, PipelineError> {
        let frame = Frame::open(path)?;
        Ok(self.detector.detect(&frame)?)
    }

    /// Load `path`, take its first face, and align and embed it.
    ///
    /// Additional faces in the same image are ignored.
    pub fn preprocess_image(&mut self, path: &Path) -> Result<PreparedFace, PipelineError> {
        let frame = Frame::open(path)?;
        if frame.is_dark() {
            tracing::warn!(
                path = %path.display(),
                brightness = frame.avg_brightness(),
                "image is very dark; detection may fail"
            );
        }

        let faces = self.detector.detect(&frame)?;
        let face = faces
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::NoFaceDetected(path.to_path_buf()))?;
        let landmarks = face.landmarks.ok_or(RecognizerError::NoLandmarks)?;

        let chip = alignment::align_face(&frame, &landmarks, self.chip_size);
        let embedding = self.recognizer.extract(&frame, &face)?;

        tracing::info!(
            path = %path.display(),
            confidence = face.confidence,
            chip_size = chip.size,
            "face aligned"
        );

        Ok(PreparedFace {
            source: path.to_path_buf(),
            face,
            chip,
            embedding,
        })
    }

    /// Compare the first face of two images.
    pub fn verify_pair(
        &mut self,
        first: &Path,
        second: &Path,
        threshold: f32,
    ) -> Result<Verification, PipelineError> {
        let a = self.preprocess_image(first)?;
        let b = self.preprocess_image(second)?;
        Ok(verify_embeddings(&a.embedding, &b.embedding, threshold))
    }
}

/// Same/different decision for two embeddings. The threshold is inclusive.
pub fn verify_embeddings(a: &Embedding, b: &Embedding, threshold: f32) -> Verification {
    let similarity = a.similarity(b);
    Verification {
        verified: similarity >= threshold,
        similarity,
        distance: 1.0 - similarity,
        threshold,
        model: a.model_version.clone(),
    }
}
