//! ArcFace face recognizer via ONNX Runtime.
//!
//! Extracts 512-dimensional face embeddings from aligned face crops,
//! using the w600k_r50 ArcFace model.

use crate::alignment::{self, AlignedChip, RECOGNIZER_CHIP_SIZE};
use crate::frame::{self, Frame};
use crate::types::{BoundingBox, Embedding};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ARCFACE_INPUT_SIZE: usize = RECOGNIZER_CHIP_SIZE as usize;
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // symmetric, unlike SCRFD
const ARCFACE_EMBEDDING_DIM: usize = 512;
const ARCFACE_MODEL_VERSION: &str = "w600k_r50";

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0} — download w600k_r50.onnx from insightface and place it in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face has no landmarks — detector must return landmarks for alignment")]
    NoLandmarks,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Anything that can turn a detected face into an embedding.
pub trait Embed {
    /// Align `face` within `frame` and embed it.
    fn extract(&mut self, frame: &Frame, face: &BoundingBox) -> Result<Embedding, RecognizerError> {
        let landmarks = face.landmarks.as_ref().ok_or(RecognizerError::NoLandmarks)?;
        let chip = alignment::align_face(frame, landmarks, RECOGNIZER_CHIP_SIZE);
        self.embed_chip(&chip)
    }

    /// Embed an already aligned chip of any size.
    fn embed_chip(&mut self, chip: &AlignedChip) -> Result<Embedding, RecognizerError>;
}

/// ArcFace-based face recognizer.
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.is_file() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Convert a 112×112 grayscale chip into a NCHW float tensor.
    fn preprocess(aligned_face: &[u8]) -> Array4<f32> {
        let size = ARCFACE_INPUT_SIZE;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        for y in 0..size {
            for x in 0..size {
                let pixel = aligned_face.get(y * size + x).copied().unwrap_or(0) as f32;
                let normalized = (pixel - ARCFACE_MEAN) / ARCFACE_STD;
                tensor[[0, 0, y, x]] = normalized;
                tensor[[0, 1, y, x]] = normalized;
                tensor[[0, 2, y, x]] = normalized;
            }
        }

        tensor
    }
}

impl Embed for FaceRecognizer {
    fn embed_chip(&mut self, chip: &AlignedChip) -> Result<Embedding, RecognizerError> {
        let input = if chip.size as usize == ARCFACE_INPUT_SIZE {
            Self::preprocess(&chip.data)
        } else {
            let side = chip.size as usize;
            let resized = frame::resize_bilinear(&chip.data, side, side, ARCFACE_INPUT_SIZE, ARCFACE_INPUT_SIZE);
            Self::preprocess(&resized)
        };

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw_data.len() != ARCFACE_EMBEDDING_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
                raw_data.len()
            )));
        }

        Ok(Embedding {
            values: l2_normalize(raw_data.to_vec()),
            model_version: Some(ARCFACE_MODEL_VERSION.to_string()),
        })
    }
}

/// Scale to unit length. Zero vectors are returned unchanged.
pub fn l2_normalize(mut values: Vec<f32>) -> Vec<f32> {
    let norm = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter_mut().for_each(|v| *v /= norm);
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_output_shape() {
        let aligned = vec![128u8; ARCFACE_INPUT_SIZE * ARCFACE_INPUT_SIZE];
        let tensor = FaceRecognizer::preprocess(&aligned);
        assert_eq!(tensor.shape(), &[1, 3, ARCFACE_INPUT_SIZE, ARCFACE_INPUT_SIZE]);
    }

    #[test]
    fn test_preprocess_normalization() {
        let aligned = vec![128u8; ARCFACE_INPUT_SIZE * ARCFACE_INPUT_SIZE];
        let tensor = FaceRecognizer::preprocess(&aligned);
        let expected = (128.0 - ARCFACE_MEAN) / ARCFACE_STD;
        assert!((tensor[[0, 0, 0, 0]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_channels_identical() {
        let aligned: Vec<u8> = (0..ARCFACE_INPUT_SIZE * ARCFACE_INPUT_SIZE)
            .map(|i| (i % 251) as u8)
            .collect();
        let tensor = FaceRecognizer::preprocess(&aligned);
        for y in (0..ARCFACE_INPUT_SIZE).step_by(7) {
            for x in (0..ARCFACE_INPUT_SIZE).step_by(5) {
                assert_eq!(tensor[[0, 0, y, x]], tensor[[0, 1, y, x]]);
                assert_eq!(tensor[[0, 1, y, x]], tensor[[0, 2, y, x]]);
            }
        }
    }

    #[test]
    fn test_preprocess_short_buffer_pads_black() {
        let tensor = FaceRecognizer::preprocess(&[]);
        assert!((tensor[[0, 0, 5, 5]] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    struct CountingEmbedder {
        sizes: Vec<u32>,
    }

    impl Embed for CountingEmbedder {
        fn embed_chip(&mut self, chip: &AlignedChip) -> Result<Embedding, RecognizerError> {
            self.sizes.push(chip.size);
            Ok(Embedding { values: vec![1.0], model_version: None })
        }
    }

    #[test]
    fn test_extract_requires_landmarks() {
        let frame = Frame::from_gray(vec![0u8; 16], 4, 4).unwrap();
        let face = BoundingBox {
            x: 0.0, y: 0.0, width: 4.0, height: 4.0,
            confidence: 0.9, landmarks: None,
        };
        let mut embedder = CountingEmbedder { sizes: Vec::new() };
        let err = embedder.extract(&frame, &face).err().unwrap();
        assert!(matches!(err, RecognizerError::NoLandmarks));
        assert!(embedder.sizes.is_empty());
    }

    #[test]
    fn test_extract_aligns_to_recognizer_size() {
        let frame = Frame::from_gray(vec![90u8; 200 * 200], 200, 200).unwrap();
        let face = BoundingBox {
            x: 50.0, y: 40.0, width: 100.0, height: 100.0,
            confidence: 0.9, landmarks: Some(alignment::REFERENCE_LANDMARKS_112),
        };
        let mut embedder = CountingEmbedder { sizes: Vec::new() };
        embedder.extract(&frame, &face).unwrap();
        assert_eq!(embedder.sizes, vec![RECOGNIZER_CHIP_SIZE]);
    }

    #[test]
    fn test_load_missing_model() {
        let err = FaceRecognizer::load(Path::new("/nonexistent/w600k_r50.onnx")).err().unwrap();
        assert!(matches!(err, RecognizerError::ModelNotFound(_)));
    }
}
