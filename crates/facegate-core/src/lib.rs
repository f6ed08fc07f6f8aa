//! facegate-core — Face detection, alignment, and verification engine.
//!
//! Uses SCRFD for face detection and ArcFace for face recognition,
//! both running via ONNX Runtime for CPU inference. On top of those sit the
//! single-run reference database and the allow-list access gate.

pub mod access;
pub mod alignment;
pub mod database;
pub mod detector;
pub mod engine;
pub mod frame;
pub mod recognition;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use access::{AccessDecision, AccessPolicy};
pub use alignment::AlignedChip;
pub use database::{create_database, FaceDatabase};
pub use detector::{Detect, DetectorOptions, FaceDetector};
pub use engine::{FaceEngine, PipelineError, PreparedFace, Verification};
pub use frame::Frame;
pub use recognition::{recognize_face, Identity, Recognition};
pub use recognizer::{Embed, FaceRecognizer};
pub use types::{BoundingBox, CosineMatcher, Embedding, MatchResult, Matcher, ReferenceFace};

/// SCRFD detection model file name.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

/// `$XDG_DATA_HOME/facegate/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    data_dir().join("models")
}

/// `$XDG_DATA_HOME/facegate`, falling back to `~/.local/share/facegate`.
pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facegate")
}
