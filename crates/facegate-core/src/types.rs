use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Cosine similarity in [-1, 1]. Higher = more similar.
    ///
    /// A zero vector on either side yields 0.0.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Cosine distance (1 - similarity), in [0, 2].
    pub fn cosine_distance(&self, other: &Embedding) -> f32 {
        1.0 - self.similarity(other)
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One person's reference face in the in-memory database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceFace {
    pub id: String,
    pub name: String,
    /// Image the reference was extracted from.
    pub source: PathBuf,
    /// Aligned chip written to the working directory.
    pub chip_path: PathBuf,
    pub embedding: Embedding,
    pub created_at: String,
}

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub matched: bool,
    /// Cosine similarity of the best match [-1, 1].
    pub similarity: f32,
    /// ID of the matched reference (if any).
    pub reference_id: Option<String>,
    /// Name of the matched person (if any).
    pub name: Option<String>,
}

impl MatchResult {
    pub fn no_match() -> Self {
        Self {
            matched: false,
            similarity: 0.0,
            reference_id: None,
            name: None,
        }
    }
}

/// Strategy for comparing a probe embedding against a gallery of references.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &[&ReferenceFace], threshold: f32) -> MatchResult;
}

/// Cosine similarity matcher.
///
/// Always scores every gallery entry and keeps the best one. Ties keep the
/// earlier entry.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[&ReferenceFace], threshold: f32) -> MatchResult {
        let mut best_sim = f32::NEG_INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, reference) in gallery.iter().enumerate() {
            let sim = probe.similarity(&reference.embedding);
            tracing::debug!(name = %reference.name, similarity = sim, "scored reference");
            if sim > best_sim {
                best_sim = sim;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_sim >= threshold => MatchResult {
                matched: true,
                similarity: best_sim,
                reference_id: Some(gallery[idx].id.clone()),
                name: Some(gallery[idx].name.clone()),
            },
            Some(_) => MatchResult {
                similarity: best_sim,
                ..MatchResult::no_match()
            },
            None => MatchResult::no_match(),
        }
    }
}
