//! Match a probe face against the reference database.

use crate::database::FaceDatabase;
use crate::engine::PreparedFace;
use crate::frame;
use crate::types::{Matcher, ReferenceFace};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// File name of the probe chip inside the working directory.
pub const PROBE_CHIP_FILE: &str = "probe_face.png";

/// Printed for an unrecognised probe; no reference may use it as a name.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Who the probe was recognised as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum Identity {
    Known(String),
    Unknown,
}

impl Identity {
    pub fn name(&self) -> Option<&str> {
        match self {
            Identity::Known(name) => Some(name),
            Identity::Unknown => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Known(name) => f.write_str(name),
            Identity::Unknown => f.write_str(UNKNOWN_NAME),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Recognition {
    pub identity: Identity,
    /// Best similarity seen, 0.0 when nothing was compared.
    pub similarity: f32,
    pub threshold: f32,
    /// Number of references actually compared.
    pub compared: usize,
    /// Where the probe chip was written, if that succeeded.
    pub probe_chip: Option<PathBuf>,
}

impl Recognition {
    fn unknown(threshold: f32) -> Self {
        Self {
            identity: Identity::Unknown,
            similarity: 0.0,
            threshold,
            compared: 0,
            probe_chip: None,
        }
    }
}

/// Recognise `face` against every reference in `db`.
///
/// The probe chip is written to `work_dir` first; if that fails the probe is
/// `Unknown`. References whose chip file has disappeared are skipped.
pub fn recognize_face(
    face: &PreparedFace,
    db: &FaceDatabase,
    matcher: &dyn Matcher,
    threshold: f32,
    work_dir: &Path,
) -> Recognition {
    let probe_path = work_dir.join(PROBE_CHIP_FILE);
    if let Err(e) = frame::save_gray(&probe_path, &face.chip.data, face.chip.size, face.chip.size) {
        tracing::error!(error = %e, "failed to save probe chip");
        return Recognition::unknown(threshold);
    }

    let gallery: Vec<&ReferenceFace> = db
        .iter()
        .filter(|reference| {
            let present = reference.chip_path.is_file();
            if !present {
                tracing::error!(
                    name = %reference.name,
                    chip = %reference.chip_path.display(),
                    "reference chip no longer exists; skipping"
                );
            }
            present
        })
        .collect();

    let result = matcher.compare(&face.embedding, &gallery, threshold);
    let identity = match result.name {
        Some(name) if result.matched => Identity::Known(name),
        _ => Identity::Unknown,
    };

    tracing::info!(
        identity = %identity,
        similarity = result.similarity,
        threshold,
        compared = gallery.len(),
        "recognition finished"
    );

    Recognition {
        identity,
        similarity: result.similarity,
        threshold,
        compared: gallery.len(),
        probe_chip: Some(probe_path),
    }
}
