//! In-memory reference database: one aligned face per person, held for a
//! single run.

use crate::detector::Detect;
use crate::engine::FaceEngine;
use crate::frame;
use crate::recognition::UNKNOWN_NAME;
use crate::recognizer::Embed;
use crate::types::ReferenceFace;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("cannot create working directory {path}: {source}")]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A reference image that did not make it into the database.
#[derive(Debug, Clone, Serialize)]
pub struct Rejected {
    pub name: String,
    pub image: PathBuf,
    pub reason: String,
}

/// Name → reference face mapping. Iteration follows first insertion order.
#[derive(Debug, Default)]
pub struct FaceDatabase {
    entries: Vec<ReferenceFace>,
    rejected: Vec<Rejected>,
}

impl FaceDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reference. An existing entry with the same name is replaced in place.
    pub fn insert(&mut self, reference: ReferenceFace) {
        match self.entries.iter_mut().find(|e| e.name == reference.name) {
            Some(existing) => {
                tracing::warn!(name = %reference.name, "replacing existing reference face");
                *existing = reference;
            }
            None => self.entries.push(reference),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ReferenceFace> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReferenceFace> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inputs skipped while building the database.
    pub fn rejected(&self) -> &[Rejected] {
        &self.rejected
    }
}

/// File-system friendly form of a person's name.
fn slug(name: &str) -> String {
    let s: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if s.is_empty() { "unnamed".to_string() } else { s }
}

/// Build the database from paired image paths and names.
///
/// Pairs are zipped, so surplus items in the longer list are dropped. Images
/// that are missing, unreadable, or contain no face are logged and skipped.
/// A chip that cannot be written is logged, but the reference is still added.
/// The name `Unknown` is reserved and always rejected.
pub fn create_database<D: Detect, E: Embed>(
    engine: &mut FaceEngine<D, E>,
    image_paths: &[PathBuf],
    names: &[String],
    work_dir: &Path,
) -> Result<FaceDatabase, DatabaseError> {
    std::fs::create_dir_all(work_dir).map_err(|source| DatabaseError::WorkDir {
        path: work_dir.to_path_buf(),
        source,
    })?;

    if image_paths.len() != names.len() {
        tracing::warn!(
            images = image_paths.len(),
            names = names.len(),
            "image and name counts differ; extra entries ignored"
        );
    }

    let mut db = FaceDatabase::new();
    let mut used_files: HashSet<String> = HashSet::new();

    for (image, name) in image_paths.iter().zip(names) {
        if name == UNKNOWN_NAME {
            tracing::error!(image = %image.display(), "reference name {UNKNOWN_NAME:?} is reserved; skipping");
            db.rejected.push(Rejected {
                name: name.clone(),
                image: image.clone(),
                reason: format!("name {UNKNOWN_NAME:?} is reserved for unrecognised faces"),
            });
            continue;
        }

        let prepared = match engine.preprocess_image(image) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(name = %name, image = %image.display(), error = %e, "skipping reference image");
                db.rejected.push(Rejected {
                    name: name.clone(),
                    image: image.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        // A name seen before keeps its file; a different name with the same slug gets a suffix.
        let chip_path = match db.get(name) {
            Some(existing) => existing.chip_path.clone(),
            None => {
                let base = slug(name);
                let mut file_name = format!("db_face_{base}.png");
                let mut n = 1;
                while !used_files.insert(file_name.clone()) {
                    n += 1;
                    file_name = format!("db_face_{base}_{n}.png");
                }
                work_dir.join(file_name)
            }
        };

        let chip = &prepared.chip;
        if let Err(e) = frame::save_gray(&chip_path, &chip.data, chip.size, chip.size) {
            tracing::error!(name = %name, error = %e, "failed to save reference chip");
        }

        tracing::info!(name = %name, chip = %chip_path.display(), "reference face added");

        db.insert(ReferenceFace {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.clone(),
            source: image.clone(),
            chip_path,
            embedding: prepared.embedding,
            created_at: chrono::Utc::now().to_rfc3339(),
        });
    }

    tracing::info!(
        references = db.len(),
        rejected = db.rejected.len(),
        "database ready"
    );

    Ok(db)
}
