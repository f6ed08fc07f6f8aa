use anyhow::{bail, Context, Result};
use facegate_core::alignment::DEFAULT_CHIP_SIZE;
use facegate_core::access::DEFAULT_AUTHORIZED;
use facegate_core::DetectorOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// One `[[reference]]` entry: a person and the image to enroll them from.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReferenceConfig {
    pub name: String,
    pub image: PathBuf,
}

/// Run configuration: TOML file, then `FACEGATE_*` environment, then CLI flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Where aligned chips are written.
    pub work_dir: PathBuf,
    /// Side length of chips written to disk.
    pub chip_size: u32,
    /// Cosine similarity threshold for a positive match.
    pub similarity_threshold: f32,
    /// Minimum SCRFD score for a face.
    pub confidence_threshold: f32,
    /// Faces smaller than this (pixels) are ignored.
    pub min_face_size: f32,
    /// Names that are granted access.
    pub authorized: Vec<String>,
    #[serde(rename = "reference")]
    pub references: Vec<ReferenceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: facegate_core::default_model_dir(),
            work_dir: std::env::temp_dir().join("facegate"),
            chip_size: DEFAULT_CHIP_SIZE,
            similarity_threshold: 0.40,
            confidence_threshold: DetectorOptions::default().confidence_threshold,
            min_face_size: 0.0,
            authorized: DEFAULT_AUTHORIZED.iter().map(|s| s.to_string()).collect(),
            references: Vec::new(),
        }
    }
}

impl Config {
    /// Load from `path` (or the default location if it exists), then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = default_config_path();
                if default_path.is_file() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file. Relative reference images resolve against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: Config =
            toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;

        if let Some(base) = path.parent() {
            for reference in &mut config.references {
                if reference.image.is_relative() {
                    reference.image = base.join(&reference.image);
                }
            }
        }

        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Apply `FACEGATE_*` overrides. Unparseable values are ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FACEGATE_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEGATE_WORK_DIR") {
            self.work_dir = PathBuf::from(v);
        }
        override_parsed(&lookup, "FACEGATE_CHIP_SIZE", &mut self.chip_size);
        override_parsed(&lookup, "FACEGATE_SIMILARITY_THRESHOLD", &mut self.similarity_threshold);
        override_parsed(&lookup, "FACEGATE_CONFIDENCE_THRESHOLD", &mut self.confidence_threshold);
        override_parsed(&lookup, "FACEGATE_MIN_FACE_SIZE", &mut self.min_face_size);
        if let Some(v) = lookup("FACEGATE_AUTHORIZED") {
            self.authorized = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chip_size < 32 {
            bail!("chip_size must be at least 32, got {}", self.chip_size);
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            bail!(
                "similarity_threshold must be within [-1, 1], got {}",
                self.similarity_threshold
            );
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            bail!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            );
        }
        Ok(())
    }

    pub fn detector_options(&self) -> DetectorOptions {
        DetectorOptions {
            confidence_threshold: self.confidence_threshold,
            min_face_size: self.min_face_size,
            ..DetectorOptions::default()
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join(facegate_core::DETECTOR_MODEL_FILE)
    }

    /// Path to the ArcFace recognition model.
    pub fn recognizer_model_path(&self) -> PathBuf {
        self.model_dir.join(facegate_core::RECOGNIZER_MODEL_FILE)
    }
}

/// `$XDG_CONFIG_HOME/facegate/config.toml`, falling back to `~/.config`.
pub fn default_config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        })
        .join("facegate/config.toml")
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(v) => *slot = v,
            Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable override"),
        }
    }
}
