use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facegate_core::{
    create_database, frame, recognize_face, AccessDecision, AccessPolicy, CosineMatcher, FaceDetector,
    FaceEngine, FaceRecognizer, Recognition,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod config;

use config::{Config, ReferenceConfig};

#[derive(Parser)]
#[command(name = "facegate", version, about = "Face verification access gate")]
struct Cli {
    /// TOML config file (default: $XDG_CONFIG_HOME/facegate/config.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Directory for aligned face chips
    #[arg(long, global = true)]
    work_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect and align the first face in an image and save the chip
    Align {
        image: PathBuf,
        /// Output file (default: <work-dir>/aligned_face.png)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List detected faces as JSON
    Detect { image: PathBuf },
    /// Check whether two images show the same person
    Verify {
        first: PathBuf,
        second: PathBuf,
        /// Cosine similarity threshold (default from config)
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// Recognise a probe image against reference faces and gate access
    Check {
        /// Image of the person requesting access
        #[arg(short, long)]
        probe: PathBuf,
        /// Reference face as NAME=IMAGE; replaces the configured references
        #[arg(short, long = "reference", value_parser = parse_reference)]
        references: Vec<ReferenceConfig>,
        /// Authorized name; replaces the configured allow-list
        #[arg(short, long = "allow")]
        allow: Vec<String>,
        /// Print a JSON report after the verdict
        #[arg(long)]
        json: bool,
    },
}

/// Parse `NAME=IMAGE`. The name ends at the first `=`.
fn parse_reference(raw: &str) -> Result<ReferenceConfig, String> {
    match raw.split_once('=') {
        Some((name, image)) if !name.trim().is_empty() && !image.is_empty() => Ok(ReferenceConfig {
            name: name.trim().to_string(),
            image: PathBuf::from(image),
        }),
        _ => Err(format!("expected NAME=IMAGE, got {raw:?}")),
    }
}

#[derive(Serialize)]
struct CheckReport<'a> {
    references: Vec<&'a str>,
    rejected: &'a [facegate_core::database::Rejected],
    recognition: Option<&'a Recognition>,
    decision: &'a AccessDecision,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.model_dir {
        config.model_dir = dir;
    }
    if let Some(dir) = cli.work_dir {
        config.work_dir = dir;
    }

    match cli.command {
        Commands::Align { image, output } => {
            let mut engine = build_engine(&config)?;
            let face = engine.preprocess_image(&image)?;
            let output = match output {
                Some(path) => path,
                None => {
                    std::fs::create_dir_all(&config.work_dir)
                        .with_context(|| format!("creating {}", config.work_dir.display()))?;
                    config.work_dir.join("aligned_face.png")
                }
            };
            frame::save_gray(&output, &face.chip.data, face.chip.size, face.chip.size)?;
            println!("{}", output.display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Detect { image } => {
            let mut engine = build_engine(&config)?;
            let faces = engine.detect_faces(&image)?;
            println!("{}", serde_json::to_string_pretty(&faces)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Verify {
            first,
            second,
            threshold,
        } => {
            let threshold = threshold.unwrap_or(config.similarity_threshold);
            let mut engine = build_engine(&config)?;
            let verification = engine.verify_pair(&first, &second, threshold)?;
            println!("{}", serde_json::to_string_pretty(&verification)?);
            Ok(if verification.verified {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }
        Commands::Check {
            probe,
            references,
            allow,
            json,
        } => {
            if !references.is_empty() {
                config.references = references;
            }
            if !allow.is_empty() {
                config.authorized = allow;
            }
            run_check(&config, &probe, json)
        }
    }
}

fn build_engine(config: &Config) -> Result<FaceEngine<FaceDetector, FaceRecognizer>> {
    let detector = FaceDetector::load(&config.detector_model_path(), config.detector_options())?;
    let recognizer = FaceRecognizer::load(&config.recognizer_model_path())?;
    Ok(FaceEngine::new(detector, recognizer, config.chip_size))
}

/// Build the reference database, recognise the probe, and print the verdict.
///
/// A probe without a usable face is denied.
fn run_check(config: &Config, probe: &Path, json: bool) -> Result<ExitCode> {
    let mut engine = build_engine(config)?;

    let (paths, names): (Vec<PathBuf>, Vec<String>) = config
        .references
        .iter()
        .map(|r| (r.image.clone(), r.name.clone()))
        .unzip();
    let db = create_database(&mut engine, &paths, &names, &config.work_dir)?;
    if db.is_empty() {
        tracing::warn!("no reference faces available; every probe will be denied");
    }

    let recognition = match engine.preprocess_image(probe) {
        Ok(face) => Some(recognize_face(
            &face,
            &db,
            &CosineMatcher,
            config.similarity_threshold,
            &config.work_dir,
        )),
        Err(e) => {
            eprintln!("Error: {e}");
            None
        }
    };

    let policy = AccessPolicy::new(config.authorized.iter().cloned());
    let decision = match &recognition {
        Some(r) => policy.decide(&r.identity),
        None => AccessDecision::Denied,
    };

    println!("{decision}");

    if json {
        let report = CheckReport {
            references: db.names(),
            rejected: db.rejected(),
            recognition: recognition.as_ref(),
            decision: &decision,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(if decision.is_granted() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_reference() {
        let r = parse_reference("Person 1=photos/a=b.jpg").unwrap();
        assert_eq!(r.name, "Person 1");
        assert_eq!(r.image, PathBuf::from("photos/a=b.jpg"));

        assert!(parse_reference("no-separator").is_err());
        assert!(parse_reference("=img.jpg").is_err());
        assert!(parse_reference("name=").is_err());
    }

    #[test]
    fn test_check_args() {
        let cli = Cli::try_parse_from([
            "facegate",
            "check",
            "--probe",
            "person2.jpg",
            "-r",
            "Person 1=person1.jpg",
            "--allow",
            "Person 1",
            "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::Check { probe, references, allow, json } => {
                assert_eq!(probe, PathBuf::from("person2.jpg"));
                assert_eq!(references.len(), 1);
                assert_eq!(references[0].name, "Person 1");
                assert_eq!(allow, vec!["Person 1".to_string()]);
                assert!(json);
            }
            _ => panic!("expected check command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "facegate", "verify", "a.jpg", "b.jpg", "--threshold", "0.5", "--model-dir", "/m",
        ])
        .unwrap();
        assert_eq!(cli.model_dir, Some(PathBuf::from("/m")));
        assert!(matches!(cli.command, Commands::Verify { threshold: Some(t), .. } if (t - 0.5).abs() < 1e-6));
    }
}
