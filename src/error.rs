use std::path::PathBuf;

use thiserror::Error;

/// Why an image produced no bib number.
///
/// The detector never surfaces these as `Err`; they travel inside
/// [`DetectionOutcome::NotDetected`](crate::DetectionOutcome) so callers and
/// tests can tell the causes apart.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    #[error("input image has zero extent ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("no candidate region passed the size and aspect filters")]
    NoCandidateRegion,
    #[error("no recognition pass produced a 1-3 digit reading")]
    NoReading,
    #[error("recognition failed: {0}")]
    Recognition(#[from] RecognitionError),
    #[error("pipeline aborted: {0}")]
    Internal(String),
}

/// Failures of a recognition backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecognitionError {
    #[error(
        "OCR models not found. Please run: ocrs-cli --help (or download models manually)\n\
         Expected locations:\n  - {}\n  - {}",
        .detection.display(),
        .recognition.display()
    )]
    ModelsNotFound {
        detection: PathBuf,
        recognition: PathBuf,
    },
    #[error("failed to load OCR model: {0}")]
    ModelLoad(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("failed to encode region for OCR: {0}")]
    Encode(String),
    #[error("backend not available: {0}")]
    NotAvailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("bib number must be 1-3 decimal digits, got {0:?}")]
pub struct InvalidBibNumber(pub String);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
