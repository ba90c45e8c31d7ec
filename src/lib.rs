pub mod batch;
pub mod config;
pub mod detection;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod session;

pub use config::{DetectorConfig, KernelSize, PageSegmentation, RecognitionProfile};
pub use detection::ocr::{MockRecognizer, OcrsRecognizer, RecognitionBackend};
pub use detection::voting::Tally;
pub use detection::{BibDetector, DetectionOutcome};
pub use error::{ConfigError, DetectionError, InvalidBibNumber, RecognitionError};
pub use models::{BibNumber, Reading, Region};
pub use pipeline::{DebugConfig, DetectionTrace};
pub use session::{LabelSession, LabeledImage, labeled_file_name};

#[cfg(feature = "tesseract")]
pub use detection::ocr::tesseract_backend::TesseractRecognizer;
