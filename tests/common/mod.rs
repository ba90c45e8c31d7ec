mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from bibtag for tests
pub use bibtag::{
    BibDetector, BibNumber, DetectionError, DetectionOutcome, DetectorConfig, MockRecognizer,
    RecognitionBackend, RecognitionError, RecognitionProfile, Region,
};
