pub mod contours;
pub mod ocr;
pub mod preprocessing;
pub mod voting;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;

use image::DynamicImage;
use tracing::{debug, warn};

use crate::config::DetectorConfig;
use crate::error::DetectionError;
use crate::models::BibNumber;
use crate::pipeline::DetectionTrace;
use ocr::RecognitionBackend;
use voting::Tally;

/// Result of running the detector on one image.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionOutcome {
    Detected(BibNumber),
    /// Nothing confident was found; the caller should ask for manual entry.
    NotDetected(DetectionError),
}

impl DetectionOutcome {
    pub fn number(&self) -> Option<&BibNumber> {
        match self {
            DetectionOutcome::Detected(number) => Some(number),
            DetectionOutcome::NotDetected(_) => None,
        }
    }

    pub fn diagnostic(&self) -> Option<&DetectionError> {
        match self {
            DetectionOutcome::Detected(_) => None,
            DetectionOutcome::NotDetected(err) => Some(err),
        }
    }

    pub fn is_detected(&self) -> bool {
        matches!(self, DetectionOutcome::Detected(_))
    }
}

/// Bib number detector: preprocess, propose regions, recognize, vote.
///
/// Holds only configuration and the recognition backend; every call works on
/// its own buffers, so one detector can serve many images concurrently.
pub struct BibDetector {
    config: DetectorConfig,
    backend: Box<dyn RecognitionBackend>,
}

impl BibDetector {
    pub fn new(config: DetectorConfig, backend: impl RecognitionBackend + 'static) -> Self {
        Self::with_backend(config, Box::new(backend))
    }

    pub fn with_backend(config: DetectorConfig, backend: Box<dyn RecognitionBackend>) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn backend(&self) -> &dyn RecognitionBackend {
        self.backend.as_ref()
    }

    /// Run every stage and keep the intermediate results.
    pub fn trace(&self, img: &DynamicImage) -> Result<DetectionTrace, DetectionError> {
        let (width, height) = (img.width(), img.height());
        if width == 0 || height == 0 {
            return Err(DetectionError::EmptyImage { width, height });
        }

        let pre = preprocessing::preprocess(img, &self.config);

        let regions = contours::propose_regions(&pre.mask, &self.config);
        debug!(width, height, regions = regions.len(), "proposed regions");

        let mut results = Vec::with_capacity(regions.len());
        for region in &regions {
            let result = ocr::recognize_region(self.backend(), &pre.blurred, region, &self.config)?;
            results.push(result);
        }

        let tally = Tally::from_readings(results.iter().flat_map(|r| r.readings.iter()));
        debug!(candidates = tally.len(), "tally built");

        Ok(DetectionTrace {
            grayscale: pre.grayscale,
            blurred: pre.blurred,
            mask: pre.mask,
            regions: results,
            tally,
        })
    }

    /// Detect the bib number in a decoded image. Never fails: every problem
    /// becomes [`DetectionOutcome::NotDetected`] with its cause.
    pub fn detect(&self, img: &DynamicImage) -> DetectionOutcome {
        let traced = catch_unwind(AssertUnwindSafe(|| self.trace(img)))
            .unwrap_or_else(|panic| Err(DetectionError::Internal(panic_message(panic.as_ref()))));

        let outcome = match traced {
            Ok(trace) => trace.outcome(),
            Err(err) => DetectionOutcome::NotDetected(err),
        };

        match &outcome {
            DetectionOutcome::Detected(number) => debug!(%number, "detected"),
            DetectionOutcome::NotDetected(
                err @ (DetectionError::NoCandidateRegion | DetectionError::NoReading),
            ) => debug!(reason = %err, "not detected"),
            DetectionOutcome::NotDetected(err) => warn!(error = %err, "detection failed"),
        }
        outcome
    }

    /// Decode encoded image bytes (PNG, JPEG, ...) and detect.
    pub fn detect_bytes(&self, data: &[u8]) -> DetectionOutcome {
        match image::load_from_memory(data) {
            Ok(img) => self.detect(&img),
            Err(e) => {
                warn!(error = %e, "failed to decode image");
                DetectionOutcome::NotDetected(DetectionError::Decode(e.to_string()))
            }
        }
    }

    pub fn detect_path(&self, path: &Path) -> DetectionOutcome {
        match image::open(path) {
            Ok(img) => self.detect(&img),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to open image");
                DetectionOutcome::NotDetected(DetectionError::Decode(e.to_string()))
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
