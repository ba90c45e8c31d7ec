use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use image::{DynamicImage, GrayImage};
use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use rten::Model;
use serde::Serialize;
use tracing::debug;

use crate::config::{DetectorConfig, PageSegmentation, RecognitionProfile};
use crate::detection::preprocessing::binarize;
use crate::error::RecognitionError;
use crate::models::{Reading, Region};

/// Abstraction over an OCR engine.
///
/// Implementations receive the re-thresholded crop of one region and return
/// the raw text for one profile; digit filtering happens afterwards.
pub trait RecognitionBackend: Send + Sync {
    fn recognize(
        &self,
        crop: &GrayImage,
        profile: &RecognitionProfile,
    ) -> Result<String, RecognitionError>;

    fn name(&self) -> &str;
}

/// Raw output of one profile on one region.
#[derive(Debug, Clone, Serialize)]
pub struct PassOutput {
    pub profile: String,
    pub text: String,
}

/// Everything recognition produced for one region.
#[derive(Debug, Clone, Serialize)]
pub struct RegionResult {
    pub region: Region,
    pub passes: Vec<PassOutput>,
    pub readings: Vec<Reading>,
    #[serde(skip)]
    pub crop: GrayImage,
}

/// Crop `blurred` to `region` and re-apply the global threshold.
pub fn extract_region(blurred: &GrayImage, region: &Region, threshold: u8) -> GrayImage {
    let crop = image::imageops::crop_imm(blurred, region.x, region.y, region.width, region.height)
        .to_image();
    binarize(&crop, threshold)
}

/// Run every configured profile over one region.
///
/// Outputs that do not reduce to 1-3 digits are kept in `passes` but produce
/// no reading. A backend error aborts the region.
pub fn recognize_region(
    backend: &dyn RecognitionBackend,
    blurred: &GrayImage,
    region: &Region,
    config: &DetectorConfig,
) -> Result<RegionResult, RecognitionError> {
    let crop = extract_region(blurred, region, config.binary_threshold);

    let mut passes = Vec::with_capacity(config.profiles.len());
    let mut readings = Vec::new();

    for profile in &config.profiles {
        let text = backend.recognize(&crop, profile)?;
        match Reading::from_raw(&text) {
            Some(reading) => {
                debug!(
                    profile = %profile.name,
                    digits = reading.digits(),
                    weight = reading.weight(),
                    "reading"
                );
                readings.push(reading);
            }
            None => debug!(profile = %profile.name, raw = %text.trim(), "discarded OCR output"),
        }
        passes.push(PassOutput {
            profile: profile.name.clone(),
            text,
        });
    }

    Ok(RegionResult {
        region: *region,
        passes,
        readings,
        crop,
    })
}

fn engine_error(e: impl fmt::Display) -> RecognitionError {
    RecognitionError::Engine(e.to_string())
}

/// Text with the most ASCII digits; the earliest one wins a tie.
fn most_digits(texts: impl IntoIterator<Item = String>) -> String {
    let mut best: Option<(usize, String)> = None;
    for text in texts {
        let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
        if best.as_ref().is_none_or(|(most, _)| digits > *most) {
            best = Some((digits, text));
        }
    }
    best.map(|(_, text)| text).unwrap_or_default()
}

/// Recognizer backed by the `ocrs` engine.
///
/// Models are loaded on first use. One engine is kept per distinct
/// character whitelist, since `ocrs` fixes the allowed characters at
/// construction time.
pub struct OcrsRecognizer {
    model_dir: PathBuf,
    // Arc so the lock can be released before running OCR
    engines: Mutex<HashMap<String, Arc<OcrEngine>>>,
}

impl OcrsRecognizer {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            engines: Mutex::new(HashMap::new()),
        }
    }

    /// Standard cache location used by `ocrs-cli`: `$HOME/.cache/ocrs`.
    pub fn default_model_dir() -> Option<PathBuf> {
        let home_dir = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .ok()?;
        Some(Path::new(&home_dir).join(".cache/ocrs"))
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    fn model_paths(&self) -> (PathBuf, PathBuf) {
        (
            self.model_dir.join("text-detection.rten"),
            self.model_dir.join("text-recognition.rten"),
        )
    }

    /// Fail early when the model files are missing.
    pub fn check_models(&self) -> Result<(), RecognitionError> {
        let (detection, recognition) = self.model_paths();
        if !detection.exists() || !recognition.exists() {
            return Err(RecognitionError::ModelsNotFound {
                detection,
                recognition,
            });
        }
        Ok(())
    }

    fn load_engine(&self, whitelist: &str) -> Result<OcrEngine, RecognitionError> {
        self.check_models()?;
        let (detection_path, recognition_path) = self.model_paths();

        let detection_model = Model::load_file(&detection_path)
            .map_err(|e| RecognitionError::ModelLoad(e.to_string()))?;
        let recognition_model = Model::load_file(&recognition_path)
            .map_err(|e| RecognitionError::ModelLoad(e.to_string()))?;

        OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            allowed_chars: Some(whitelist.to_string()),
            ..Default::default()
        })
        .map_err(engine_error)
    }

    fn engine_for(&self, whitelist: &str) -> Result<Arc<OcrEngine>, RecognitionError> {
        let mut engines = self.engines.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(engine) = engines.get(whitelist) {
            return Ok(engine.clone());
        }

        debug!(model_dir = %self.model_dir.display(), whitelist, "initializing OCR engine");
        let engine = Arc::new(self.load_engine(whitelist)?);
        engines.insert(whitelist.to_string(), engine.clone());
        Ok(engine)
    }
}

impl RecognitionBackend for OcrsRecognizer {
    fn recognize(
        &self,
        crop: &GrayImage,
        profile: &RecognitionProfile,
    ) -> Result<String, RecognitionError> {
        let engine = self.engine_for(&profile.char_whitelist)?;

        // The engine wants RGB8 input
        let img = DynamicImage::ImageLuma8(crop.clone()).to_rgb8();
        let img_source =
            ImageSource::from_bytes(img.as_raw(), img.dimensions()).map_err(engine_error)?;
        let ocr_input = engine.prepare_input(img_source).map_err(engine_error)?;

        match profile.segmentation {
            PageSegmentation::SingleLine => engine.get_text(&ocr_input).map_err(engine_error),
            PageSegmentation::SingleWord => {
                // Recognize each detected word on its own and keep the one
                // carrying the most digits
                let words = engine.detect_words(&ocr_input).map_err(engine_error)?;
                let lines: Vec<Vec<_>> = words.into_iter().map(|word| vec![word]).collect();
                let texts = engine
                    .recognize_text(&ocr_input, &lines)
                    .map_err(engine_error)?
                    .into_iter()
                    .flatten()
                    .map(|line| line.to_string());
                Ok(most_digits(texts))
            }
        }
    }

    fn name(&self) -> &str {
        "ocrs"
    }
}

/// Returns preset text, optionally per profile name.
///
/// Lets the pipeline be tested without any OCR models installed.
pub struct MockRecognizer {
    text: String,
    by_profile: HashMap<String, String>,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            by_profile: HashMap::new(),
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A recognizer whose every call fails with an engine error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new("")
        }
    }

    /// Answer `text` for the profile called `profile` instead of the default.
    pub fn with_profile_text(
        mut self,
        profile: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.by_profile.insert(profile.into(), text.into());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RecognitionBackend for MockRecognizer {
    fn recognize(
        &self,
        _crop: &GrayImage,
        profile: &RecognitionProfile,
    ) -> Result<String, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(RecognitionError::Engine(message.clone()));
        }
        Ok(self
            .by_profile
            .get(&profile.name)
            .unwrap_or(&self.text)
            .clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// Tesseract backend, gated behind the `tesseract` feature

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use std::io::Cursor;

    use image::{DynamicImage, GrayImage};
    use leptess::{LepTess, Variable};

    use super::RecognitionBackend;
    use crate::config::RecognitionProfile;
    use crate::error::RecognitionError;

    pub struct TesseractRecognizer {
        data_path: Option<String>,
        lang: String,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<String>, lang: &str) -> Self {
            Self {
                data_path,
                lang: lang.to_string(),
            }
        }
    }

    impl RecognitionBackend for TesseractRecognizer {
        fn recognize(
            &self,
            crop: &GrayImage,
            profile: &RecognitionProfile,
        ) -> Result<String, RecognitionError> {
            let mut png = Vec::new();
            DynamicImage::ImageLuma8(crop.clone())
                .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
                .map_err(|e| RecognitionError::Encode(e.to_string()))?;

            let mut lt = LepTess::new(self.data_path.as_deref(), &self.lang)
                .map_err(|e| RecognitionError::Engine(e.to_string()))?;
            lt.set_variable(
                Variable::TesseditPagesegMode,
                &profile.segmentation.tesseract_psm().to_string(),
            )
            .map_err(|e| RecognitionError::Engine(e.to_string()))?;
            lt.set_variable(Variable::TesseditCharWhitelist, &profile.char_whitelist)
                .map_err(|e| RecognitionError::Engine(e.to_string()))?;
            lt.set_image_from_mem(&png)
                .map_err(|e| RecognitionError::Encode(e.to_string()))?;
            lt.get_utf8_text()
                .map_err(|e| RecognitionError::Engine(e.to_string()))
        }

        fn name(&self) -> &str {
            "tesseract"
        }
    }
}
