use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Size of a rectangular structuring element, all cells set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelSize {
    pub width: u8,
    pub height: u8,
}

impl KernelSize {
    pub const fn new(width: u8, height: u8) -> Self {
        Self { width, height }
    }
}

/// Layout assumption handed to the OCR engine for one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageSegmentation {
    /// Treat the crop as a single line of text.
    SingleLine,
    /// Treat the crop as a single word.
    SingleWord,
}

impl PageSegmentation {
    /// Equivalent Tesseract `--psm` value.
    pub fn tesseract_psm(&self) -> u8 {
        match self {
            PageSegmentation::SingleLine => 7,
            PageSegmentation::SingleWord => 8,
        }
    }
}

/// One recognition pass: which characters the engine may emit and how it
/// should segment the crop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionProfile {
    pub name: String,
    pub segmentation: PageSegmentation,
    #[serde(default = "digit_whitelist")]
    pub char_whitelist: String,
}

fn digit_whitelist() -> String {
    "0123456789".to_string()
}

impl RecognitionProfile {
    pub fn new(name: impl Into<String>, segmentation: PageSegmentation) -> Self {
        Self {
            name: name.into(),
            segmentation,
            char_whitelist: digit_whitelist(),
        }
    }

    pub fn single_line() -> Self {
        Self::new("single-line", PageSegmentation::SingleLine)
    }

    pub fn single_word() -> Self {
        Self::new("single-word", PageSegmentation::SingleWord)
    }
}

/// Tunable constants of the detection pipeline.
///
/// The defaults were tuned on race photos shot in daylight with white bibs;
/// other capture setups usually only need `binary_threshold` adjusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Pixels at or above this intensity become white.
    pub binary_threshold: u8,
    /// Gaussian sigma of the pre-threshold smoothing (0.8 ~ a 3x3 kernel).
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    pub dilate_kernel: KernelSize,
    pub dilate_iterations: u32,
    pub close_kernel: KernelSize,
    pub close_iterations: u32,
    /// Largest contours kept for recognition.
    pub max_contours: usize,
    /// Boxes must be strictly wider / taller than these.
    pub min_region_width: u32,
    pub min_region_height: u32,
    pub min_aspect_ratio: f32,
    pub max_aspect_ratio: f32,
    /// Padding added on every side of a box, as a fraction of its size.
    pub region_expansion: f32,
    pub profiles: Vec<RecognitionProfile>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            binary_threshold: 115,
            blur_sigma: 0.8,
            canny_low: 100.0,
            canny_high: 200.0,
            dilate_kernel: KernelSize::new(3, 5),
            dilate_iterations: 2,
            close_kernel: KernelSize::new(5, 3),
            close_iterations: 2,
            max_contours: 10,
            min_region_width: 30,
            min_region_height: 20,
            min_aspect_ratio: 0.5,
            max_aspect_ratio: 4.0,
            region_expansion: 0.1,
            profiles: vec![
                RecognitionProfile::single_line(),
                RecognitionProfile::single_word(),
            ],
        }
    }
}

impl DetectorConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: DetectorConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        for kernel in [self.dilate_kernel, self.close_kernel] {
            if kernel.width == 0 || kernel.height == 0 {
                return invalid("structuring elements must be at least 1x1");
            }
        }
        if self.blur_sigma <= 0.0 {
            return invalid("blur_sigma must be positive");
        }
        if self.canny_low > self.canny_high {
            return invalid("canny_low must not exceed canny_high");
        }
        if self.min_aspect_ratio > self.max_aspect_ratio {
            return invalid("min_aspect_ratio must not exceed max_aspect_ratio");
        }
        if self.region_expansion < 0.0 {
            return invalid("region_expansion must not be negative");
        }
        if self.max_contours == 0 {
            return invalid("max_contours must be at least 1");
        }
        if self.profiles.is_empty() {
            return invalid("at least one recognition profile is required");
        }
        if self.profiles.iter().any(|p| p.char_whitelist.is_empty()) {
            return invalid("recognition profiles need a non-empty char_whitelist");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DetectorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.binary_threshold, 115);
        assert_eq!(config.profiles.len(), 2);
        assert_eq!(config.profiles[0].segmentation.tesseract_psm(), 7);
        assert_eq!(config.profiles[1].segmentation.tesseract_psm(), 8);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config =
            DetectorConfig::from_toml_str("binary_threshold = 140\nmax_contours = 5\n").unwrap();
        assert_eq!(config.binary_threshold, 140);
        assert_eq!(config.max_contours, 5);
        assert_eq!(config.min_region_width, 30);
        assert_eq!(config.dilate_kernel, KernelSize::new(3, 5));
    }

    #[test]
    fn toml_profiles_replace_defaults() {
        let toml = r#"
            [[profiles]]
            name = "word-only"
            segmentation = "single-word"
        "#;
        let config = DetectorConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.profiles.len(), 1);
        assert_eq!(config.profiles[0].segmentation, PageSegmentation::SingleWord);
        assert_eq!(config.profiles[0].char_whitelist, "0123456789");
    }

    #[test]
    fn rejects_inverted_aspect_bounds() {
        let err = DetectorConfig::from_toml_str("min_aspect_ratio = 5.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_empty_profile_list() {
        let err = DetectorConfig::from_toml_str("profiles = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unparseable_toml() {
        let err = DetectorConfig::from_toml_str("binary_threshold = \"high\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
