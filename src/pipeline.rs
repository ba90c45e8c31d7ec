use std::path::{Path, PathBuf};

use anyhow::Result;
use image::GrayImage;

use crate::detection::ocr::RegionResult;
use crate::detection::voting::{self, Tally};
use crate::error::DetectionError;
use crate::models::{Reading, Region};
use crate::DetectionOutcome;

/// Intermediate artifacts of one detection run
#[derive(Debug, Clone)]
pub struct DetectionTrace {
    pub grayscale: GrayImage,
    pub blurred: GrayImage,
    pub mask: GrayImage,
    /// One entry per proposed region, in area rank order
    pub regions: Vec<RegionResult>,
    pub tally: Tally,
}

impl DetectionTrace {
    pub fn proposed_regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter().map(|r| &r.region)
    }

    pub fn readings(&self) -> impl Iterator<Item = &Reading> {
        self.regions.iter().flat_map(|r| r.readings.iter())
    }

    /// Final answer for this trace.
    pub fn outcome(&self) -> DetectionOutcome {
        if self.regions.is_empty() {
            return DetectionOutcome::NotDetected(DetectionError::NoCandidateRegion);
        }
        match voting::winner(&self.tally) {
            Some(number) => DetectionOutcome::Detected(number),
            None => DetectionOutcome::NotDetected(DetectionError::NoReading),
        }
    }

    /// Save every intermediate image under `debug.output_dir/<name>/`.
    pub fn save_debug_images(&self, debug: &DebugConfig, name: &str) -> Result<PathBuf> {
        let dir = debug.output_dir.join(name);
        std::fs::create_dir_all(&dir)?;

        save_gray(&self.grayscale, &dir.join("00_grayscale.png"))?;
        save_gray(&self.blurred, &dir.join("01_blurred.png"))?;
        save_gray(&self.mask, &dir.join("02_mask.png"))?;

        if !self.regions.is_empty() {
            let region_dir = dir.join("03_regions");
            std::fs::create_dir_all(&region_dir)?;
            for (idx, result) in self.regions.iter().enumerate() {
                let filename = format!("{:02}.png", idx + 1);
                save_gray(&result.crop, &region_dir.join(&filename))?;
            }
        }

        Ok(dir)
    }
}

fn save_gray(img: &GrayImage, path: &Path) -> Result<()> {
    img.save(path)
        .map_err(|e| anyhow::anyhow!("Failed to save debug image {}: {}", path.display(), e))
}

/// Where debug images go
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

impl DebugConfig {
    /// The directory must be empty or non-existent
    pub fn new(output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        Ok(Self { output_dir })
    }
}
