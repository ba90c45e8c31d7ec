use image::{DynamicImage, GrayImage, Luma, Rgb};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::map::map_colors;
use imageproc::morphology::{Mask, grayscale_dilate, grayscale_erode};

use crate::config::{DetectorConfig, KernelSize};

/// Output of the preprocessing stage.
///
/// `blurred` is kept because regions are re-thresholded from it, not from the
/// edge mask.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub grayscale: GrayImage,
    pub blurred: GrayImage,
    pub mask: GrayImage,
}

/// Convert image to grayscale with BT.601 luma weights
/// (0.299 R + 0.587 G + 0.114 B), rounded to nearest.
///
/// The default threshold is tuned against these weights, so the image
/// crate's Rec.709 `to_luma8` is not used here.
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    map_colors(&img.to_rgb8(), |Rgb([r, g, b])| Luma([bt601_luma(r, g, b)]))
}

// Fixed point with 14 fractional bits; the weights sum to 1 << 14
fn bt601_luma(r: u8, g: u8, b: u8) -> u8 {
    const R: u32 = 4899;
    const G: u32 = 9617;
    const B: u32 = 1868;
    let y = (R * r as u32 + G * g as u32 + B * b as u32 + (1 << 13)) >> 14;
    y.min(255) as u8
}

/// Apply Gaussian blur to reduce noise
pub fn apply_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    gaussian_blur_f32(img, sigma)
}

/// Global fixed threshold: `>= threshold` becomes 255, everything else 0.
pub fn binarize(img: &GrayImage, threshold: u8) -> GrayImage {
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        pixel[0] = if pixel[0] >= threshold { 255 } else { 0 };
    }
    out
}

/// Detect edges using Canny edge detector
pub fn detect_edges(img: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    canny(img, low_threshold, high_threshold)
}

fn rect_mask(kernel: KernelSize) -> Mask {
    let cells = GrayImage::from_pixel(kernel.width as u32, kernel.height as u32, Luma([255u8]));
    Mask::from_image(&cells, kernel.width / 2, kernel.height / 2)
}

/// Dilate with a full rectangular structuring element, `iterations` times.
pub fn dilate_rect(img: &GrayImage, kernel: KernelSize, iterations: u32) -> GrayImage {
    let mask = rect_mask(kernel);
    let mut out = img.clone();
    for _ in 0..iterations {
        out = grayscale_dilate(&out, &mask);
    }
    out
}

/// Morphological close: `iterations` dilations followed by as many erosions.
pub fn close_rect(img: &GrayImage, kernel: KernelSize, iterations: u32) -> GrayImage {
    let mask = rect_mask(kernel);
    let mut out = img.clone();
    for _ in 0..iterations {
        out = grayscale_dilate(&out, &mask);
    }
    for _ in 0..iterations {
        out = grayscale_erode(&out, &mask);
    }
    out
}

/// Run the full preprocessing chain on a color (or gray) image.
pub fn preprocess(img: &DynamicImage, config: &DetectorConfig) -> Preprocessed {
    let grayscale = to_grayscale(img);
    let blurred = apply_blur(&grayscale, config.blur_sigma);
    let binary = binarize(&blurred, config.binary_threshold);
    let edges = detect_edges(&binary, config.canny_low, config.canny_high);
    let dilated = dilate_rect(&edges, config.dilate_kernel, config.dilate_iterations);
    let mask = close_rect(&dilated, config.close_kernel, config.close_iterations);

    Preprocessed {
        grayscale,
        blurred,
        mask,
    }
}
