use bibtag::{RecognitionBackend, RecognitionError, RecognitionProfile};
use image::{DynamicImage, GrayImage, ImageBuffer, Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use tempfile::TempDir;

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
pub const BACKGROUND: Rgb<u8> = Rgb([30, 30, 30]);

/// A solid image of one color.
pub fn solid_image(width: u32, height: u32, color: Rgb<u8>) -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, color))
}

/// Dark photo with white rectangles ("bibs") at the given positions.
pub fn image_with_bibs(width: u32, height: u32, bibs: &[(i32, i32, u32, u32)]) -> RgbImage {
    let mut img = ImageBuffer::from_pixel(width, height, BACKGROUND);
    for &(x, y, w, h) in bibs {
        draw_filled_rect_mut(&mut img, Rect::at(x, y).of_size(w, h), WHITE);
    }
    img
}

/// 320x240 photo with a 120x80 white bib (aspect 1.5) printed with a blocky "07".
pub fn bib_07_image() -> DynamicImage {
    let mut img = image_with_bibs(320, 240, &[(100, 80, 120, 80)]);

    // "0": outline of a 35x50 box, 6px strokes
    draw_filled_rect_mut(&mut img, Rect::at(120, 95).of_size(35, 6), BLACK);
    draw_filled_rect_mut(&mut img, Rect::at(120, 139).of_size(35, 6), BLACK);
    draw_filled_rect_mut(&mut img, Rect::at(120, 95).of_size(6, 50), BLACK);
    draw_filled_rect_mut(&mut img, Rect::at(149, 95).of_size(6, 50), BLACK);

    // "7": top bar and right stem
    draw_filled_rect_mut(&mut img, Rect::at(170, 95).of_size(35, 6), BLACK);
    draw_filled_rect_mut(&mut img, Rect::at(199, 95).of_size(6, 50), BLACK);

    DynamicImage::ImageRgb8(img)
}

/// Stands in for OCR: answers "07" for any crop holding both ink and paper,
/// and nothing for blank crops.
pub struct StubRecognizer;

impl RecognitionBackend for StubRecognizer {
    fn recognize(
        &self,
        crop: &GrayImage,
        _profile: &RecognitionProfile,
    ) -> Result<String, RecognitionError> {
        let has_ink = crop.pixels().any(|p| p[0] == 0);
        let has_paper = crop.pixels().any(|p| p[0] == 255);
        Ok(if has_ink && has_paper { "07".to_string() } else { String::new() })
    }

    fn name(&self) -> &str {
        "stub"
    }
}

/// Reads `large` on crops at least `min_width` wide and `small` on the rest.
pub struct SizeRecognizer {
    pub min_width: u32,
    pub large: &'static str,
    pub small: &'static str,
}

impl RecognitionBackend for SizeRecognizer {
    fn recognize(
        &self,
        crop: &GrayImage,
        _profile: &RecognitionProfile,
    ) -> Result<String, RecognitionError> {
        let text = if crop.width() >= self.min_width { self.large } else { self.small };
        Ok(text.to_string())
    }

    fn name(&self) -> &str {
        "size"
    }
}

/// Writes `img` as a PNG inside `dir` and returns its path.
pub fn write_png(dir: &TempDir, name: &str, img: &DynamicImage) -> std::path::PathBuf {
    let path = dir.path().join(name);
    img.save_with_format(&path, image::ImageFormat::Png)
        .expect("Failed to save test image");
    path
}
