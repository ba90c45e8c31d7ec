use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::error::InvalidBibNumber;

/// Shortest and longest digit string accepted as a bib number.
pub const MIN_DIGITS: usize = 1;
pub const MAX_DIGITS: usize = 3;

/// Weight of a two-digit reading; every other accepted length weighs 1.
pub const TWO_DIGIT_WEIGHT: u32 = 3;
pub const DEFAULT_WEIGHT: u32 = 1;

fn bib_pattern() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"^[0-9]{1,3}$").expect("invalid regex"))
}

/// Axis-aligned box in source image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f32 / self.height as f32
    }

    /// Grow the box by `fraction` of its own width/height on every side,
    /// then clamp it to a `bounds_width` x `bounds_height` image.
    pub fn expanded(&self, fraction: f32, bounds_width: u32, bounds_height: u32) -> Region {
        // Truncation matches integer pixel padding
        let pad_x = (self.width as f32 * fraction) as u32;
        let pad_y = (self.height as f32 * fraction) as u32;

        let start_x = self.x.saturating_sub(pad_x);
        let start_y = self.y.saturating_sub(pad_y);
        let end_x = (self.right() + pad_x).min(bounds_width);
        let end_y = (self.bottom() + pad_y).min(bounds_height);

        Region {
            x: start_x,
            y: start_y,
            width: end_x.saturating_sub(start_x),
            height: end_y.saturating_sub(start_y),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// One recognition attempt that survived digit filtering.
///
/// `digits` is always 1-3 ASCII decimal digits; the only constructor is
/// [`Reading::from_raw`], which enforces that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reading {
    digits: String,
    weight: u32,
}

impl Reading {
    /// Strip every non-digit from raw OCR output and turn what is left into a
    /// reading. Returns `None` when nothing or too much is left.
    pub fn from_raw(text: &str) -> Option<Reading> {
        let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() < MIN_DIGITS || digits.len() > MAX_DIGITS {
            return None;
        }

        let weight = if digits.len() == 2 {
            TWO_DIGIT_WEIGHT
        } else {
            DEFAULT_WEIGHT
        };

        Some(Reading { digits, weight })
    }

    pub fn digits(&self) -> &str {
        &self.digits
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }
}

/// A validated bib number, `^[0-9]{1,3}$`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BibNumber(String);

impl BibNumber {
    /// Validate operator input (or any other string) as a bib number.
    /// Surrounding whitespace is ignored.
    pub fn parse(input: &str) -> Result<BibNumber, InvalidBibNumber> {
        let trimmed = input.trim();
        if bib_pattern().is_match(trimmed) {
            Ok(BibNumber(trimmed.to_string()))
        } else {
            Err(InvalidBibNumber(input.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&Reading> for BibNumber {
    fn from(reading: &Reading) -> Self {
        BibNumber(reading.digits.clone())
    }
}

impl fmt::Display for BibNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_strips_non_digits_in_order() {
        let r = Reading::from_raw(" 4-2\n").unwrap();
        assert_eq!(r.digits(), "42");
    }

    #[test]
    fn two_digit_reading_weighs_three() {
        assert_eq!(Reading::from_raw("07").unwrap().weight(), 3);
        assert_eq!(Reading::from_raw("7").unwrap().weight(), 1);
        assert_eq!(Reading::from_raw("123").unwrap().weight(), 1);
    }

    #[test]
    fn reading_rejects_empty_and_long_output() {
        assert!(Reading::from_raw("").is_none());
        assert!(Reading::from_raw("abc").is_none());
        assert!(Reading::from_raw("1234").is_none());
        assert!(Reading::from_raw("12 34").is_none());
    }

    #[test]
    fn reading_ignores_non_ascii_digits() {
        // Superscripts and other unicode digits are not bib digits
        assert_eq!(Reading::from_raw("1²").unwrap().digits(), "1");
    }

    #[test]
    fn region_expansion_pads_ten_percent() {
        let r = Region::new(100, 100, 50, 40).expanded(0.1, 300, 300);
        assert_eq!(r, Region::new(95, 96, 60, 48));
    }

    #[test]
    fn region_expansion_clamps_to_image() {
        let r = Region::new(2, 1, 50, 40).expanded(0.1, 54, 42);
        assert_eq!(r, Region::new(0, 0, 54, 42));
    }

    #[test]
    fn bib_number_parse() {
        assert_eq!(BibNumber::parse("7").unwrap().as_str(), "7");
        assert_eq!(BibNumber::parse(" 123 ").unwrap().as_str(), "123");
        assert!(BibNumber::parse("").is_err());
        assert!(BibNumber::parse("1234").is_err());
        assert!(BibNumber::parse("12a").is_err());
        assert!(BibNumber::parse("-1").is_err());
    }
}
