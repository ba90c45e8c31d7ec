use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};
use imageproc::point::Point;

use crate::config::DetectorConfig;
use crate::models::Region;

/// Outer boundary of one blob in the mask.
#[derive(Debug, Clone)]
pub struct ExternalContour {
    pub bounds: Region,
    /// Polygon area enclosed by the boundary pixels.
    pub area: f64,
}

fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area: i64 = 0;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        twice_area += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    (twice_area as f64 / 2.0).abs()
}

fn bounding_box(points: &[Point<i32>]) -> Option<Region> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(Region::new(
        min_x as u32,
        min_y as u32,
        (max_x - min_x + 1) as u32,
        (max_y - min_y + 1) as u32,
    ))
}

/// Outermost contours of the white blobs in `mask`, largest area first.
///
/// Contours nested inside a hole of another blob are ignored. Equal areas
/// keep their discovery order (raster order of the first boundary pixel).
pub fn find_external_contours(mask: &GrayImage) -> Vec<ExternalContour> {
    let mut contours: Vec<ExternalContour> = find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .filter_map(|c| {
            let bounds = bounding_box(&c.points)?;
            Some(ExternalContour {
                bounds,
                area: polygon_area(&c.points),
            })
        })
        .collect();

    // Stable, so ties keep discovery order
    contours.sort_by(|a, b| b.area.total_cmp(&a.area));
    contours
}

/// Whether a raw bounding box looks like a printed bib number.
pub fn is_plausible_bib(bounds: &Region, config: &DetectorConfig) -> bool {
    if bounds.width <= config.min_region_width || bounds.height <= config.min_region_height {
        return false;
    }
    let aspect = bounds.aspect_ratio();
    aspect >= config.min_aspect_ratio && aspect <= config.max_aspect_ratio
}

/// Propose candidate regions from the preprocessed mask.
///
/// Only the `max_contours` largest contours are considered; boxes failing the
/// size/aspect filter are dropped. Survivors are padded by
/// `region_expansion` and clamped to the mask extent, in area rank order.
pub fn propose_regions(mask: &GrayImage, config: &DetectorConfig) -> Vec<Region> {
    let (width, height) = mask.dimensions();

    find_external_contours(mask)
        .into_iter()
        .take(config.max_contours)
        .map(|c| c.bounds)
        .filter(|bounds| is_plausible_bib(bounds, config))
        .map(|bounds| bounds.expanded(config.region_expansion, width, height))
        .filter(|region| !region.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn mask_with_boxes(width: u32, height: u32, boxes: &[Region]) -> GrayImage {
        let mut mask = GrayImage::new(width, height);
        for b in boxes {
            for y in b.y..b.bottom() {
                for x in b.x..b.right() {
                    mask.put_pixel(x, y, Luma([255]));
                }
            }
        }
        mask
    }

    #[test]
    fn empty_mask_has_no_regions() {
        let mask = GrayImage::new(100, 100);
        assert!(propose_regions(&mask, &DetectorConfig::default()).is_empty());
    }

    #[test]
    fn single_box_is_expanded_and_kept() {
        let mask = mask_with_boxes(300, 300, &[Region::new(100, 100, 50, 40)]);
        let regions = propose_regions(&mask, &DetectorConfig::default());
        assert_eq!(regions, vec![Region::new(95, 96, 60, 48)]);
    }

    #[test]
    fn size_filter_is_strict() {
        // Exactly 30 wide is rejected, 31 accepted
        let mask = mask_with_boxes(
            200,
            200,
            &[Region::new(10, 10, 30, 25), Region::new(100, 100, 31, 25)],
        );
        let regions = propose_regions(&mask, &DetectorConfig::default());
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].x, 97);
    }

    #[test]
    fn aspect_filter_drops_slivers() {
        // 200x30 has aspect 6.67; 40x100 has aspect 0.4
        let mask = mask_with_boxes(
            400,
            300,
            &[Region::new(10, 10, 200, 30), Region::new(300, 100, 40, 100)],
        );
        assert!(propose_regions(&mask, &DetectorConfig::default()).is_empty());
    }

    #[test]
    fn aspect_bounds_are_inclusive() {
        let kept = |b: Region| {
            let mask = mask_with_boxes(300, 200, &[b]);
            propose_regions(&mask, &DetectorConfig::default()).len()
        };
        // 124/31 = 4.0 and 40/80 = 0.5
        assert_eq!(kept(Region::new(50, 50, 124, 31)), 1);
        assert_eq!(kept(Region::new(50, 50, 40, 80)), 1);
    }

    #[test]
    fn height_filter_is_strict() {
        let kept = |b: Region| {
            let mask = mask_with_boxes(200, 200, &[b]);
            propose_regions(&mask, &DetectorConfig::default()).len()
        };
        assert_eq!(kept(Region::new(50, 50, 40, 20)), 0);
        assert_eq!(kept(Region::new(50, 50, 40, 21)), 1);
    }

    #[test]
    fn regions_ordered_by_area() {
        let mask = mask_with_boxes(
            400,
            200,
            &[Region::new(10, 10, 40, 30), Region::new(100, 50, 120, 80)],
        );
        let regions = propose_regions(&mask, &DetectorConfig::default());
        assert_eq!(regions.len(), 2);
        assert!(regions[0].width > regions[1].width);
    }

    #[test]
    fn max_contours_caps_candidates() {
        let boxes: Vec<Region> = (0..4).map(|i| Region::new(10 + i * 60, 10, 40, 30)).collect();
        let mask = mask_with_boxes(300, 60, &boxes);
        let config = DetectorConfig {
            max_contours: 2,
            ..DetectorConfig::default()
        };
        assert_eq!(propose_regions(&mask, &config).len(), 2);
    }

    #[test]
    fn nested_blob_is_not_external() {
        // Ring with a blob inside its hole
        let mut mask = mask_with_boxes(200, 200, &[Region::new(20, 20, 120, 100)]);
        for y in 30..110 {
            for x in 30..130 {
                mask.put_pixel(x, y, Luma([0]));
            }
        }
        for y in 50..90 {
            for x in 50..110 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let contours = find_external_contours(&mask);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].bounds, Region::new(20, 20, 120, 100));
    }

    #[test]
    fn polygon_area_of_square_boundary() {
        let pts = vec![Point::new(0, 0), Point::new(4, 0), Point::new(4, 4), Point::new(0, 4)];
        assert_eq!(polygon_area(&pts), 16.0);
    }
}
