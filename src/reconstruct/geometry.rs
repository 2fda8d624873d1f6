//! Geometry normalisation: fractional page polygons → integer pixel rectangles.
//!
//! The Document Parse API reports every element as a polygon whose corners are
//! fractions of the page width/height. Cropping needs an axis-aligned
//! rectangle in the pixel grid of whatever raster the page was rendered to,
//! so the polygon is reduced to its min/max corners and scaled by the image
//! dimensions, flooring each edge.

use crate::error::Table2MdError;
use serde::{Deserialize, Serialize};

/// One polygon corner in fractional page coordinates (0..1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f64,
    pub y: f64,
}

impl NormalizedPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned crop region in image pixel coordinates.
///
/// Invariant: `x_min <= x_max <= width` and `y_min <= y_max <= height` of the
/// image the rectangle was computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> u32 {
        self.y_max - self.y_min
    }

    /// A rectangle with no area cannot be cropped or encoded.
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

impl std::fmt::Display for PixelRect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}) ~ ({}, {})",
            self.x_min, self.y_min, self.x_max, self.y_max
        )
    }
}

/// Convert a fractional polygon into a pixel rectangle for a `width × height` image.
///
/// Each edge is `floor(extreme * dimension)`. Coordinates are clamped into
/// `[0, 1]` first: the parser occasionally reports corners a hair outside the
/// page, and the rectangle must stay inside the image.
///
/// # Errors
/// [`Table2MdError::InvalidGeometry`] when the polygon has no points or any
/// coordinate is NaN/infinite.
pub fn to_pixel_rect(
    points: &[NormalizedPoint],
    width: u32,
    height: u32,
) -> Result<PixelRect, Table2MdError> {
    if points.is_empty() {
        return Err(Table2MdError::InvalidGeometry {
            reason: "bounding box has no points".to_string(),
        });
    }

    if let Some(bad) = points.iter().find(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(Table2MdError::InvalidGeometry {
            reason: format!("non-finite coordinate ({}, {})", bad.x, bad.y),
        });
    }

    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    Ok(PixelRect {
        x_min: scale(min_x, width),
        y_min: scale(min_y, height),
        x_max: scale(max_x, width),
        y_max: scale(max_y, height),
    })
}

fn scale(fraction: f64, dimension: u32) -> u32 {
    let px = (fraction.clamp(0.0, 1.0) * f64::from(dimension)).floor();
    // Clamped fraction keeps px within [0, dimension].
    (px as u32).min(dimension)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<NormalizedPoint> {
        vec![
            NormalizedPoint::new(x0, y0),
            NormalizedPoint::new(x1, y0),
            NormalizedPoint::new(x1, y1),
            NormalizedPoint::new(x0, y1),
        ]
    }

    #[test]
    fn scales_quad_to_pixels() {
        let rect = to_pixel_rect(&quad(0.1, 0.2, 0.5, 0.6), 1000, 2000).unwrap();
        assert_eq!(
            rect,
            PixelRect {
                x_min: 100,
                y_min: 400,
                x_max: 500,
                y_max: 1200
            }
        );
        assert_eq!(rect.width(), 400);
        assert_eq!(rect.height(), 800);
    }

    #[test]
    fn floors_fractional_pixels() {
        let rect = to_pixel_rect(&quad(0.3333, 0.25, 0.6667, 0.75), 100, 10).unwrap();
        assert_eq!((rect.x_min, rect.x_max), (33, 66));
        assert_eq!((rect.y_min, rect.y_max), (2, 7));
    }

    #[test]
    fn single_point_is_degenerate_but_valid() {
        let rect = to_pixel_rect(&[NormalizedPoint::new(0.5, 0.5)], 200, 100).unwrap();
        assert_eq!(rect.x_min, rect.x_max);
        assert!(rect.is_empty());
    }

    #[test]
    fn empty_polygon_is_invalid_geometry() {
        let err = to_pixel_rect(&[], 100, 100).unwrap_err();
        assert!(matches!(err, Table2MdError::InvalidGeometry { .. }));
    }

    #[test]
    fn nan_coordinate_is_invalid_geometry() {
        let err = to_pixel_rect(&[NormalizedPoint::new(f64::NAN, 0.1)], 100, 100).unwrap_err();
        assert!(matches!(err, Table2MdError::InvalidGeometry { .. }));
    }

    #[test]
    fn out_of_page_corners_are_clamped() {
        let rect = to_pixel_rect(&quad(-0.05, 0.9, 1.02, 1.5), 640, 480).unwrap();
        assert_eq!(rect.x_min, 0);
        assert_eq!(rect.x_max, 640);
        assert_eq!(rect.y_max, 480);
        assert!(rect.y_min <= rect.y_max);
    }

    #[test]
    fn stays_inside_image_for_many_boxes() {
        let (w, h) = (613, 797);
        for i in 0..=20 {
            for j in 0..=20 {
                let a = f64::from(i) / 20.0;
                let b = f64::from(j) / 20.0;
                let rect = to_pixel_rect(&quad(a, b, 1.0 - a, 1.0 - b), w, h).unwrap();
                assert!(rect.x_min <= rect.x_max && rect.x_max <= w);
                assert!(rect.y_min <= rect.y_max && rect.y_max <= h);
            }
        }
    }

    #[test]
    fn display_matches_log_format() {
        let rect = PixelRect {
            x_min: 1,
            y_min: 2,
            x_max: 3,
            y_max: 4,
        };
        assert_eq!(rect.to_string(), "(1, 2) ~ (3, 4)");
    }
}
