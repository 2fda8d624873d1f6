//! Table reconstruction from OCR geometry.
//!
//! Pure, synchronous functions with no I/O; every pipeline stage that needs
//! geometry or row structure calls into here.
//!
//! ```text
//! RawWord ──▶ centroid ──▶ rows (y clustering) ──▶ sort by x ──▶ columns (x split) ──▶ "left || right"
//! ```
//!
//! 1. [`geometry`]: fractional polygons to pixel rectangles (used for cropping)
//! 2. [`rows`]: greedy single-pass clustering by centroid `y`
//! 3. [`columns`]: fixed-threshold two-column split
//! 4. [`assemble`]: composes the above into delimited row strings

pub mod assemble;
pub mod columns;
pub mod geometry;
pub mod rows;

pub use assemble::{assemble_rows, assemble_rows_with, RawWord, Vertex, COLUMN_DELIMITER};
pub use columns::{split_row, DEFAULT_X_SPLIT};
pub use geometry::{to_pixel_rect, NormalizedPoint, PixelRect};
pub use rows::{cluster_rows, cluster_rows_with, Row, RowAnchor, WordObservation, DEFAULT_Y_THRESHOLD};

use serde::{Deserialize, Serialize};

/// Thresholds for turning OCR words into rows.
///
/// Both distances are in the OCR response's pixel space, which is the crop
/// image's resolution, so they scale with the render DPI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconstructConfig {
    /// Maximum vertical distance from the row anchor. Default: 6.
    pub y_threshold: f64,
    /// Words left of this x go to the first column. Default: 80.
    pub x_split: f64,
    /// Anchor policy for row clustering. Default: [`RowAnchor::First`].
    pub anchor: RowAnchor,
}

impl Default for ReconstructConfig {
    fn default() -> Self {
        Self {
            y_threshold: DEFAULT_Y_THRESHOLD,
            x_split: DEFAULT_X_SPLIT,
            anchor: RowAnchor::First,
        }
    }
}
