//! Row clustering: group OCR words into visual text lines by vertical position.
//!
//! Words are sorted by centroid `y` and walked once. A word joins the open
//! row when it lies within `y_threshold` of the row's anchor; otherwise the
//! row is closed and the word starts a new one.
//!
//! With [`RowAnchor::First`] the anchor is the first word of the row and never
//! moves, so a tall or slightly skewed line can be split in two when its
//! lower words drift more than `y_threshold` below the first one. That is a
//! known limitation of the heuristic and is kept as-is; [`RowAnchor::Previous`]
//! is available for layouts where chained drift is the lesser evil.

use serde::{Deserialize, Serialize};

/// Default vertical merge distance, in OCR pixel units.
pub const DEFAULT_Y_THRESHOLD: f64 = 6.0;

/// One recognised token reduced to its centroid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordObservation {
    pub text: String,
    pub x: f64,
    pub y: f64,
}

impl WordObservation {
    pub fn new(text: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            text: text.into(),
            x,
            y,
        }
    }
}

/// Words judged to share a text line, in the order they were clustered.
pub type Row = Vec<WordObservation>;

/// Which word a row's vertical anchor follows while the row is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RowAnchor {
    /// Anchor fixed to the row's first word. (default)
    #[default]
    First,
    /// Anchor moves to every word that joins the row.
    Previous,
}

/// Cluster words into rows with the fixed first-word anchor.
///
/// Rows come out top-to-bottom. Words inside a row keep the order of the
/// global `y` sort, which is not left-to-right; callers sort by `x` before
/// splitting columns.
pub fn cluster_rows(words: Vec<WordObservation>, y_threshold: f64) -> Vec<Row> {
    cluster_rows_with(words, y_threshold, RowAnchor::First)
}

/// Cluster words into rows with an explicit anchor policy.
pub fn cluster_rows_with(
    mut words: Vec<WordObservation>,
    y_threshold: f64,
    anchor: RowAnchor,
) -> Vec<Row> {
    // Stable: words with equal y keep their input order.
    words.sort_by(|a, b| a.y.total_cmp(&b.y));

    let mut rows: Vec<Row> = Vec::new();
    let mut current: Row = Vec::new();
    let mut anchor_y = f64::NAN;

    for word in words {
        if current.is_empty() {
            anchor_y = word.y;
            current.push(word);
            continue;
        }

        if (word.y - anchor_y).abs() <= y_threshold {
            if anchor == RowAnchor::Previous {
                anchor_y = word.y;
            }
            current.push(word);
        } else {
            anchor_y = word.y;
            rows.push(std::mem::replace(&mut current, vec![word]));
        }
    }

    if !current.is_empty() {
        rows.push(current);
    }

    rows
}
