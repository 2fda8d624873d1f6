//! Table text assembly: raw OCR words → `"left || right"` row strings.

use super::columns::split_row;
use super::rows::{cluster_rows_with, WordObservation};
use super::ReconstructConfig;
use crate::error::Table2MdError;
use serde::{Deserialize, Serialize};

/// Separator between the two columns of an assembled row.
pub const COLUMN_DELIMITER: &str = " || ";

/// A bounding-polygon corner in OCR pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
}

/// A recognised word with its bounding polygon.
///
/// Constructed through [`RawWord::new`], which guarantees at least one vertex
/// so the centroid is always defined.
#[derive(Debug, Clone, PartialEq)]
pub struct RawWord {
    text: String,
    vertices: Vec<Vertex>,
}

impl RawWord {
    /// # Errors
    /// [`Table2MdError::InvalidOcrResponse`] when `vertices` is empty or holds
    /// a non-finite coordinate.
    pub fn new(text: impl Into<String>, vertices: Vec<Vertex>) -> Result<Self, Table2MdError> {
        let text = text.into();
        if vertices.is_empty() {
            return Err(Table2MdError::InvalidOcrResponse {
                detail: format!("word '{text}' has no bounding-box vertices"),
            });
        }
        if vertices.iter().any(|v| !v.x.is_finite() || !v.y.is_finite()) {
            return Err(Table2MdError::InvalidOcrResponse {
                detail: format!("word '{text}' has a non-finite vertex"),
            });
        }
        Ok(Self { text, vertices })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Mean of the polygon corners.
    pub fn centroid(&self) -> (f64, f64) {
        let n = self.vertices.len() as f64;
        let (sx, sy) = self
            .vertices
            .iter()
            .fold((0.0, 0.0), |(sx, sy), v| (sx + v.x, sy + v.y));
        (sx / n, sy / n)
    }

    pub fn observe(&self) -> WordObservation {
        let (x, y) = self.centroid();
        WordObservation::new(self.text.clone(), x, y)
    }
}

/// Assemble rows with the default thresholds (`y_threshold = 6`, `x_split = 80`).
pub fn assemble_rows(words: &[RawWord]) -> Vec<String> {
    assemble_rows_with(words, &ReconstructConfig::default())
}

/// Reconstruct the table as one `"left || right"` line per visual row.
///
/// Rows are clustered top-to-bottom, each row is sorted left-to-right before
/// the column split, and rows where both columns are empty are dropped.
pub fn assemble_rows_with(words: &[RawWord], config: &ReconstructConfig) -> Vec<String> {
    let observations: Vec<WordObservation> = words.iter().map(RawWord::observe).collect();

    cluster_rows_with(observations, config.y_threshold, config.anchor)
        .into_iter()
        .filter_map(|mut row| {
            row.sort_by(|a, b| a.x.total_cmp(&b.x));
            let (left, right) = split_row(&row, config.x_split);
            if left.is_empty() && right.is_empty() {
                None
            } else {
                Some(format!("{left}{COLUMN_DELIMITER}{right}"))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(text: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> RawWord {
        RawWord::new(
            text,
            vec![
                Vertex { x: x0, y: y0 },
                Vertex { x: x1, y: y0 },
                Vertex { x: x1, y: y1 },
                Vertex { x: x0, y: y1 },
            ],
        )
        .unwrap()
    }

    #[test]
    fn centroid_is_vertex_mean() {
        let word = boxed("x", 10.0, 20.0, 30.0, 40.0);
        assert_eq!(word.centroid(), (20.0, 30.0));
    }

    #[test]
    fn rejects_word_without_vertices() {
        let err = RawWord::new("lonely", vec![]).unwrap_err();
        assert!(matches!(err, Table2MdError::InvalidOcrResponse { .. }));
    }

    #[test]
    fn assembles_two_column_rows() {
        let words = vec![
            boxed("Qwen2.5", 70.0, 2.0, 110.0, 10.0),
            boxed("Model", 0.0, 0.0, 20.0, 10.0),
            boxed("3B", 80.0, 36.0, 100.0, 46.0),
            boxed("Size", 0.0, 35.0, 20.0, 45.0),
        ];
        assert_eq!(assemble_rows(&words), vec!["Model || Qwen2.5", "Size || 3B"]);
    }

    #[test]
    fn sorts_each_row_left_to_right() {
        let words = vec![
            boxed("world", 40.0, 0.0, 60.0, 10.0),
            boxed("hello", 0.0, 1.0, 20.0, 11.0),
        ];
        assert_eq!(assemble_rows(&words), vec!["hello world || "]);
    }

    #[test]
    fn drops_rows_with_only_blank_text() {
        let words = vec![
            boxed("", 0.0, 0.0, 10.0, 10.0),
            boxed("kept", 0.0, 50.0, 10.0, 60.0),
        ];
        assert_eq!(assemble_rows(&words), vec!["kept || "]);
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert!(assemble_rows(&[]).is_empty());
    }

    #[test]
    fn honours_custom_split() {
        let words = vec![
            boxed("a", 0.0, 0.0, 10.0, 10.0),
            boxed("b", 40.0, 0.0, 50.0, 10.0),
        ];
        let config = ReconstructConfig {
            x_split: 20.0,
            ..ReconstructConfig::default()
        };
        assert_eq!(assemble_rows_with(&words, &config), vec!["a || b"]);
    }
}
