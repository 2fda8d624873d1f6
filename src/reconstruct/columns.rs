//! Two-column split of a single row at a fixed horizontal position.
//!
//! The target tables are item/content pairs with a narrow first column, so a
//! single split point in the crop's pixel space is enough. N-column layouts
//! would need x-clustering symmetric to [`super::rows`] instead.

use super::rows::WordObservation;

/// Default horizontal split point, in OCR pixel units.
pub const DEFAULT_X_SPLIT: f64 = 80.0;

/// Split a row into `(left, right)` text at `x_split`.
///
/// Words with `x < x_split` go left, the rest go right. Each side keeps the
/// caller's order and is joined with single spaces; an empty side is `""`.
pub fn split_row(row: &[WordObservation], x_split: f64) -> (String, String) {
    let (left, right): (Vec<&WordObservation>, Vec<&WordObservation>) =
        row.iter().partition(|w| w.x < x_split);

    (join_text(&left), join_text(&right))
}

fn join_text(words: &[&WordObservation]) -> String {
    words
        .iter()
        .map(|w| w.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(text: &str, x: f64) -> WordObservation {
        WordObservation::new(text, x, 0.0)
    }

    #[test]
    fn splits_at_threshold() {
        let row = vec![w("Model", 10.0), w("name", 40.0), w("Qwen2.5", 90.0), w("3B", 120.0)];
        assert_eq!(
            split_row(&row, DEFAULT_X_SPLIT),
            ("Model name".to_string(), "Qwen2.5 3B".to_string())
        );
    }

    #[test]
    fn word_on_the_split_goes_right() {
        let row = vec![w("edge", 80.0)];
        assert_eq!(split_row(&row, 80.0), (String::new(), "edge".to_string()));
    }

    #[test]
    fn empty_row_gives_empty_sides() {
        assert_eq!(split_row(&[], 80.0), (String::new(), String::new()));
    }

    #[test]
    fn preserves_caller_order() {
        let row = vec![w("b", 30.0), w("a", 10.0)];
        assert_eq!(split_row(&row, 80.0).0, "b a");
    }

    #[test]
    fn no_token_lost_or_duplicated() {
        let row: Vec<WordObservation> = (0..40)
            .map(|i| w(&format!("t{i}"), f64::from(i) * 7.3))
            .collect();
        let (left, right) = split_row(&row, 80.0);
        let mut tokens: Vec<&str> = left
            .split_whitespace()
            .chain(right.split_whitespace())
            .collect();
        tokens.sort_unstable();
        let mut expected: Vec<&str> = row.iter().map(|o| o.text.as_str()).collect();
        expected.sort_unstable();
        assert_eq!(tokens, expected);
    }
}
