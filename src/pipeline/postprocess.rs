//! Post-processing: deterministic cleanup of model-generated Markdown tables.
//!
//! The prompt asks for a bare Markdown table, but models still wrap the answer
//! in fences, add a sentence of commentary before or after it, forget the
//! header separator, or repeat the separator inside the body. Each rule here
//! is a pure `&str → String` pass and independently testable.
//!
//! ## Rule Order
//!
//! Fences are stripped and line endings normalised before line filtering, so
//! that a fenced or CRLF answer still yields its table lines. Invisible
//! characters go before the table checks because a leading BOM would hide
//! the `|` of the first row.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all post-processing rules to a raw model answer.
///
/// Rules (applied in order):
/// 1. Strip outer markdown fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 4. Keep only table lines (trimmed line starts with `|`)
/// 5. Insert a missing header separator row
/// 6. Remove spurious mid-table separator rows
/// 7. End with exactly one newline
///
/// Returns an empty string when the answer contains no table line at all.
pub fn clean_table_markdown(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = keep_table_lines(&s);
    let s = fix_broken_tables(&s);
    let s = remove_mid_table_separators(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: Strip outer markdown fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\r?\n(.*)\r?\n```\s*$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Keep table lines ─────────────────────────────────────────────────

fn keep_table_lines(input: &str) -> String {
    input
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('|'))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Fix a missing header separator ───────────────────────────────────

/// Inserts a separator after the first row of a table block when the next
/// row is a data row.
fn fix_broken_tables(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut result = Vec::with_capacity(lines.len() + 1);
    let mut in_table = false;

    for (i, line) in lines.iter().enumerate() {
        result.push(line.to_string());

        if !is_table_row(line) {
            in_table = false;
            continue;
        }
        let is_header = !in_table && !is_separator_row(line);
        in_table = true;

        if is_header {
            let next = lines.get(i + 1).copied().unwrap_or("");
            if is_table_row(next) && !is_separator_row(next) {
                let col_count = column_count(line);
                let sep: String = std::iter::once("|")
                    .chain(std::iter::repeat_n(" --- |", col_count))
                    .collect();
                result.push(sep);
            }
        }
    }

    result.join("\n")
}

fn column_count(row: &str) -> usize {
    let trimmed = row.trim();
    let inner = trimmed
        .strip_prefix('|')
        .unwrap_or(trimmed)
        .strip_suffix('|')
        .unwrap_or(trimmed);
    inner.split('|').count().max(1)
}

fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.len() > 1
}

fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|')
        && trimmed.contains('-')
        && trimmed
            .chars()
            .all(|c| c == '|' || c == '-' || c == ':' || c == ' ')
}

// ── Rule 6: Remove spurious mid-table separator rows ────────────────────────
//
// GFM only allows a separator in position 2 of a table block. Within each
// block every other separator row is dropped.

fn remove_mid_table_separators(input: &str) -> String {
    let mut result: Vec<&str> = Vec::new();
    let mut table_line_count = 0usize;

    for line in input.lines() {
        if is_table_row(line) {
            table_line_count += 1;
            if is_separator_row(line) && table_line_count != 2 {
                continue;
            }
        } else {
            table_line_count = 0;
        }
        result.push(line);
    }

    result.join("\n")
}

// ── Rule 7: Ensure a single final newline ────────────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}\n", trimmed)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
