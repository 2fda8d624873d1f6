//! File helpers shared by the stages: page numbers from names, natural
//! ordering, image listing and atomic writes.

use crate::error::Table2MdError;
use std::cmp::Ordering;
use std::io::Write;
use std::path::{Path, PathBuf};

/// The last run of ASCII digits in a file name, e.g. `page_10.png` → 10.
pub fn page_number_from_name(name: &str) -> Option<usize> {
    let bytes = name.as_bytes();
    let end = bytes.iter().rposition(u8::is_ascii_digit)? + 1;
    let start = bytes[..end]
        .iter()
        .rposition(|b| !b.is_ascii_digit())
        .map_or(0, |i| i + 1);
    name[start..end].parse().ok()
}

/// One segment of a natural sort key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum KeyPart {
    Number(u64),
    Text(String),
}

/// Split a name into digit and non-digit runs so `page_2` sorts before `page_10`.
pub fn natural_sort_key(name: &str) -> Vec<KeyPart> {
    let mut parts = Vec::new();
    let mut run = String::new();
    let mut in_digits = false;

    for c in name.chars() {
        let is_digit = c.is_ascii_digit();
        if !run.is_empty() && is_digit != in_digits {
            parts.push(finish_run(&run, in_digits));
            run.clear();
        }
        in_digits = is_digit;
        run.push(c);
    }
    if !run.is_empty() {
        parts.push(finish_run(&run, in_digits));
    }
    parts
}

fn finish_run(run: &str, digits: bool) -> KeyPart {
    if digits {
        // Runs longer than u64 fall back to text comparison.
        run.parse()
            .map(KeyPart::Number)
            .unwrap_or_else(|_| KeyPart::Text(run.to_string()))
    } else {
        KeyPart::Text(run.to_string())
    }
}

pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_sort_key(a).cmp(&natural_sort_key(b))
}

/// `.png` files in `dir`, naturally ordered by file name.
///
/// A missing directory is an empty listing, not an error.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, Table2MdError> {
    list_with_extension(dir, "png")
}

/// Files in `dir` whose extension matches `ext` (case-insensitive), naturally ordered.
pub fn list_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, Table2MdError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(Table2MdError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| Table2MdError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ext));
        if matches && path.is_file() {
            files.push(path);
        }
    }

    files.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));
    Ok(files)
}

/// File name as a lossy string (empty for paths without one).
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// File stem as a lossy string (empty for paths without one).
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Write `bytes` to `path` via a temp file in the same directory plus rename,
/// so readers never observe a half-written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Table2MdError> {
    let write_err = |source| Table2MdError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Pretty JSON with non-ASCII text kept as-is, written atomically.
pub fn write_json_atomic(path: &Path, value: &serde_json::Value) -> Result<(), Table2MdError> {
    let body = serde_json::to_vec_pretty(value)
        .map_err(|e| Table2MdError::Internal(format!("JSON serialisation: {e}")))?;
    write_atomic(path, &body)
}

/// Encode `image` as PNG and write it atomically.
pub fn save_png(path: &Path, image: &image::DynamicImage) -> Result<(), Table2MdError> {
    let mut buf = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|source| Table2MdError::Image {
            path: path.to_path_buf(),
            source,
        })?;
    write_atomic(path, &buf.into_inner())
}

/// Decode an image file.
pub fn open_image(path: &Path) -> Result<image::DynamicImage, Table2MdError> {
    image::open(path).map_err(|source| Table2MdError::Image {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_json(path: &Path) -> Result<serde_json::Value, Table2MdError> {
    let bytes = std::fs::read(path).map_err(|source| Table2MdError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| Table2MdError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_number_is_last_digit_run() {
        assert_eq!(page_number_from_name("page_10.png"), Some(10));
        assert_eq!(page_number_from_name("scan2_page_7.png"), Some(7));
        assert_eq!(page_number_from_name("cover.png"), None);
        assert_eq!(page_number_from_name("42"), Some(42));
    }

    #[test]
    fn natural_order_compares_numbers() {
        let mut names = vec![
            "page_10_table_1",
            "page_2_table_2",
            "page_2_table_10",
            "page_2_table_1",
        ];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(
            names,
            vec![
                "page_2_table_1",
                "page_2_table_2",
                "page_2_table_10",
                "page_10_table_1"
            ]
        );
    }

    #[test]
    fn lists_only_png_in_natural_order() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["page_10.png", "page_9.PNG", "notes.txt", "page_1.png"] {
            std::fs::write(tmp.path().join(name), b"x").unwrap();
        }
        let names: Vec<String> = list_images(tmp.path())
            .unwrap()
            .iter()
            .map(|p| file_name(p))
            .collect();
        assert_eq!(names, vec!["page_1.png", "page_9.PNG", "page_10.png"]);
    }

    #[test]
    fn missing_dir_lists_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(list_images(&tmp.path().join("absent")).unwrap().is_empty());
    }

    #[test]
    fn atomic_write_creates_parent_and_replaces() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/out.md");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn json_keeps_hangul_unescaped() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("r.json");
        write_json_atomic(&path, &serde_json::json!({ "text": "항목" })).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("항목"));
        assert_eq!(read_json(&path).unwrap()["text"], "항목");
    }
}
