//! On-disk workspace layout shared by every pipeline stage.
//!
//! Stages never pass data to each other in memory; each one reads the files
//! the previous stage wrote. The files are the durable record of a run and
//! double as a cache (existing OCR results are not re-requested).

use crate::error::Table2MdError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root of a table2md workspace and the well-known paths under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl Default for WorkspaceLayout {
    fn default() -> Self {
        Self::new(".")
    }
}

impl WorkspaceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Source PDFs.
    pub fn input_dir(&self) -> PathBuf {
        self.root.join("input")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    /// Raw Document Parse response.
    pub fn parsed_result(&self) -> PathBuf {
        self.output_dir().join("parsed_result.json")
    }

    /// Rendered pages, `page_{n}.png`.
    pub fn pages_dir(&self) -> PathBuf {
        self.root.join("pages")
    }

    /// Cropped tables, `page_{n}_table_{i}.png`.
    pub fn crops_dir(&self) -> PathBuf {
        self.root.join("crop_results")
    }

    /// Pages with table boxes outlined.
    pub fn annotated_dir(&self) -> PathBuf {
        self.crops_dir().join("annotated")
    }

    /// Raw OCR responses, one JSON per crop.
    pub fn ocr_dir(&self) -> PathBuf {
        self.root.join("ocr_results")
    }

    /// Rendered Markdown tables, one file per crop.
    pub fn markdown_dir(&self) -> PathBuf {
        self.root.join("md_results")
    }

    pub fn page_image(&self, page: usize) -> PathBuf {
        self.pages_dir().join(format!("page_{page}.png"))
    }

    pub fn crop_image(&self, page: usize, index: usize) -> PathBuf {
        self.crops_dir().join(format!("{}.png", crop_stem(page, index)))
    }

    pub fn ocr_json(&self, stem: &str) -> PathBuf {
        self.ocr_dir().join(format!("{stem}.json"))
    }

    pub fn markdown_file(&self, stem: &str) -> PathBuf {
        self.markdown_dir().join(format!("{stem}.md"))
    }

    /// Create every directory of the layout. Idempotent.
    pub fn ensure_dirs(&self) -> Result<(), Table2MdError> {
        for dir in [
            self.input_dir(),
            self.output_dir(),
            self.pages_dir(),
            self.crops_dir(),
            self.ocr_dir(),
            self.markdown_dir(),
        ] {
            std::fs::create_dir_all(&dir)
                .map_err(|source| Table2MdError::OutputWriteFailed { path: dir, source })?;
        }
        Ok(())
    }
}

/// File stem shared by a table's crop, OCR and Markdown files.
pub fn crop_stem(page: usize, index: usize) -> String {
    format!("page_{page}_table_{index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_naming_scheme() {
        let layout = WorkspaceLayout::new("/work");
        assert_eq!(
            layout.parsed_result(),
            PathBuf::from("/work/output/parsed_result.json")
        );
        assert_eq!(layout.page_image(9), PathBuf::from("/work/pages/page_9.png"));
        assert_eq!(
            layout.crop_image(9, 2),
            PathBuf::from("/work/crop_results/page_9_table_2.png")
        );
        assert_eq!(
            layout.ocr_json("page_9_table_2"),
            PathBuf::from("/work/ocr_results/page_9_table_2.json")
        );
        assert_eq!(
            layout.markdown_file("page_9_table_2"),
            PathBuf::from("/work/md_results/page_9_table_2.md")
        );
    }

    #[test]
    fn ensure_dirs_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(tmp.path());
        layout.ensure_dirs().unwrap();
        layout.ensure_dirs().unwrap();
        assert!(layout.ocr_dir().is_dir());
        assert!(layout.markdown_dir().is_dir());
    }
}
