//! Result types returned by the pipeline stages.
//!
//! Every per-item result carries an optional [`TableError`] instead of
//! failing the stage, so a single bad crop or rejected OCR call shows up in
//! the summary while the rest of the tables still get processed.

use crate::error::TableError;
use crate::reconstruct::PixelRect;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One page rasterised by the render stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedPage {
    /// 1-indexed page number.
    pub page: usize,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderSummary {
    pub pages: Vec<RenderedPage>,
    pub duration_ms: u64,
}

/// One table cut out of a page image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropResult {
    pub page: usize,
    /// 1-based position of the table on its page.
    pub index: usize,
    /// Shared stem of the crop/OCR/Markdown files, e.g. `page_9_table_1`.
    pub name: String,
    pub rect: Option<PixelRect>,
    /// Written crop; `None` when the crop failed.
    pub path: Option<PathBuf>,
    pub error: Option<TableError>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CropSummary {
    /// Page images that had at least one table region.
    pub pages_processed: usize,
    pub tables: Vec<CropResult>,
    pub duration_ms: u64,
}

impl CropSummary {
    pub fn succeeded(&self) -> usize {
        self.tables.iter().filter(|t| t.error.is_none()).count()
    }
}

/// OCR outcome for one crop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResult {
    pub name: String,
    pub image_path: PathBuf,
    pub json_path: PathBuf,
    /// True when an existing response was reused instead of calling the API.
    pub cached: bool,
    pub duration_ms: u64,
    pub error: Option<TableError>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrSummary {
    pub results: Vec<OcrResult>,
    pub duration_ms: u64,
}

impl OcrSummary {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.error.is_none()).count()
    }

    pub fn cached(&self) -> usize {
        self.results.iter().filter(|r| r.cached).count()
    }
}

/// Markdown rendering outcome for one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableResult {
    pub name: String,
    /// Assembled `"left || right"` rows sent to the model.
    pub rows: Vec<String>,
    /// Cleaned Markdown table (empty on failure).
    pub markdown: String,
    pub output_path: Option<PathBuf>,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    pub retries: u32,
    pub error: Option<TableError>,
}

impl TableResult {
    pub(crate) fn failed(name: &str, rows: Vec<String>, error: TableError) -> Self {
        Self {
            name: name.to_string(),
            rows,
            markdown: String::new(),
            output_path: None,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
            retries: 0,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkdownSummary {
    pub tables: Vec<TableResult>,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub duration_ms: u64,
}

impl MarkdownSummary {
    pub fn succeeded(&self) -> usize {
        self.tables.iter().filter(|t| t.error.is_none()).count()
    }
}

/// Outcome of a full `parse → render → crop → ocr → markdown` run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub table_count: usize,
    pub table_pages: Vec<usize>,
    pub render: RenderSummary,
    pub crop: CropSummary,
    pub ocr: OcrSummary,
    pub markdown: MarkdownSummary,
    pub total_duration_ms: u64,
}
