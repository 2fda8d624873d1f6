//! # edgequake-table2md
//!
//! Extract tables from PDF documents as Markdown, using layout analysis,
//! word-level OCR and a chat model.
//!
//! ## Why this crate?
//!
//! Table cells in scanned or designed PDFs rarely survive text extraction:
//! columns interleave and rows break mid-cell. This crate finds the tables
//! with Upstage Document Parse, crops each one, OCRs the crop word by word,
//! rebuilds rows and columns from the word geometry, and lets a chat model
//! write the final Markdown table from that already-structured text.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Parse     Document Parse → output/parsed_result.json
//!  ├─ 2. Render    table pages via pdfium → pages/page_N.png
//!  ├─ 3. Crop      table boxes → crop_results/page_N_table_I.png
//!  ├─ 4. OCR       word boxes per crop → ocr_results/*.json (cached)
//!  ├─ 5. Rows      y-clustering + x-split → "left || right" lines
//!  └─ 6. Markdown  chat model + cleanup → md_results/*.md
//! ```
//!
//! Step 5 is the [`reconstruct`] module: pure functions with no I/O that can
//! be used on their own.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_table2md::{run_pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .root("workspace")
//!         .api_key(std::env::var("UPSTAGE_API_KEY")?)
//!         .llm_api_key(std::env::var("OPENAI_API_KEY")?)
//!         .build()?;
//!     let summary = run_pipeline("workspace/input/report.pdf", &config).await?;
//!     eprintln!("{}/{} tables converted",
//!         summary.markdown.succeeded(), summary.table_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `table2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-table2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod layout;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod reconstruct;
pub mod run;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PageSelection, PipelineConfig, PipelineConfigBuilder};
pub use error::{Table2MdError, TableError};
pub use layout::WorkspaceLayout;
pub use output::{
    CropResult, CropSummary, MarkdownSummary, OcrResult, OcrSummary, PipelineSummary,
    RenderSummary, RenderedPage, TableResult,
};
pub use edgequake_llm::LLMProvider;
pub use pipeline::parse::{load_parsed_document, parse_document, ParsedDocument, TableRegion};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback, Stage};
pub use reconstruct::{
    assemble_rows, assemble_rows_with, RawWord, ReconstructConfig, RowAnchor, Vertex,
};
pub use run::{
    crop_from_workspace, render_markdown, rows_for_ocr_file, run_pipeline, run_pipeline_sync,
};
