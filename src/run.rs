//! Stage entry points and the end-to-end pipeline.
//!
//! Every stage reads its input from and writes its output to the workspace
//! directories named by [`WorkspaceLayout`](crate::layout::WorkspaceLayout),
//! so the stages can be run one at a time (as the CLI subcommands do) or
//! chained by [`run_pipeline`]. Re-running a stage overwrites its own
//! outputs; OCR responses are cached unless `overwrite_ocr` is set.

use crate::config::PipelineConfig;
use crate::error::{Table2MdError, TableError};
use crate::output::{CropSummary, MarkdownSummary, PipelineSummary, TableResult};
use crate::pipeline::files::{file_stem, list_with_extension, natural_cmp, write_atomic};
use crate::pipeline::llm::{resolve_provider, rows_to_markdown};
use crate::pipeline::ocr::{ocr_images, words_from_file};
use crate::pipeline::parse::{load_parsed_document, parse_document, ParsedDocument};
use crate::pipeline::{crop, render};
use crate::progress::{Reporter, Stage};
use crate::reconstruct::{assemble_rows_with, ReconstructConfig};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Run `parse → render → crop → ocr → markdown` for one PDF.
///
/// # Returns
/// `Ok(PipelineSummary)` even if some tables failed (check the per-stage
/// `error` fields).
///
/// # Errors
/// Returns `Err(Table2MdError)` only for fatal errors:
/// - Input missing or not a PDF
/// - Missing API key / unconfigured model provider
/// - Document Parse call failed
/// - pdfium could not be bound or the PDF could not be opened
/// - Workspace directories or outputs could not be written
pub async fn run_pipeline(
    pdf: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<PipelineSummary, Table2MdError> {
    let total_start = Instant::now();
    let pdf = pdf.as_ref();
    info!("Starting table extraction: {}", pdf.display());

    // ── Step 1: Workspace ────────────────────────────────────────────────
    config.layout.ensure_dirs()?;

    // ── Step 2: Document Parse ───────────────────────────────────────────
    let doc = parse_document(pdf, config).await?;
    let table_count = doc.table_regions().len();
    let table_pages = doc.table_pages();
    if table_count == 0 {
        info!("No tables found in {}", pdf.display());
        return Ok(PipelineSummary {
            total_duration_ms: total_start.elapsed().as_millis() as u64,
            ..Default::default()
        });
    }

    // ── Step 3: Render table pages ───────────────────────────────────────
    let render = render::render_table_pages(pdf, &doc, config).await?;

    // ── Step 4: Crop tables ──────────────────────────────────────────────
    let crop = crop_tables(doc, config).await?;
    let crops: Vec<PathBuf> = crop.tables.iter().filter_map(|t| t.path.clone()).collect();

    // ── Step 5: OCR crops ────────────────────────────────────────────────
    let ocr = ocr_images(&crops, config).await?;
    let ocr_files: Vec<PathBuf> = ocr
        .results
        .iter()
        .filter(|r| r.error.is_none())
        .map(|r| r.json_path.clone())
        .collect();

    // ── Step 6: Markdown ─────────────────────────────────────────────────
    let markdown = render_markdown_files(&ocr_files, config).await?;

    let summary = PipelineSummary {
        table_count,
        table_pages,
        render,
        crop,
        ocr,
        markdown,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    info!(
        "Done: {}/{} tables rendered to Markdown in {}ms",
        summary.markdown.succeeded(),
        summary.table_count,
        summary.total_duration_ms
    );
    Ok(summary)
}

/// Synchronous wrapper around [`run_pipeline`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_pipeline_sync(
    pdf: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<PipelineSummary, Table2MdError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Table2MdError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run_pipeline(pdf, config))
}

/// Crop stage on a blocking thread (image decoding and encoding are CPU-bound).
pub async fn crop_tables(
    doc: ParsedDocument,
    config: &PipelineConfig,
) -> Result<CropSummary, Table2MdError> {
    let layout = config.layout.clone();
    let annotate = config.annotate;
    let progress = config.progress_callback.clone();

    tokio::task::spawn_blocking(move || crop::crop_tables(&doc, &layout, annotate, progress.as_ref()))
        .await
        .map_err(|e| Table2MdError::Internal(format!("Crop task panicked: {}", e)))?
}

/// Crop stage reading `output/parsed_result.json` from the workspace.
pub async fn crop_from_workspace(config: &PipelineConfig) -> Result<CropSummary, Table2MdError> {
    let doc = load_parsed_document(&config.layout)?;
    crop_tables(doc, config).await
}

/// Rows reconstructed from one cached OCR response.
pub fn rows_for_ocr_file(
    path: &Path,
    reconstruct: &ReconstructConfig,
) -> Result<Vec<String>, Table2MdError> {
    let words = words_from_file(path)?;
    Ok(assemble_rows_with(&words, reconstruct))
}

/// Markdown stage over every `ocr_results/*.json`.
pub async fn render_markdown(config: &PipelineConfig) -> Result<MarkdownSummary, Table2MdError> {
    let files = list_with_extension(&config.layout.ocr_dir(), "json")?;
    render_markdown_files(&files, config).await
}

/// Markdown stage over the given OCR response files.
///
/// Each file becomes `md_results/{stem}.md`. A file that cannot be decoded
/// into words is a per-table [`TableError::InvalidOcr`]. The model provider
/// is only resolved when at least one table has rows to send.
pub async fn render_markdown_files(
    files: &[PathBuf],
    config: &PipelineConfig,
) -> Result<MarkdownSummary, Table2MdError> {
    let start = Instant::now();
    let reporter = Reporter::new(config.progress_callback.as_ref(), Stage::Markdown);
    reporter.start(files.len());

    let mut results: Vec<TableResult> = Vec::with_capacity(files.len());
    let mut jobs: Vec<(String, Vec<String>)> = Vec::new();

    for path in files {
        let name = file_stem(path);
        match rows_for_ocr_file(path, &config.reconstruct) {
            Ok(rows) => jobs.push((name, rows)),
            Err(e) => {
                warn!("{}: {}", name, e);
                reporter.error(&name, &e.to_string());
                results.push(TableResult::failed(
                    &name,
                    Vec::new(),
                    TableError::InvalidOcr {
                        table: name.clone(),
                        detail: e.to_string(),
                    },
                ));
            }
        }
    }

    if !jobs.is_empty() {
        let needs_model = jobs.iter().any(|(_, rows)| !rows.is_empty());
        let provider = if needs_model {
            let p = resolve_provider(config)?;
            info!("Rendering {} tables with {}/{}", jobs.len(), p.name(), p.model());
            Some(p)
        } else {
            None
        };

        let rendered: Vec<TableResult> = stream::iter(jobs.into_iter().map(|(name, rows)| {
            let provider = provider.clone();
            async move {
                match provider {
                    Some(p) => rows_to_markdown(&p, &name, rows, config).await,
                    // Every job has zero rows here; no model call happens.
                    None => header_only(&name),
                }
            }
        }))
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;

        for mut result in rendered {
            if result.error.is_none() {
                let path = config.layout.markdown_file(&result.name);
                write_atomic(&path, result.markdown.as_bytes())?;
                result.output_path = Some(path);
                reporter.complete(&result.name);
            } else if let Some(ref e) = result.error {
                reporter.error(&result.name, &e.to_string());
            }
            results.push(result);
        }
    }

    results.sort_by(|a, b| natural_cmp(&a.name, &b.name));

    let summary = MarkdownSummary {
        total_input_tokens: results.iter().map(|r| r.input_tokens as u64).sum(),
        total_output_tokens: results.iter().map(|r| r.output_tokens as u64).sum(),
        tables: results,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    reporter.finish(summary.succeeded(), files.len());
    info!(
        "Markdown: {}/{} tables, {} input / {} output tokens",
        summary.succeeded(),
        files.len(),
        summary.total_input_tokens,
        summary.total_output_tokens
    );
    Ok(summary)
}

fn header_only(name: &str) -> TableResult {
    TableResult {
        name: name.to_string(),
        rows: Vec::new(),
        markdown: crate::prompts::header_only_table(),
        output_path: None,
        input_tokens: 0,
        output_tokens: 0,
        duration_ms: 0,
        retries: 0,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn word(text: &str, x: f64, y: f64) -> serde_json::Value {
        json!({ "text": text, "boundingBox": { "vertices": [
            {"x": x - 5.0, "y": y - 5.0}, {"x": x + 5.0, "y": y - 5.0},
            {"x": x + 5.0, "y": y + 5.0}, {"x": x - 5.0, "y": y + 5.0}
        ]}})
    }

    #[test]
    fn rows_from_cached_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("page_1_table_1.json");
        let response = json!({ "pages": [{ "words": [
            word("Qwen2.5", 150.0, 20.0),
            word("모델", 30.0, 21.0),
            word("크기", 30.0, 50.0),
            word("3B", 150.0, 52.0),
        ]}]});
        crate::pipeline::files::write_json_atomic(&path, &response).unwrap();

        let rows = rows_for_ocr_file(&path, &ReconstructConfig::default()).unwrap();
        assert_eq!(rows, vec!["모델 || Qwen2.5", "크기 || 3B"]);
    }

    #[tokio::test]
    async fn empty_tables_need_no_provider() {
        let tmp = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder().root(tmp.path()).build().unwrap();
        let path = config.layout.ocr_json("page_2_table_1");
        crate::pipeline::files::write_json_atomic(&path, &json!({ "pages": [] })).unwrap();

        let summary = render_markdown(&config).await.unwrap();

        assert_eq!(summary.succeeded(), 1);
        let md = std::fs::read_to_string(config.layout.markdown_file("page_2_table_1")).unwrap();
        assert_eq!(md, crate::prompts::header_only_table());
    }

    #[tokio::test]
    async fn malformed_ocr_is_a_table_error() {
        let tmp = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder().root(tmp.path()).build().unwrap();
        let path = config.layout.ocr_json("page_3_table_1");
        crate::pipeline::files::write_json_atomic(&path, &json!({ "message": "quota" })).unwrap();

        let summary = render_markdown(&config).await.unwrap();

        assert_eq!(summary.tables.len(), 1);
        assert!(matches!(
            summary.tables[0].error,
            Some(TableError::InvalidOcr { .. })
        ));
        assert!(!config.layout.markdown_file("page_3_table_1").exists());
    }

    #[tokio::test]
    async fn rows_with_unknown_provider_are_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder()
            .root(tmp.path())
            .provider_name("no-such-llm")
            .build()
            .unwrap();
        let path = config.layout.ocr_json("page_1_table_1");
        let response = json!({ "pages": [{ "words": [word("a", 10.0, 10.0)] }] });
        crate::pipeline::files::write_json_atomic(&path, &response).unwrap();

        assert!(matches!(
            render_markdown(&config).await,
            Err(Table2MdError::ProviderNotConfigured { .. })
        ));
    }
}
