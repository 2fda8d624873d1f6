//! OCR stage: send every crop to the OCR service and cache the responses.
//!
//! Responses are stored verbatim as `ocr_results/{stem}.json`. An existing
//! file is reused unless `overwrite_ocr` is set, so re-running the pipeline
//! after a failed Markdown step costs no OCR calls. Crops are independent, so
//! requests run `concurrency` at a time.

use crate::config::PipelineConfig;
use crate::error::{Table2MdError, TableError};
use crate::layout::WorkspaceLayout;
use crate::output::{OcrResult, OcrSummary};
use crate::progress::{Reporter, Stage};
use crate::reconstruct::{RawWord, Vertex};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::files::{file_stem, list_images, natural_cmp, write_json_atomic};
use super::upstage::UpstageClient;

// ── Response schema ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OcrResponse {
    pages: Vec<OcrPage>,
}

#[derive(Debug, Deserialize)]
struct OcrPage {
    #[serde(default)]
    words: Vec<OcrWord>,
}

#[derive(Debug, Deserialize)]
struct OcrWord {
    text: String,
    #[serde(rename = "boundingBox")]
    bounding_box: OcrBoundingBox,
}

#[derive(Debug, Deserialize)]
struct OcrBoundingBox {
    vertices: Vec<OcrVertex>,
}

#[derive(Debug, Deserialize)]
struct OcrVertex {
    x: f64,
    y: f64,
}

/// Words of the first page of an OCR response.
///
/// A crop is a single image, so only `pages[0]` carries words. `pages: []`
/// or a page without `words` yields no words.
///
/// # Errors
/// [`Table2MdError::InvalidOcrResponse`] when `pages`, a word's `text` or its
/// `boundingBox.vertices` are missing or mistyped, or a word has no vertices.
pub fn words_from_response(response: &Value) -> Result<Vec<RawWord>, Table2MdError> {
    let parsed = OcrResponse::deserialize(response).map_err(|e| {
        Table2MdError::InvalidOcrResponse {
            detail: e.to_string(),
        }
    })?;

    let Some(page) = parsed.pages.into_iter().next() else {
        return Ok(Vec::new());
    };

    page.words
        .into_iter()
        .map(|w| {
            let vertices = w
                .bounding_box
                .vertices
                .into_iter()
                .map(|v| Vertex { x: v.x, y: v.y })
                .collect();
            RawWord::new(w.text, vertices)
        })
        .collect()
}

/// Read a cached OCR response and extract its words.
pub fn words_from_file(path: &Path) -> Result<Vec<RawWord>, Table2MdError> {
    let value = super::files::read_json(path)?;
    words_from_response(&value)
}

// ── Stage ────────────────────────────────────────────────────────────────────

/// OCR every `.png` in `layout.crops_dir()`.
pub async fn ocr_crops(config: &PipelineConfig) -> Result<OcrSummary, Table2MdError> {
    let images = list_images(&config.layout.crops_dir())?;
    ocr_images(&images, config).await
}

/// OCR `images`, reusing cached responses unless `config.overwrite_ocr`.
///
/// The Upstage client is only built when at least one image needs a request,
/// so a fully cached run needs no API key. Results come back in natural
/// order of the image names.
pub async fn ocr_images(
    images: &[PathBuf],
    config: &PipelineConfig,
) -> Result<OcrSummary, Table2MdError> {
    let start = Instant::now();
    let layout = &config.layout;
    let reporter = Reporter::new(config.progress_callback.as_ref(), Stage::Ocr);
    reporter.start(images.len());

    let mut results = Vec::with_capacity(images.len());
    let mut pending = Vec::new();

    for image in images {
        let stem = file_stem(image);
        let json_path = layout.ocr_json(&stem);
        if json_path.exists() && !config.overwrite_ocr {
            debug!("{}: using cached OCR {}", stem, json_path.display());
            reporter.complete(&stem);
            results.push(OcrResult {
                name: stem,
                image_path: image.clone(),
                json_path,
                cached: true,
                duration_ms: 0,
                error: None,
            });
        } else {
            pending.push(image.clone());
        }
    }

    if !pending.is_empty() {
        let client = UpstageClient::from_config(config)?;
        let delay = Duration::from_millis(config.request_delay_ms);

        let fresh: Vec<OcrResult> = stream::iter(pending.into_iter().map(|image| {
            let client = client.clone();
            let reporter = &reporter;
            async move {
                let result = ocr_one(&client, &image, layout).await;
                match &result.error {
                    None => reporter.complete(&result.name),
                    Some(e) => reporter.error(&result.name, &e.to_string()),
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                result
            }
        }))
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;

        results.extend(fresh);
    }

    results.sort_by(|a, b| natural_cmp(&a.name, &b.name));

    let summary = OcrSummary {
        results,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    reporter.finish(summary.succeeded(), images.len());
    info!(
        "OCR: {}/{} succeeded ({} cached)",
        summary.succeeded(),
        images.len(),
        summary.cached()
    );
    Ok(summary)
}

async fn ocr_one(client: &UpstageClient, image: &Path, layout: &WorkspaceLayout) -> OcrResult {
    let start = Instant::now();
    let stem = file_stem(image);
    let json_path = layout.ocr_json(&stem);

    let outcome = match client.ocr_image(image).await {
        Ok(value) => write_json_atomic(&json_path, &value),
        Err(e) => Err(e),
    };

    let error = match outcome {
        Ok(()) => {
            debug!("{}: OCR saved to {}", stem, json_path.display());
            None
        }
        Err(e) => {
            warn!("{}: OCR failed: {}", stem, e);
            Some(TableError::OcrFailed {
                table: stem.clone(),
                detail: e.to_string(),
            })
        }
    };

    OcrResult {
        name: stem,
        image_path: image.to_path_buf(),
        json_path,
        cached: false,
        duration_ms: start.elapsed().as_millis() as u64,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_words_from_first_page() {
        let response = json!({
            "apiVersion": "1.1",
            "modelVersion": "ocr-2.2.1",
            "pages": [{
                "id": 0,
                "words": [
                    { "id": 0, "text": "모델", "confidence": 0.99,
                      "boundingBox": { "vertices": [
                          {"x": 10, "y": 10}, {"x": 50, "y": 10},
                          {"x": 50, "y": 22}, {"x": 10, "y": 22}] } },
                    { "id": 1, "text": "Qwen2.5",
                      "boundingBox": { "vertices": [
                          {"x": 120, "y": 11}, {"x": 200, "y": 11},
                          {"x": 200, "y": 23}, {"x": 120, "y": 23}] } }
                ]
            }]
        });

        let words = words_from_response(&response).unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text(), "모델");
        assert_eq!(words[0].centroid(), (30.0, 16.0));
    }

    #[test]
    fn vertex_without_coordinate_is_invalid() {
        let response = json!({ "pages": [{ "words": [
            { "text": "a", "boundingBox": { "vertices": [{"y": 4}, {"x": 8}] } }
        ]}]});
        assert!(matches!(
            words_from_response(&response),
            Err(Table2MdError::InvalidOcrResponse { .. })
        ));
    }

    #[test]
    fn empty_pages_means_no_words() {
        let words = words_from_response(&json!({ "pages": [] })).unwrap();
        assert!(words.is_empty());
        let words = words_from_response(&json!({ "pages": [{ "id": 0 }] })).unwrap();
        assert!(words.is_empty());
    }

    #[test]
    fn missing_pages_is_invalid() {
        assert!(matches!(
            words_from_response(&json!({ "error": "quota" })),
            Err(Table2MdError::InvalidOcrResponse { .. })
        ));
    }

    #[test]
    fn word_without_text_is_invalid() {
        let response = json!({ "pages": [{ "words": [
            { "boundingBox": { "vertices": [{"x": 1, "y": 1}] } }
        ]}]});
        assert!(matches!(
            words_from_response(&response),
            Err(Table2MdError::InvalidOcrResponse { .. })
        ));
    }

    #[test]
    fn word_without_vertices_is_invalid() {
        let response = json!({ "pages": [{ "words": [
            { "text": "x", "boundingBox": { "vertices": [] } }
        ]}]});
        assert!(matches!(
            words_from_response(&response),
            Err(Table2MdError::InvalidOcrResponse { .. })
        ));
    }

    #[tokio::test]
    async fn cached_responses_need_no_api_key() {
        let tmp = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder().root(tmp.path()).build().unwrap();
        let layout = &config.layout;
        let crop = layout.crop_image(1, 1);
        std::fs::create_dir_all(crop.parent().unwrap()).unwrap();
        std::fs::write(&crop, b"png").unwrap();
        write_json_atomic(&layout.ocr_json("page_1_table_1"), &json!({ "pages": [] })).unwrap();

        let summary = ocr_crops(&config).await.unwrap();

        assert_eq!(summary.results.len(), 1);
        assert_eq!(summary.cached(), 1);
        assert!(summary.results[0].error.is_none());
    }

    #[tokio::test]
    async fn uncached_crop_without_key_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder().root(tmp.path()).build().unwrap();
        let crop = config.layout.crop_image(2, 1);
        std::fs::create_dir_all(crop.parent().unwrap()).unwrap();
        std::fs::write(&crop, b"png").unwrap();

        assert!(matches!(
            ocr_crops(&config).await,
            Err(Table2MdError::MissingApiKey { .. })
        ));
    }
}
