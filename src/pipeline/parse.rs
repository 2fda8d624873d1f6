//! Document Parse results: typed view over `parsed_result.json` and the
//! table regions derived from it.

use crate::config::PipelineConfig;
use crate::error::Table2MdError;
use crate::layout::WorkspaceLayout;
use crate::progress::{Reporter, Stage};
use crate::reconstruct::NormalizedPoint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

use super::files::{file_name, write_json_atomic};
use super::input::validate_pdf;
use super::upstage::UpstageClient;

/// Category label the parser gives to tables.
pub const TABLE_CATEGORY: &str = "table";

/// The subset of the Document Parse response the pipeline reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedDocument {
    #[serde(default)]
    pub elements: Vec<ParsedElement>,
}

/// One layout element (paragraph, heading, table, figure, …).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedElement {
    #[serde(default)]
    pub id: Option<u64>,
    pub category: String,
    /// 1-indexed page. Older responses call it `page_number`.
    #[serde(alias = "page_number")]
    pub page: usize,
    #[serde(default)]
    pub coordinates: Vec<NormalizedPoint>,
}

impl ParsedElement {
    pub fn is_table(&self) -> bool {
        self.category == TABLE_CATEGORY
    }
}

/// A table located on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRegion {
    pub page: usize,
    /// 1-based position among the tables of the same page, in document order.
    pub index: usize,
    pub bbox: Vec<NormalizedPoint>,
}

impl ParsedDocument {
    /// Decode a raw response.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Every table element with its per-page index.
    pub fn table_regions(&self) -> Vec<TableRegion> {
        let mut per_page: std::collections::HashMap<usize, usize> =
            std::collections::HashMap::new();

        self.elements
            .iter()
            .filter(|e| e.is_table())
            .map(|e| {
                let index = per_page.entry(e.page).or_insert(0);
                *index += 1;
                TableRegion {
                    page: e.page,
                    index: *index,
                    bbox: e.coordinates.clone(),
                }
            })
            .collect()
    }

    /// Sorted, de-duplicated pages holding at least one table.
    pub fn table_pages(&self) -> Vec<usize> {
        self.elements
            .iter()
            .filter(|e| e.is_table())
            .map(|e| e.page)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Send `pdf` to Document Parse and store the response as
/// `output/parsed_result.json`.
///
/// The raw response is written before it is decoded, so a response the typed
/// view rejects can still be inspected on disk.
pub async fn parse_document(
    pdf: &Path,
    config: &PipelineConfig,
) -> Result<ParsedDocument, Table2MdError> {
    let pdf = validate_pdf(pdf)?;
    let client = UpstageClient::from_config(config)?;
    let reporter = Reporter::new(config.progress_callback.as_ref(), Stage::Parse);
    let name = file_name(&pdf);
    reporter.start(1);

    info!("Parsing {}", pdf.display());
    let value = match client.parse_document(&pdf).await {
        Ok(v) => v,
        Err(e) => {
            reporter.error(&name, &e.to_string());
            return Err(e);
        }
    };

    let path = config.layout.parsed_result();
    write_json_atomic(&path, &value)?;
    let doc = ParsedDocument::from_value(value).map_err(|source| Table2MdError::Json {
        path: path.clone(),
        source,
    })?;

    let regions = doc.table_regions();
    info!(
        "Parsed {}: {} elements, {} tables on pages {:?} → {}",
        name,
        doc.elements.len(),
        regions.len(),
        doc.table_pages(),
        path.display()
    );
    reporter.complete(&name);
    reporter.finish(1, 1);
    Ok(doc)
}

/// Read `output/parsed_result.json` back from a workspace.
///
/// # Errors
/// `ParsedResultMissing` when the parse stage has not run yet, `Json` when the
/// file does not decode.
pub fn load_parsed_document(layout: &WorkspaceLayout) -> Result<ParsedDocument, Table2MdError> {
    load_parsed_document_from(&layout.parsed_result())
}

pub fn load_parsed_document_from(path: &Path) -> Result<ParsedDocument, Table2MdError> {
    if !path.exists() {
        return Err(Table2MdError::ParsedResultMissing {
            path: path.to_path_buf(),
        });
    }
    let value = super::files::read_json(path)?;
    ParsedDocument::from_value(value).map_err(|source| Table2MdError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ParsedDocument {
        ParsedDocument::from_value(json!({
            "api": "2.0",
            "model": "document-parse-250116",
            "elements": [
                { "id": 0, "category": "heading1", "page": 1,
                  "coordinates": [{"x": 0.1, "y": 0.05}, {"x": 0.9, "y": 0.05}] },
                { "id": 1, "category": "table", "page": 9,
                  "coordinates": [{"x": 0.1, "y": 0.2}, {"x": 0.5, "y": 0.2},
                                  {"x": 0.5, "y": 0.6}, {"x": 0.1, "y": 0.6}],
                  "content": { "html": "<table></table>" } },
                { "id": 2, "category": "table", "page": 1,
                  "coordinates": [{"x": 0.2, "y": 0.3}] },
                { "id": 3, "category": "table", "page_number": 9,
                  "coordinates": [{"x": 0.1, "y": 0.7}, {"x": 0.9, "y": 0.9}] }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn finds_tables_with_per_page_index() {
        let regions = sample().table_regions();
        let keys: Vec<(usize, usize)> = regions.iter().map(|r| (r.page, r.index)).collect();
        assert_eq!(keys, vec![(9, 1), (1, 1), (9, 2)]);
        assert_eq!(regions[0].bbox.len(), 4);
    }

    #[test]
    fn table_pages_are_sorted_and_unique() {
        assert_eq!(sample().table_pages(), vec![1, 9]);
    }

    #[test]
    fn missing_elements_is_empty_document() {
        let doc = ParsedDocument::from_value(json!({ "api": "2.0" })).unwrap();
        assert!(doc.table_regions().is_empty());
    }

    #[test]
    fn missing_file_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(tmp.path());
        assert!(matches!(
            load_parsed_document(&layout),
            Err(Table2MdError::ParsedResultMissing { .. })
        ));
    }

    #[test]
    fn loads_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(tmp.path());
        let raw = json!({ "elements": [
            { "category": "table", "page": 2, "coordinates": [{"x": 0.0, "y": 0.0}] }
        ]});
        super::super::files::write_json_atomic(&layout.parsed_result(), &raw).unwrap();
        let doc = load_parsed_document(&layout).unwrap();
        assert_eq!(doc.table_pages(), vec![2]);
    }
}
