//! Error types for the edgequake-table2md library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Table2MdError`] is **fatal**: a stage cannot proceed at all (missing
//!   parse result, unreadable PDF, API key not configured, malformed input to
//!   the reconstruction core). Returned as `Err(Table2MdError)`.
//!
//! * [`TableError`] is **non-fatal**: one table failed (degenerate crop, OCR
//!   call rejected, model call exhausted its retries) while the others are
//!   fine. Stored inside [`crate::output::TableResult`] and
//!   [`crate::output::CropResult`] so callers see partial success.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-table2md library.
#[derive(Debug, Error)]
pub enum Table2MdError {
    // ── Reconstruction errors ─────────────────────────────────────────────
    /// A bounding polygon is empty or holds non-finite coordinates.
    #[error("Invalid geometry: {reason}")]
    InvalidGeometry { reason: String },

    /// An OCR response lacks a required field (`pages`, `text`, `boundingBox`).
    #[error("Invalid OCR response: {detail}")]
    InvalidOcrResponse { detail: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The Document Parse result has not been produced yet.
    #[error("Parse result not found at '{path}'\nRun `table2md parse <PDF>` first.")]
    ParsedResultMissing { path: PathBuf },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error(
        "PDF '{path}' is encrypted and requires a password.\n\
Provide it with --password <PASSWORD> (TABLE2MD_PASSWORD)."
    )]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Place libpdfium next to the executable, install it system-wide,\n\
or point --pdfium-lib (TABLE2MD_PDFIUM_LIB) at an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Remote service errors ─────────────────────────────────────────────
    /// A remote service needs an API key and none was configured.
    #[error("No API key configured for {service}.\nSet UPSTAGE_API_KEY or pass --api-key.")]
    MissingApiKey { service: String },

    /// The service answered with a non-success status.
    #[error("{service} returned HTTP {status}: {body}")]
    ApiError {
        service: String,
        status: u16,
        body: String,
    },

    /// The request never produced a response.
    #[error("{service} request failed: {reason}")]
    ApiRequestFailed { service: String, reason: String },

    /// The request exceeded the configured timeout.
    #[error("{service} request timed out after {secs}s")]
    ApiTimeout { service: String, secs: u64 },

    /// The configured LLM provider cannot be constructed.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading a file or directory failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Decoding or encoding an image failed.
    #[error("Image error on '{path}': {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// A JSON file on disk could not be parsed.
    #[error("Invalid JSON in '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single table.
///
/// `table` is the crop stem, e.g. `page_9_table_2`.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum TableError {
    /// The table rectangle could not be cropped or saved.
    #[error("{table}: crop failed: {detail}")]
    CropFailed { table: String, detail: String },

    /// The OCR call for the crop failed.
    #[error("{table}: OCR failed: {detail}")]
    OcrFailed { table: String, detail: String },

    /// The cached OCR response could not be turned into words.
    #[error("{table}: unusable OCR response: {detail}")]
    InvalidOcr { table: String, detail: String },

    /// The model call failed after retries.
    #[error("{table}: Markdown rendering failed after {retries} retries: {detail}")]
    MarkdownFailed {
        table: String,
        retries: u32,
        detail: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display() {
        let e = Table2MdError::ApiError {
            service: "OCR".into(),
            status: 401,
            body: "invalid key".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("OCR"), "got: {msg}");
        assert!(msg.contains("401"), "got: {msg}");
    }

    #[test]
    fn password_required_names_flag_and_env() {
        let e = Table2MdError::PasswordRequired {
            path: PathBuf::from("secret.pdf"),
        };
        let msg = e.to_string();
        assert!(msg.contains("secret.pdf"), "got: {msg}");
        assert!(msg.contains("--password"), "got: {msg}");
        assert!(msg.contains("TABLE2MD_PASSWORD"), "got: {msg}");
    }

    #[test]
    fn invalid_geometry_display() {
        let e = Table2MdError::InvalidGeometry {
            reason: "bounding box has no points".into(),
        };
        assert!(e.to_string().contains("no points"));
    }

    #[test]
    fn missing_parse_result_points_at_parse_command() {
        let e = Table2MdError::ParsedResultMissing {
            path: PathBuf::from("output/parsed_result.json"),
        };
        assert!(e.to_string().contains("table2md parse"));
    }

    #[test]
    fn table_error_names_the_table() {
        let e = TableError::MarkdownFailed {
            table: "page_9_table_1".into(),
            retries: 2,
            detail: "timeout".into(),
        };
        let msg = e.to_string();
        assert!(msg.starts_with("page_9_table_1"), "got: {msg}");
        assert!(msg.contains("2 retries"));
    }

    #[test]
    fn table_error_serialises() {
        let e = TableError::OcrFailed {
            table: "page_1_table_1".into(),
            detail: "HTTP 500".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("OcrFailed"));
    }
}
