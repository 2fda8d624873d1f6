//! Upstage Document Digitization client: Document Parse and OCR uploads.
//!
//! Both services take a multipart form with the file in the `document` field
//! plus string fields selecting the model, and answer with JSON. Responses are
//! returned as raw [`serde_json::Value`] since they are written to disk
//! verbatim; typed views are taken later by [`super::parse`] and [`super::ocr`].

use crate::config::PipelineConfig;
use crate::error::Table2MdError;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const DOCUMENT_PARSE_SERVICE: &str = "Document Parse";
pub const OCR_SERVICE: &str = "OCR";

/// Longest response body kept in an [`Table2MdError::ApiError`].
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Authenticated client for the Upstage endpoints.
#[derive(Clone)]
pub struct UpstageClient {
    client: reqwest::Client,
    api_key: String,
    timeout_secs: u64,
    parse_url: String,
    ocr_url: String,
}

impl UpstageClient {
    /// Build a client from the pipeline config.
    ///
    /// # Errors
    /// `MissingApiKey` when no key is configured.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, Table2MdError> {
        let api_key = config.require_api_key("Upstage")?.to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Table2MdError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            timeout_secs: config.request_timeout_secs,
            parse_url: config.document_parse_url.clone(),
            ocr_url: config.ocr_url.clone(),
        })
    }

    /// Parse a PDF into layout elements with forced OCR and base64 table images.
    pub async fn parse_document(&self, pdf: &Path) -> Result<Value, Table2MdError> {
        let fields = [
            ("ocr", "force"),
            ("base64_encoding", "['table']"),
            ("model", "document-parse"),
        ];
        self.post_document(DOCUMENT_PARSE_SERVICE, &self.parse_url, pdf, &fields)
            .await
    }

    /// Run word-level OCR on one image.
    pub async fn ocr_image(&self, image: &Path) -> Result<Value, Table2MdError> {
        self.post_document(OCR_SERVICE, &self.ocr_url, image, &[("model", "ocr")])
            .await
    }

    async fn post_document(
        &self,
        service: &str,
        url: &str,
        path: &Path,
        fields: &[(&str, &str)],
    ) -> Result<Value, Table2MdError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| Table2MdError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("{}: uploading {} ({} bytes)", service, path.display(), bytes.len());

        let file_name = super::files::file_name(path);
        let mut form = Form::new().part("document", Part::bytes(bytes).file_name(file_name));
        for (key, value) in fields {
            form = form.text(key.to_string(), value.to_string());
        }

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport_error(service, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Table2MdError::ApiError {
                service: service.to_string(),
                status: status.as_u16(),
                body: truncate_chars(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| self.transport_error(service, e))
    }

    fn transport_error(&self, service: &str, e: reqwest::Error) -> Table2MdError {
        if e.is_timeout() {
            Table2MdError::ApiTimeout {
                service: service.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            Table2MdError::ApiRequestFailed {
                service: service.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push('…');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_requires_api_key() {
        let config = PipelineConfig::default();
        assert!(matches!(
            UpstageClient::from_config(&config),
            Err(Table2MdError::MissingApiKey { .. })
        ));
    }

    #[test]
    fn client_builds_with_key() {
        let config = PipelineConfig::builder().api_key("up_test").build().unwrap();
        assert!(UpstageClient::from_config(&config).is_ok());
    }

    #[test]
    fn error_bodies_are_truncated_on_char_boundaries() {
        let body = "오류".repeat(400);
        let cut = truncate_chars(&body, 500);
        assert_eq!(cut.chars().count(), 501);
        assert!(cut.ends_with('…'));
        assert_eq!(truncate_chars("short", 500), "short");
    }
}
