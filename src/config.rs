//! Configuration types for the table extraction pipeline.
//!
//! Every stage reads its knobs from one [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. API keys and model identifiers live here too:
//! the library never reads process environment, so a config fully describes
//! a run and two runs can be compared by diffing their configs.

use crate::error::Table2MdError;
use crate::layout::WorkspaceLayout;
use edgequake_llm::LLMProvider;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub use crate::reconstruct::{ReconstructConfig, RowAnchor};

/// Upstage endpoint serving both Document Parse and OCR.
pub const DEFAULT_UPSTAGE_URL: &str = "https://api.upstage.ai/v1/document-digitization";

/// Default OpenAI-compatible endpoint for Markdown rendering.
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Configuration for a pipeline run.
///
/// # Example
/// ```rust
/// use edgequake_table2md::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .root("paper_rag_project")
///     .api_key("up_...")
///     .y_threshold(8.0)
///     .build()
///     .unwrap();
/// assert_eq!(config.reconstruct.x_split, 80.0);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Workspace directories every stage reads from and writes to.
    pub layout: WorkspaceLayout,

    /// Row clustering and column split thresholds.
    pub reconstruct: ReconstructConfig,

    /// Upstage API key for Document Parse and OCR.
    pub api_key: Option<String>,

    /// Document Parse endpoint.
    pub document_parse_url: String,

    /// OCR endpoint.
    pub ocr_url: String,

    /// Per-request timeout for remote calls, in seconds. Default: 120.
    pub request_timeout_secs: u64,

    /// Concurrent OCR requests. Default: 4.
    ///
    /// Crops are independent, so OCR calls can overlap. Lower this when the
    /// service answers `429`.
    pub concurrency: usize,

    /// Pause after every live OCR call, in milliseconds. Default: 0.
    pub request_delay_ms: u64,

    /// Re-run OCR even when a cached response exists. Default: false.
    pub overwrite_ocr: bool,

    /// Rendering DPI for table pages. Range: 36–400. Default: 72.
    ///
    /// 72 DPI is the PDF point grid. `x_split` and `y_threshold` are in
    /// crop pixels, so raising the DPI means raising them proportionally.
    pub dpi: u32,

    /// Pages to render, intersected with the pages that hold tables.
    pub pages: PageSelection,

    /// Explicit pdfium library path. If None, local then system library.
    pub pdfium_lib_path: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Also write each page with its table boxes outlined. Default: false.
    pub annotate: bool,

    /// Pre-constructed LLM provider. Takes precedence over the URL/model fields.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Provider name for the factory (e.g. "anthropic", "ollama"), used when
    /// no explicit endpoint or key is set. The factory reads that provider's
    /// own API key variable.
    pub provider_name: Option<String>,

    /// OpenAI-compatible base URL (OpenAI, Ollama, vLLM, LiteLLM).
    pub llm_base_url: String,

    /// Bearer key for the LLM endpoint. Local servers usually need none.
    pub llm_api_key: Option<String>,

    /// Chat model identifier. Default: `gpt-4.1-nano`.
    pub model: String,

    /// Sampling temperature. Default: 0.0 (greedy).
    pub temperature: f32,

    /// Maximum tokens generated per table. Default: 512.
    pub max_tokens: usize,

    /// Retry attempts per table on a failed model call. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Custom prompt template. `{rows}` is replaced by the assembled rows.
    pub system_prompt: Option<String>,

    /// Progress events for each stage.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            layout: WorkspaceLayout::default(),
            reconstruct: ReconstructConfig::default(),
            api_key: None,
            document_parse_url: DEFAULT_UPSTAGE_URL.to_string(),
            ocr_url: DEFAULT_UPSTAGE_URL.to_string(),
            request_timeout_secs: 120,
            concurrency: 4,
            request_delay_ms: 0,
            overwrite_ocr: false,
            dpi: 72,
            pages: PageSelection::default(),
            pdfium_lib_path: None,
            password: None,
            annotate: false,
            provider: None,
            provider_name: None,
            llm_base_url: DEFAULT_LLM_BASE_URL.to_string(),
            llm_api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: 512,
            max_retries: 2,
            retry_backoff_ms: 500,
            system_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |k: &Option<String>| k.as_ref().map(|_| "<redacted>");
        f.debug_struct("PipelineConfig")
            .field("layout", &self.layout)
            .field("reconstruct", &self.reconstruct)
            .field("api_key", &redact(&self.api_key))
            .field("document_parse_url", &self.document_parse_url)
            .field("ocr_url", &self.ocr_url)
            .field("concurrency", &self.concurrency)
            .field("overwrite_ocr", &self.overwrite_ocr)
            .field("dpi", &self.dpi)
            .field("pages", &self.pages)
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .field("provider_name", &self.provider_name)
            .field("llm_base_url", &self.llm_base_url)
            .field("llm_api_key", &redact(&self.llm_api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// The API key, or `MissingApiKey` naming the service that needs it.
    pub fn require_api_key(&self, service: &str) -> Result<&str, Table2MdError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Table2MdError::MissingApiKey {
                service: service.to_string(),
            })
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.layout = WorkspaceLayout::new(root);
        self
    }

    pub fn reconstruct(mut self, reconstruct: ReconstructConfig) -> Self {
        self.config.reconstruct = reconstruct;
        self
    }

    pub fn y_threshold(mut self, t: f64) -> Self {
        self.config.reconstruct.y_threshold = t;
        self
    }

    pub fn x_split(mut self, x: f64) -> Self {
        self.config.reconstruct.x_split = x;
        self
    }

    pub fn row_anchor(mut self, anchor: RowAnchor) -> Self {
        self.config.reconstruct.anchor = anchor;
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn document_parse_url(mut self, url: impl Into<String>) -> Self {
        self.config.document_parse_url = url.into();
        self
    }

    pub fn ocr_url(mut self, url: impl Into<String>) -> Self {
        self.config.ocr_url = url.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn request_delay_ms(mut self, ms: u64) -> Self {
        self.config.request_delay_ms = ms;
        self
    }

    pub fn overwrite_ocr(mut self, v: bool) -> Self {
        self.config.overwrite_ocr = v;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(36, 400);
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn annotate(mut self, v: bool) -> Self {
        self.config.annotate = v;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn llm_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.llm_base_url = url.into();
        self
    }

    pub fn llm_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.llm_api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(10);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Table2MdError> {
        let r = &self.config.reconstruct;
        if !r.y_threshold.is_finite() || r.y_threshold < 0.0 {
            return Err(Table2MdError::InvalidConfig(format!(
                "y_threshold must be a finite value ≥ 0, got {}",
                r.y_threshold
            )));
        }
        if !r.x_split.is_finite() || r.x_split < 0.0 {
            return Err(Table2MdError::InvalidConfig(format!(
                "x_split must be a finite value ≥ 0, got {}",
                r.x_split
            )));
        }
        if self.config.model.trim().is_empty() && self.config.provider.is_none() {
            return Err(Table2MdError::InvalidConfig("model must not be empty".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Specifies which pages of the PDF to render.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSelection {
    /// Every page (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Whether a 1-indexed page number is selected.
    pub fn contains(&self, page: usize) -> bool {
        match self {
            PageSelection::All => page >= 1,
            PageSelection::Single(p) => *p == page,
            PageSelection::Range(start, end) => page >= (*start).max(1) && page <= *end,
            PageSelection::Set(pages) => pages.contains(&page),
        }
    }

    /// Keep the selected pages of `pages` (1-indexed), sorted and deduplicated.
    pub fn filter(&self, pages: &[usize]) -> Vec<usize> {
        let mut kept: Vec<usize> = pages.iter().copied().filter(|&p| self.contains(p)).collect();
        kept.sort_unstable();
        kept.dedup();
        kept
    }
}
