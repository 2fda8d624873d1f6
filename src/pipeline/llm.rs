//! Language-model interaction: turn assembled rows into a Markdown table.
//!
//! The model is reached through [`edgequake_llm::LLMProvider`], so any
//! backend the factory knows (OpenAI, Anthropic, Gemini, Ollama, LM Studio,
//! OpenRouter and others) can render tables, and tests can plug in their own.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors are transient. Exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`) with 500 ms base and 2 retries waits
//! 500 ms → 1 s. An answer that contains no table line is retried the same
//! way, since greedy decoding on a different server replica can still differ.

use crate::config::{PipelineConfig, DEFAULT_LLM_BASE_URL};
use crate::error::{Table2MdError, TableError};
use crate::output::TableResult;
use crate::prompts::{header_only_table, table_prompt};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, OpenAIProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use super::postprocess::clean_table_markdown;

// ── Provider resolution ──────────────────────────────────────────────────────

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Table2MdError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Table2MdError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Explicit endpoint**: an `llm_api_key`, or an `llm_base_url` other than
///    the OpenAI default (local servers usually need no key). Served by the
///    OpenAI-compatible client.
/// 3. **Named provider** (`config.provider_name`): the factory builds it and
///    reads that provider's own key (`ANTHROPIC_API_KEY`, ...).
/// 4. **Auto-detection** through [`ProviderFactory::from_env`]. Its mock
///    fallback is refused: a run without a real model is a configuration error.
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, Table2MdError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let base_url = config.llm_base_url.trim_end_matches('/');
    let custom_endpoint = base_url != DEFAULT_LLM_BASE_URL;
    if config.llm_api_key.is_some() || custom_endpoint {
        let key = config.llm_api_key.clone().unwrap_or_default();
        let provider = if custom_endpoint {
            OpenAIProvider::compatible(key, base_url)
        } else {
            OpenAIProvider::new(key)
        };
        return Ok(Arc::new(provider.with_model(config.model.clone())));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, &config.model);
    }

    let not_configured = |detail: String| Table2MdError::ProviderNotConfigured {
        provider: "auto".to_string(),
        hint: format!(
            "No LLM provider could be auto-detected from environment.\n\
             Set OPENAI_API_KEY, pass --provider, or point --llm-base-url at a local \
             OpenAI-compatible server (e.g. http://localhost:11434/v1).\n{detail}"
        ),
    };

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| not_configured(format!("Error: {e}")))?;
    if llm_provider.name() == "mock" {
        return Err(not_configured(String::new()));
    }

    Ok(llm_provider)
}

// ── Table rendering ──────────────────────────────────────────────────────────

/// Render one table's assembled rows as Markdown.
///
/// Always returns a `TableResult`; a failure after all retries is stored in
/// `result.error` so one bad table does not abort the stage. Zero rows skip
/// the model and yield a header-only table.
pub async fn rows_to_markdown(
    provider: &Arc<dyn LLMProvider>,
    name: &str,
    rows: Vec<String>,
    config: &PipelineConfig,
) -> TableResult {
    let start = Instant::now();

    if rows.is_empty() {
        debug!("{}: no rows reconstructed, writing header-only table", name);
        return TableResult {
            name: name.to_string(),
            rows,
            markdown: header_only_table(),
            output_path: None,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: start.elapsed().as_millis() as u64,
            retries: 0,
            error: None,
        };
    }

    let messages = vec![ChatMessage::user(table_prompt(
        config.system_prompt.as_deref(),
        &rows,
    ))];
    let options = build_options(config);

    let mut last_err: Option<String> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config
                .retry_backoff_ms
                .saturating_mul(2u64.saturating_pow(attempt - 1));
            warn!(
                "{}: retry {}/{} after {}ms",
                name, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match provider.chat(&messages, Some(&options)).await {
            Ok(response) => {
                let markdown = clean_table_markdown(&response.content);
                if markdown.is_empty() {
                    warn!("{}: attempt {} returned no table lines", name, attempt + 1);
                    last_err = Some("model answer contained no Markdown table".to_string());
                    continue;
                }

                let duration = start.elapsed();
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    name, response.prompt_tokens, response.completion_tokens, duration
                );
                return TableResult {
                    name: name.to_string(),
                    rows,
                    markdown,
                    output_path: None,
                    input_tokens: response.prompt_tokens,
                    output_tokens: response.completion_tokens,
                    duration_ms: duration.as_millis() as u64,
                    retries: attempt,
                    error: None,
                };
            }
            Err(e) => {
                let err_msg = e.to_string();
                warn!("{}: attempt {} failed: {}", name, attempt + 1, err_msg);
                last_err = Some(err_msg);
            }
        }
    }

    let detail = last_err.unwrap_or_else(|| "Unknown error".to_string());
    let mut result = TableResult::failed(
        name,
        rows,
        TableError::MarkdownFailed {
            table: name.to_string(),
            retries: config.max_retries,
            detail,
        },
    );
    result.retries = config.max_retries;
    result.duration_ms = start.elapsed().as_millis() as u64;
    result
}

fn build_options(config: &PipelineConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use edgequake_llm::{LLMResponse, LlmError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays canned answers in order; `Err` entries become API errors.
    struct Scripted {
        answers: Mutex<Vec<Result<String, String>>>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(answers: Vec<Result<&str, &str>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(
                    answers
                        .into_iter()
                        .rev()
                        .map(|a| a.map(String::from).map_err(String::from))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LLMProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "test"
        }

        fn max_context_length(&self) -> usize {
            8192
        }

        async fn complete(&self, prompt: &str) -> edgequake_llm::Result<LLMResponse> {
            self.chat(&[ChatMessage::user(prompt)], None).await
        }

        async fn complete_with_options(
            &self,
            prompt: &str,
            options: &CompletionOptions,
        ) -> edgequake_llm::Result<LLMResponse> {
            self.chat(&[ChatMessage::user(prompt)], Some(options)).await
        }

        async fn chat(
            &self,
            messages: &[ChatMessage],
            _options: Option<&CompletionOptions>,
        ) -> edgequake_llm::Result<LLMResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(messages[0].content.clone());
            match self.answers.lock().unwrap().pop() {
                Some(Ok(content)) => Ok(LLMResponse::new(content, "test").with_usage(40, 12)),
                Some(Err(message)) => Err(LlmError::ApiError(message)),
                None => Err(LlmError::ApiError("script exhausted".into())),
            }
        }
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig::builder()
            .retry_backoff_ms(1)
            .max_retries(2)
            .build()
            .unwrap()
    }

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&PipelineConfig::default());
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(512));
    }

    #[test]
    fn resolve_local_endpoint_without_key() {
        let config = PipelineConfig::builder()
            .llm_base_url("http://localhost:11434/v1/")
            .model("qwen2.5:3b")
            .build()
            .unwrap();
        let provider = resolve_provider(&config).unwrap();
        assert_eq!(provider.model(), "qwen2.5:3b");
    }

    #[test]
    fn resolve_prefers_prebuilt_provider() {
        let scripted = Scripted::new(vec![]);
        let config = PipelineConfig::builder()
            .provider(scripted)
            .llm_api_key("sk-unused")
            .build()
            .unwrap();
        assert_eq!(resolve_provider(&config).unwrap().name(), "scripted");
    }

    #[test]
    fn resolve_named_provider_through_factory() {
        let config = PipelineConfig::builder().provider_name("mock").build().unwrap();
        assert_eq!(resolve_provider(&config).unwrap().name(), "mock");
    }

    #[test]
    fn resolve_unknown_provider_name_fails() {
        let config = PipelineConfig::builder()
            .provider_name("no-such-llm")
            .build()
            .unwrap();
        match resolve_provider(&config) {
            Err(Table2MdError::ProviderNotConfigured { provider, .. }) => {
                assert_eq!(provider, "no-such-llm")
            }
            Err(other) => panic!("unexpected: {other}"),
            Ok(p) => panic!("resolved to {}", p.name()),
        }
    }

    #[tokio::test]
    async fn renders_and_cleans_answer() {
        let scripted = Scripted::new(vec![Ok(
            "```markdown\n| 항목 | 내용 |\n| --- | --- |\n| 모델 | Qwen2.5 |\n```",
        )]);
        let provider: Arc<dyn LLMProvider> = scripted.clone();
        let rows = vec!["모델 || Qwen2.5".to_string()];

        let result = rows_to_markdown(&provider, "page_1_table_1", rows, &fast_config()).await;

        assert!(result.error.is_none());
        assert_eq!(result.markdown, "| 항목 | 내용 |\n| --- | --- |\n| 모델 | Qwen2.5 |\n");
        assert_eq!(result.input_tokens, 40);
        assert_eq!(result.retries, 0);
        assert!(scripted.prompts.lock().unwrap()[0].ends_with("모델 || Qwen2.5"));
    }

    #[tokio::test]
    async fn retries_transient_errors() {
        let scripted = Scripted::new(vec![Err("HTTP 503"), Ok("| 항목 | 내용 |\n| a | b |")]);
        let provider: Arc<dyn LLMProvider> = scripted.clone();

        let result =
            rows_to_markdown(&provider, "t", vec!["a || b".into()], &fast_config()).await;

        assert!(result.error.is_none());
        assert_eq!(result.retries, 1);
        assert_eq!(scripted.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn answer_without_table_is_retried_then_fails() {
        let scripted = Scripted::new(vec![Ok("표를 만들 수 없습니다."), Ok("no"), Ok("still no")]);
        let provider: Arc<dyn LLMProvider> = scripted.clone();

        let result =
            rows_to_markdown(&provider, "t", vec!["a || b".into()], &fast_config()).await;

        assert_eq!(scripted.calls.load(Ordering::SeqCst), 3);
        assert!(result.markdown.is_empty());
        match result.error {
            Some(TableError::MarkdownFailed { retries, .. }) => assert_eq!(retries, 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn huge_retry_count_is_clamped_and_backoff_saturates() {
        let scripted = Scripted::new(vec![]);
        let provider: Arc<dyn LLMProvider> = scripted.clone();
        let config = PipelineConfig::builder()
            .max_retries(70)
            .retry_backoff_ms(0)
            .build()
            .unwrap();

        let result = rows_to_markdown(&provider, "t", vec!["a || b".into()], &config).await;

        assert_eq!(result.retries, 10);
        assert_eq!(scripted.calls.load(Ordering::SeqCst), 11);
        match result.error {
            Some(TableError::MarkdownFailed { retries, detail, .. }) => {
                assert_eq!(retries, 10);
                assert!(detail.contains("script exhausted"), "got: {detail}");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_rows_skip_the_model() {
        let scripted = Scripted::new(vec![]);
        let provider: Arc<dyn LLMProvider> = scripted.clone();

        let result = rows_to_markdown(&provider, "t", Vec::new(), &fast_config()).await;

        assert_eq!(scripted.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.markdown, header_only_table());
        assert!(result.error.is_none());
    }
}
