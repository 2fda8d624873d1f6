//! Prompts for rendering reconstructed rows as a Markdown table.
//!
//! The source documents are Korean, so the prompt is too: the model answers in
//! the language it is instructed in, and the header must come out as
//! `항목 | 내용` ("Item | Content") verbatim.
//!
//! Callers can override the template via
//! [`crate::config::PipelineConfig::system_prompt`]; `{rows}` in the override
//! is replaced by the assembled rows.

/// Header of every rendered table.
pub const TABLE_HEADER: [&str; 2] = ["항목", "내용"];

/// Placeholder replaced by the newline-joined rows.
pub const ROWS_PLACEHOLDER: &str = "{rows}";

/// Default prompt for turning `"left || right"` rows into a two-column table.
pub const DEFAULT_TABLE_PROMPT: &str = r#"다음은 OCR로부터 복원한 2열 표이다.
각 행은 "왼쪽열 || 오른쪽열" 형식이다.

이를 Markdown table로 변환하라.

규칙:
- 반드시 Markdown table만 출력
- 헤더는 "항목 | 내용"
- 설명 문장 금지

입력:
{rows}"#;

/// Fill a prompt template with the assembled rows.
pub fn table_prompt(template: Option<&str>, rows: &[String]) -> String {
    template
        .unwrap_or(DEFAULT_TABLE_PROMPT)
        .replace(ROWS_PLACEHOLDER, &rows.join("\n"))
}

/// The Markdown written for a table with no recognisable rows.
pub fn header_only_table() -> String {
    format!(
        "| {} | {} |\n| --- | --- |\n",
        TABLE_HEADER[0], TABLE_HEADER[1]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_joined_into_the_prompt() {
        let rows = vec!["Model || Qwen2.5".to_string(), "Size || 3B".to_string()];
        let prompt = table_prompt(None, &rows);
        assert!(prompt.ends_with("Model || Qwen2.5\nSize || 3B"));
        assert!(prompt.contains("항목 | 내용"));
        assert!(!prompt.contains(ROWS_PLACEHOLDER));
    }

    #[test]
    fn custom_template_is_used() {
        let rows = vec!["a || b".to_string()];
        assert_eq!(table_prompt(Some("T:\n{rows}"), &rows), "T:\na || b");
    }

    #[test]
    fn header_only_table_has_separator() {
        assert_eq!(header_only_table(), "| 항목 | 내용 |\n| --- | --- |\n");
    }
}
