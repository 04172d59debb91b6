//! Prompt-injection heuristics over extracted text.
//!
//! Hits are reported as warnings only; the content itself is never altered.

use std::sync::LazyLock;

use pagefetch_core::ExtractedContent;
use regex::Regex;

const INJECTION_SOURCES: &[(&str, &str)] = &[
    ("ignore_instructions", r"(?i)ignore\s+(?:all|previous|above)\s+instructions"),
    ("system_prompt", r"(?i)system\s+prompt"),
    ("developer_message", r"(?i)developer\s+message"),
    ("reveal_instructions", r"(?i)(?:reveal|show|leak)\s+(?:the\s+)?(?:system|developer)\s+prompt"),
    ("override_safety", r"(?i)(?:bypass|override)\s+(?:safety|security|policy|guardrails)"),
];

static INJECTION_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    INJECTION_SOURCES
        .iter()
        .map(|(label, p)| (*label, Regex::new(p).expect("invalid pattern")))
        .collect()
});

/// Labels of every injection pattern found in `text`, in a fixed order.
pub fn detect_prompt_injection(text: &str) -> Vec<&'static str> {
    INJECTION_PATTERNS
        .iter()
        .filter(|(_, pattern)| pattern.is_match(text))
        .map(|(label, _)| *label)
        .collect()
}

/// Warning for extracted content that looks like it addresses an agent.
pub fn injection_warning(content: &ExtractedContent) -> Option<String> {
    let text = content.markdown.as_deref().or(content.text.as_deref())?;
    let hits = detect_prompt_injection(text);
    if hits.is_empty() {
        return None;
    }
    Some(format!("possible prompt injection patterns detected: {}", hits.join(", ")))
}
