//! Content extraction over retrieved bodies.
//!
//! Extraction runs after retrieval and only ever adds `Document::extracted`;
//! the retrieval fields of the document are left as they were.

pub mod dom;
pub mod safety;

pub use dom::DomExtractor;
pub use safety::{detect_prompt_injection, injection_warning};

use pagefetch_core::{Document, Error, ErrorDetails, ExtractedContent};

use crate::fetch::sniff::is_textual;

/// Swappable extraction engine.
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;

    /// Extract readable content from HTML.
    fn extract(&self, html: &str) -> Result<ExtractedContent, Error>;
}

fn is_html(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    essence == "text/html" || essence == "application/xhtml+xml"
}

/// Attach extracted content to a retrieved document.
///
/// HTML goes through `extractor`; other textual bodies are passed through as
/// plain text. Binary bodies are refused with `invalid_usage`.
pub fn extract_document(document: Document, body: &[u8], extractor: &dyn Extractor) -> Result<Document, Error> {
    let content_type = document.artifact.as_ref().and_then(|a| a.content_type.clone());

    let extracted = match content_type.as_deref() {
        Some(ct) if is_html(ct) => extractor.extract(&String::from_utf8_lossy(body))?,
        ct if is_textual(ct) => {
            let text = String::from_utf8_lossy(body).trim().to_string();
            ExtractedContent {
                title: None,
                extraction_method: "plain".to_string(),
                markdown: None,
                text: (!text.is_empty()).then_some(text),
                sections: None,
            }
        }
        ct => {
            let ct = ct.unwrap_or("unknown");
            return Err(Error::invalid_usage(format!("cannot extract text from {ct} content")).with_details(
                ErrorDetails {
                    reason: Some("unsupported_content_type".into()),
                    ..ErrorDetails::for_url(document.url.clone())
                },
            ));
        }
    };

    tracing::debug!(url = %document.url, method = %extracted.extraction_method, "extracted content");
    Ok(document.with_extracted(extracted))
}
