//! DOM-based extraction with scraper.

use std::sync::LazyLock;

use pagefetch_core::{Error, ExtractedContent, Section};
use scraper::{Html, Node, Selector};

use super::Extractor;

static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").expect("invalid selector"));
static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").expect("invalid selector"));
static HEADINGS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1, h2, h3").expect("invalid selector"));

/// Elements whose text never reaches the reader.
const HIDDEN: &[&str] = &["head", "script", "style", "noscript", "template", "svg"];

/// Title, visible text, and h1-h3 outline. No markdown.
#[derive(Debug, Clone, Default)]
pub struct DomExtractor;

impl DomExtractor {
    pub fn new() -> Self {
        Self
    }
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn title(document: &Html) -> Option<String> {
    document
        .select(&TITLE)
        .chain(document.select(&H1))
        .map(|el| collapse(&el.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

fn visible_text(document: &Html) -> String {
    let mut parts = Vec::new();
    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else { continue };
        let hidden = node
            .ancestors()
            .filter_map(|a| a.value().as_element())
            .any(|el| HIDDEN.contains(&el.name()));
        if !hidden {
            parts.push(&**text);
        }
    }
    collapse(&parts.join(" "))
}

fn sections(document: &Html) -> Vec<Section> {
    document
        .select(&HEADINGS)
        .filter_map(|el| {
            let level = match el.value().name() {
                "h1" => 1,
                "h2" => 2,
                _ => 3,
            };
            let heading = collapse(&el.text().collect::<String>());
            (!heading.is_empty()).then_some(Section { level, heading })
        })
        .collect()
}

impl Extractor for DomExtractor {
    fn name(&self) -> &str {
        "dom"
    }

    fn extract(&self, html: &str) -> Result<ExtractedContent, Error> {
        let document = Html::parse_document(html);
        let text = visible_text(&document);
        let sections = sections(&document);

        Ok(ExtractedContent {
            title: title(&document),
            extraction_method: self.name().to_string(),
            markdown: None,
            text: (!text.is_empty()).then_some(text),
            sections: (!sections.is_empty()).then_some(sections),
        })
    }
}
