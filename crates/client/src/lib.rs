//! Network-facing retrieval for pagefetch.
//!
//! This crate provides the HTTP fetch pipeline, robots.txt handling, browser
//! rendering, the retrieval orchestrator with browser escalation, and content
//! extraction shared by the server.

pub mod extract;
pub mod fetch;
pub mod render;
pub mod retrieve;

pub use extract::{DomExtractor, Extractor, detect_prompt_injection, extract_document, injection_warning};
pub use fetch::{FetchOutcome, FetchSettings, Fetcher, RobotsCheck, RobotsGuard, UrlError, canonicalize};
pub use render::{
    BrowserEngine, BrowserProfile, NavigateOptions, PageRenderer, RenderError, RenderOutcome, RenderSettings,
    RenderedPage, WaitCondition, engine_from_config,
};
pub use retrieve::{Outcome, Retrieval, RetrievalMethod, RetrievalState, Retriever, next_state};

#[cfg(feature = "render")]
pub use render::ChromiumEngine;
