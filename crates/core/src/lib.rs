//! Core types and shared functionality for pagefetch.
//!
//! This crate provides:
//! - Content cache with a two-file-per-entry on-disk store
//! - Retrieval document model and error taxonomy
//! - Domain policy evaluation
//! - Request header assembly
//! - Layered configuration

pub mod cache;
pub mod config;
pub mod document;
pub mod duration;
pub mod error;
pub mod headers;
pub mod policy;

pub use cache::{CacheHit, CacheMeta, CacheSettings, Clock, ContentCache, EntryMeta, PruneStats, SystemClock};

#[cfg(any(test, feature = "test-util"))]
pub use cache::ManualClock;
pub use config::{AppConfig, ConfigError, RenderConfig};
pub use document::{ArtifactInfo, Document, ExtractedContent, FetchMethod, HttpInfo, RenderInfo, Section};
pub use error::{Error, ErrorCode, ErrorDetails};
pub use policy::{DomainRules, PolicyGate, PolicyMode, RobotsStance};
