//! Bibliography sources for imprint's citation insertion
//!
//! This crate provides:
//! - `BibliographyManager`: aggregates providers, deduplicates by citation id,
//!   applies the write policy and serves fuzzy search
//! - Providers for local bibliography files and Zotero libraries
//! - The host document seam (`EditorDocument`, `EditorUiContext`)
//! - `CitationsConfig` loaded from `~/.imprint/citations.toml`

pub mod config;
pub mod debounce;
pub mod dedup;
pub mod document;
pub mod error;
pub mod http;
pub mod index;
pub mod manager;
pub mod provider;
pub mod source;

pub use config::{CitationsConfig, LocalConfig, SearchConfig, ZoteroConfig};
pub use debounce::SearchDebouncer;
pub use document::{
    parse_yaml_nodes, EditorDocument, EditorUiContext, MarkdownDocument, ParsedYaml,
    StaticUiContext,
};
pub use error::{ConfigError, ProviderError, Result};
pub use index::{SearchHit, SearchOptions, SearchScope, SourceIndex};
pub use manager::BibliographyManager;
pub use provider::{BibliographyDataProvider, LoadContext};
pub use source::{
    BibliographyCollection, BibliographyFile, BibliographySource, CollectionNode, SharedSource,
    LOCAL_PROVIDER_KEY, ZOTERO_PROVIDER_KEY,
};
