//! Bibliography data providers
//!
//! A provider loads records from one origin and answers synchronous queries
//! from its last successful load. Load failures never escape `load()`: the
//! provider logs them, keeps its previous data and reports no change.

pub mod local;
pub mod zotero;

use std::path::PathBuf;

use async_trait::async_trait;
use impress_csl::CslItem;

use crate::document::{EditorDocument, EditorUiContext, ParsedYaml};
use crate::source::{BibliographyCollection, BibliographyFile, SharedSource};

pub use local::{BibliographyServer, FileBibliographyServer, LocalBibliographyProvider};
pub use zotero::{ZoteroProvider, ZoteroServer, ZoteroWebServer};

/// Document context handed to every provider on load
#[derive(Debug, Clone, Default)]
pub struct LoadContext {
    pub document_path: Option<PathBuf>,
    pub resource_dir: PathBuf,
    pub yaml_blocks: Vec<ParsedYaml>,
    pub project_bibliographies: Vec<String>,
}

impl LoadContext {
    pub fn from_document(doc: &dyn EditorDocument, ui: &dyn EditorUiContext) -> Self {
        Self {
            document_path: ui.document_path(),
            resource_dir: ui.default_resource_dir(),
            yaml_blocks: doc.yaml_nodes(),
            project_bibliographies: ui.project_bibliographies(),
        }
    }

    /// Directory relative bibliography paths resolve against
    pub fn base_dir(&self) -> PathBuf {
        self.document_path
            .as_deref()
            .and_then(|p| p.parent())
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| self.resource_dir.clone())
    }
}

#[async_trait]
pub trait BibliographyDataProvider: Send + Sync {
    /// Stable key, recorded on every source this provider returns
    fn key(&self) -> &str;

    /// Display name
    fn name(&self) -> &str;

    /// Local providers survive the read-only write policy
    fn is_local(&self) -> bool {
        false
    }

    /// Refresh from the document context. Returns true when items changed.
    async fn load(&self, context: &LoadContext) -> bool;

    fn collections(
        &self,
        doc: &dyn EditorDocument,
        ui: &dyn EditorUiContext,
    ) -> Vec<BibliographyCollection>;

    fn items(&self) -> Vec<SharedSource>;

    fn items_for_collection(&self, collection_key: &str) -> Vec<SharedSource> {
        self.items()
            .into_iter()
            .filter(|s| s.in_collection(collection_key))
            .collect()
    }

    /// Bibliography files backing this provider for the given document
    fn bibliography_paths(
        &self,
        doc: &dyn EditorDocument,
        ui: &dyn EditorUiContext,
    ) -> Vec<BibliographyFile>;

    /// Provider-specific BibLaTeX for an entry. `None` defers to the generic
    /// CSL conversion.
    async fn generate_biblatex(
        &self,
        _ui: &dyn EditorUiContext,
        _id: &str,
        _csl: &CslItem,
    ) -> Option<String> {
        None
    }

    /// Non-fatal advisory from the last load
    fn warning_message(&self) -> Option<String> {
        None
    }
}
