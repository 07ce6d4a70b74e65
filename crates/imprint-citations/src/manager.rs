//! Bibliography manager
//!
//! Aggregates sources from every registered provider, owns the search index
//! and answers the citation UI's queries.
//!
//! Loads may overlap. Each `load()` takes a generation number, and only a
//! load newer than the last committed one commits the write permission, the
//! aggregate and the index. A superseded load that saw provider changes only
//! marks the aggregate stale, so the next committed load rebuilds it.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::future::join_all;
use impress_csl::{csl_to_biblatex, CslItem};

use crate::config::CitationsConfig;
use crate::debounce::SearchDebouncer;
use crate::dedup::{apply_write_policy, unique_by_id};
use crate::document::{EditorDocument, EditorUiContext};
use crate::index::{SearchOptions, SearchScope, SourceIndex};
use crate::provider::{
    BibliographyDataProvider, LoadContext, LocalBibliographyProvider, ZoteroProvider,
    ZoteroWebServer,
};
use crate::source::{
    build_collection_tree, BibliographyCollection, BibliographyFile, CollectionNode, SharedSource,
};

struct ManagerState {
    committed_generation: u64,
    /// `None` until the first load commits
    sources: Option<Vec<SharedSource>>,
    writable: bool,
    index: Arc<SourceIndex>,
    /// A superseded load saw provider changes the aggregate does not have
    stale: bool,
}

pub struct BibliographyManager {
    providers: Vec<Arc<dyn BibliographyDataProvider>>,
    options: SearchOptions,
    debouncer: SearchDebouncer,
    state: RwLock<ManagerState>,
    next_generation: AtomicU64,
    rebuilds: AtomicUsize,
}

impl BibliographyManager {
    /// Manager over `providers` in registration order (local first)
    pub fn new(providers: Vec<Arc<dyn BibliographyDataProvider>>) -> Self {
        Self::with_config(providers, &CitationsConfig::default())
    }

    pub fn with_config(
        providers: Vec<Arc<dyn BibliographyDataProvider>>,
        config: &CitationsConfig,
    ) -> Self {
        let options = SearchOptions::from(&config.search);
        Self {
            providers,
            options,
            debouncer: SearchDebouncer::new(config.search.min_query_interval()),
            state: RwLock::new(ManagerState {
                committed_generation: 0,
                sources: None,
                writable: true,
                index: Arc::new(SourceIndex::empty(options)),
                stale: false,
            }),
            next_generation: AtomicU64::new(0),
            rebuilds: AtomicUsize::new(0),
        }
    }

    /// Local file provider plus Zotero. Zotero stays unconfigured unless
    /// enabled with valid credentials.
    pub fn with_default_providers(config: &CitationsConfig) -> Self {
        let local: Arc<dyn BibliographyDataProvider> =
            Arc::new(LocalBibliographyProvider::from_files(&config.local));

        let zotero = if config.zotero.enabled {
            match ZoteroWebServer::new(&config.zotero) {
                Ok(server) => ZoteroProvider::new(Arc::new(server)),
                Err(e) => {
                    tracing::warn!("Zotero disabled: {}", e);
                    ZoteroProvider::unconfigured()
                }
            }
        } else {
            ZoteroProvider::unconfigured()
        };

        let zotero: Arc<dyn BibliographyDataProvider> = Arc::new(zotero);
        Self::with_config(vec![local, zotero], config)
    }

    fn state(&self) -> RwLockReadGuard<'_, ManagerState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, ManagerState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Load every provider concurrently and rebuild the index if any changed
    pub async fn load(&self, ui: &dyn EditorUiContext, doc: &dyn EditorDocument) {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let context = LoadContext::from_document(doc, ui);

        let results = join_all(self.providers.iter().map(|p| p.load(&context))).await;
        let changed = results.iter().any(|c| *c);

        let files = self.bibliography_files(doc, ui);
        let writable = files.is_empty() || files.iter().any(|f| f.writable);

        let mut state = self.state_mut();
        if generation <= state.committed_generation {
            // Providers moved on without this load; the next commit rebuilds
            state.stale |= changed;
            tracing::debug!(
                "Load {} superseded by {}",
                generation,
                state.committed_generation
            );
            return;
        }

        state.committed_generation = generation;
        state.writable = writable;

        if changed || state.stale || state.sources.is_none() {
            let sources: Vec<SharedSource> =
                self.providers.iter().flat_map(|p| p.items()).collect();
            tracing::debug!(
                "Rebuilt bibliography index with {} sources (load {})",
                sources.len(),
                generation
            );
            state.index = Arc::new(SourceIndex::build(&sources, self.options));
            state.sources = Some(sources);
            state.stale = false;
            self.rebuilds.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state().sources.is_some()
    }

    /// Generation of the newest committed load, 0 before any load
    pub fn load_generation(&self) -> u64 {
        self.state().committed_generation
    }

    /// Number of times the search index has been rebuilt
    pub fn index_rebuild_count(&self) -> usize {
        self.rebuilds.load(Ordering::SeqCst)
    }

    /// True when there is no bibliography file yet or any of them is writable.
    /// Before the first load nothing restricts writing.
    pub fn is_writable(&self) -> bool {
        self.state().writable
    }

    pub fn providers(&self) -> &[Arc<dyn BibliographyDataProvider>] {
        &self.providers
    }

    pub fn provider(&self, key: &str) -> Option<&Arc<dyn BibliographyDataProvider>> {
        self.providers.iter().find(|p| p.key() == key)
    }

    pub fn local_providers(&self) -> Vec<&Arc<dyn BibliographyDataProvider>> {
        self.providers.iter().filter(|p| p.is_local()).collect()
    }

    pub fn collections(
        &self,
        provider_key: &str,
        doc: &dyn EditorDocument,
        ui: &dyn EditorUiContext,
    ) -> Vec<BibliographyCollection> {
        self.provider(provider_key)
            .map(|p| p.collections(doc, ui))
            .unwrap_or_default()
    }

    pub fn collection_tree(
        &self,
        provider_key: &str,
        doc: &dyn EditorDocument,
        ui: &dyn EditorUiContext,
    ) -> Vec<CollectionNode> {
        build_collection_tree(&self.collections(provider_key, doc, ui))
    }

    /// Bibliography files from every provider
    pub fn bibliography_files(
        &self,
        doc: &dyn EditorDocument,
        ui: &dyn EditorUiContext,
    ) -> Vec<BibliographyFile> {
        self.providers
            .iter()
            .flat_map(|p| p.bibliography_paths(doc, ui))
            .collect()
    }

    pub fn writable_bibliography_files(
        &self,
        doc: &dyn EditorDocument,
        ui: &dyn EditorUiContext,
    ) -> Vec<BibliographyFile> {
        self.bibliography_files(doc, ui)
            .into_iter()
            .filter(|f| f.writable)
            .collect()
    }

    /// Aggregate list under the write policy, first occurrence of each id
    pub fn all_sources(&self) -> Vec<SharedSource> {
        let state = self.state();
        match &state.sources {
            Some(sources) => unique_by_id(apply_write_policy(
                sources.clone(),
                state.writable,
                &self.local_keys(),
            )),
            None => Vec::new(),
        }
    }

    pub fn sources_for_provider(&self, provider_key: &str) -> Vec<SharedSource> {
        unique_by_id(
            self.all_sources()
                .into_iter()
                .filter(|s| s.provider_key == provider_key),
        )
    }

    pub fn sources_for_provider_collection(
        &self,
        provider_key: &str,
        collection_key: &str,
    ) -> Vec<SharedSource> {
        unique_by_id(
            self.all_sources()
                .into_iter()
                .filter(|s| s.provider_key == provider_key && s.in_collection(collection_key)),
        )
    }

    /// Search within an optional provider and collection. An empty query
    /// returns the unfiltered list for that scope in aggregate order; otherwise
    /// results are in relevance order. A collection without a provider is
    /// ignored.
    pub fn search(
        &self,
        query: Option<&str>,
        provider_key: Option<&str>,
        collection_key: Option<&str>,
    ) -> Vec<SharedSource> {
        let query = query.map(str::trim).filter(|q| !q.is_empty());

        let Some(query) = query else {
            return match (provider_key, collection_key) {
                (Some(provider), Some(collection)) => {
                    self.sources_for_provider_collection(provider, collection)
                }
                (Some(provider), None) => self.sources_for_provider(provider),
                (None, _) => self.all_sources(),
            };
        };

        let scope = match (provider_key, collection_key) {
            (Some(provider), Some(collection)) => SearchScope::Collection {
                provider,
                collection,
            },
            (Some(provider), None) => SearchScope::Provider(provider),
            (None, _) => SearchScope::All,
        };

        let (index, writable) = {
            let state = self.state();
            (state.index.clone(), state.writable)
        };

        let hits = index.search(query, scope).into_iter().map(|hit| hit.source);
        apply_write_policy(unique_by_id(hits), writable, &self.local_keys())
    }

    /// `search` behind the minimum query interval. Returns `None` when a newer
    /// call superseded this one.
    pub async fn search_debounced(
        &self,
        query: Option<&str>,
        provider_key: Option<&str>,
        collection_key: Option<&str>,
    ) -> Option<Vec<SharedSource>> {
        self.debouncer
            .run(|| self.search(query, provider_key, collection_key))
            .await
    }

    /// Keys of the providers whose sources stay citable without write access
    fn local_keys(&self) -> Vec<&str> {
        self.local_providers().into_iter().map(|p| p.key()).collect()
    }

    /// Loaded sources from local providers. Does not reload.
    fn local_sources(&self) -> Vec<SharedSource> {
        let local_keys = self.local_keys();
        let state = self.state();
        state
            .sources
            .iter()
            .flatten()
            .filter(|s| local_keys.contains(&s.provider_key.as_str()))
            .cloned()
            .collect()
    }

    /// Find a loaded local source by DOI. Call `load()` first; this does not
    /// refresh.
    pub fn find_doi_in_local_bibliography(&self, doi: &str) -> Option<SharedSource> {
        let wanted = normalize_doi(doi);
        if wanted.is_empty() {
            return None;
        }
        self.local_sources().into_iter().find(|s| {
            s.csl
                .doi
                .as_deref()
                .is_some_and(|d| normalize_doi(d) == wanted)
        })
    }

    /// Find a loaded local source by citation id. Call `load()` first.
    pub fn find_id_in_local_bibliography(&self, id: &str) -> Option<SharedSource> {
        self.local_sources().into_iter().find(|s| s.id() == id)
    }

    /// BibLaTeX for a record: the provider's own export when it has one,
    /// else the generic CSL conversion
    pub async fn generate_biblatex(
        &self,
        ui: &dyn EditorUiContext,
        id: &str,
        csl: &CslItem,
        provider_key: Option<&str>,
    ) -> String {
        if let Some(provider) = provider_key.and_then(|key| self.provider(key)) {
            if let Some(biblatex) = provider.generate_biblatex(ui, id, csl).await {
                return biblatex;
            }
        }
        csl_to_biblatex(id, csl)
    }

    /// First provider warning in registration order
    pub fn warning(&self) -> Option<String> {
        self.providers
            .iter()
            .find_map(|p| p.warning_message().filter(|w| !w.is_empty()))
    }

    pub fn warning_for_provider(&self, provider_key: &str) -> Option<String> {
        self.provider(provider_key)
            .and_then(|p| p.warning_message())
            .filter(|w| !w.is_empty())
    }
}

const DOI_PREFIXES: [&str; 5] = [
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi:",
];

/// Lowercase DOI without resolver or `doi:` prefixes
pub fn normalize_doi(doi: &str) -> String {
    let doi = doi.trim().to_lowercase();
    let doi = DOI_PREFIXES
        .iter()
        .find_map(|prefix| doi.strip_prefix(*prefix))
        .unwrap_or(doi.as_str());
    doi.trim().to_string()
}
