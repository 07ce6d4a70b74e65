//! BibliographyManager behavior against in-memory providers

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use impress_csl::{CslItem, CslName};
use imprint_citations::document::yaml_string_list;
use imprint_citations::{
    BibliographyCollection, BibliographyDataProvider, BibliographyFile, BibliographyManager,
    BibliographySource, CitationsConfig, EditorDocument, EditorUiContext, LoadContext,
    MarkdownDocument, SharedSource, StaticUiContext, LOCAL_PROVIDER_KEY, ZOTERO_PROVIDER_KEY,
};

/// Provider whose next load publishes `pending` items (reporting a change),
/// or, failing that, the ids listed under its key in the document YAML.
/// A `delay_ms` key in the document delays the load.
struct FakeProvider {
    key: &'static str,
    local: bool,
    items: Mutex<Vec<SharedSource>>,
    pending: Mutex<Option<Vec<SharedSource>>>,
    files: Vec<BibliographyFile>,
    collections: Vec<BibliographyCollection>,
    warning: Option<String>,
    biblatex: Option<String>,
    loads: AtomicUsize,
}

impl FakeProvider {
    fn new(key: &'static str, local: bool) -> Self {
        Self {
            key,
            local,
            items: Mutex::new(Vec::new()),
            pending: Mutex::new(None),
            files: Vec::new(),
            collections: Vec::new(),
            warning: None,
            biblatex: None,
            loads: AtomicUsize::new(0),
        }
    }

    fn local() -> Self {
        Self::new(LOCAL_PROVIDER_KEY, true)
    }

    fn remote() -> Self {
        Self::new(ZOTERO_PROVIDER_KEY, false)
    }

    fn with_ids(self, ids: &[&str]) -> Self {
        let sources = ids.iter().map(|id| source(id, self.key)).collect();
        self.with_sources(sources)
    }

    fn with_sources(self, sources: Vec<SharedSource>) -> Self {
        *self.pending.lock().unwrap() = Some(sources);
        self
    }

    fn with_file(mut self, path: &str, writable: bool) -> Self {
        self.files.push(BibliographyFile {
            display_path: path.to_string(),
            full_path: PathBuf::from(path),
            writable,
            is_project: false,
        });
        self
    }

    fn with_warning(mut self, warning: &str) -> Self {
        self.warning = Some(warning.to_string());
        self
    }

    fn publish(&self, ids: &[&str]) {
        let sources = ids.iter().map(|id| source(id, self.key)).collect();
        *self.pending.lock().unwrap() = Some(sources);
    }
}

#[async_trait]
impl BibliographyDataProvider for FakeProvider {
    fn key(&self) -> &str {
        self.key
    }

    fn name(&self) -> &str {
        self.key
    }

    fn is_local(&self) -> bool {
        self.local
    }

    async fn load(&self, context: &LoadContext) -> bool {
        self.loads.fetch_add(1, Ordering::SeqCst);

        let delay = context
            .yaml_blocks
            .iter()
            .find_map(|b| b.get("delay_ms").and_then(|v| v.as_u64()));
        if let Some(ms) = delay {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        let pending = self.pending.lock().unwrap().take();
        let next = pending.or_else(|| {
            context
                .yaml_blocks
                .iter()
                .find_map(|b| b.get(self.key))
                .map(|ids| {
                    yaml_string_list(ids)
                        .iter()
                        .map(|id| source(id, self.key))
                        .collect()
                })
        });

        match next {
            Some(items) => {
                *self.items.lock().unwrap() = items;
                true
            }
            None => false,
        }
    }

    fn collections(
        &self,
        _doc: &dyn EditorDocument,
        _ui: &dyn EditorUiContext,
    ) -> Vec<BibliographyCollection> {
        self.collections.clone()
    }

    fn items(&self) -> Vec<SharedSource> {
        self.items.lock().unwrap().clone()
    }

    fn bibliography_paths(
        &self,
        doc: &dyn EditorDocument,
        _ui: &dyn EditorUiContext,
    ) -> Vec<BibliographyFile> {
        let declared = doc
            .yaml_nodes()
            .iter()
            .filter_map(|b| b.get("bibliography").map(yaml_string_list))
            .flatten()
            .map(|path| BibliographyFile {
                writable: !path.ends_with(".ris"),
                full_path: PathBuf::from(&path),
                display_path: path,
                is_project: false,
            })
            .collect::<Vec<_>>();
        if self.local {
            self.files.iter().cloned().chain(declared).collect()
        } else {
            Vec::new()
        }
    }

    async fn generate_biblatex(
        &self,
        _ui: &dyn EditorUiContext,
        _id: &str,
        _csl: &CslItem,
    ) -> Option<String> {
        self.biblatex.clone()
    }

    fn warning_message(&self) -> Option<String> {
        self.warning.clone()
    }
}

fn source(id: &str, provider: &str) -> SharedSource {
    Arc::new(BibliographySource::new(
        CslItem::new(id, "article-journal").with_title(format!("Title of {}", id)),
        provider,
    ))
}

fn manager(providers: Vec<Arc<FakeProvider>>) -> BibliographyManager {
    let providers = providers
        .into_iter()
        .map(|p| p as Arc<dyn BibliographyDataProvider>)
        .collect();
    BibliographyManager::new(providers)
}

fn ids(sources: &[SharedSource]) -> Vec<&str> {
    sources.iter().map(|s| s.id()).collect()
}

fn ui() -> StaticUiContext {
    StaticUiContext::for_document("/work/paper.md")
}

fn doc(yaml: &str) -> MarkdownDocument {
    MarkdownDocument::new(format!("---\n{}\n---\n\nBody text.\n", yaml))
}

fn empty_doc() -> MarkdownDocument {
    MarkdownDocument::new("Body text.\n")
}

#[tokio::test]
async fn test_duplicate_ids_keep_local_copy() {
    let manager = manager(vec![
        Arc::new(FakeProvider::local().with_ids(&["a1", "b1"])),
        Arc::new(FakeProvider::remote().with_ids(&["a1", "c1"])),
    ]);
    manager.load(&ui(), &empty_doc()).await;

    assert!(manager.is_writable());
    let all = manager.all_sources();
    assert_eq!(ids(&all), vec!["a1", "b1", "c1"]);
    assert_eq!(all[0].provider_key, LOCAL_PROVIDER_KEY);
}

#[tokio::test]
async fn test_read_only_bibliography_hides_remote_sources() {
    let manager = manager(vec![
        Arc::new(
            FakeProvider::local()
                .with_ids(&["a1", "b1"])
                .with_file("/work/refs.ris", false),
        ),
        Arc::new(FakeProvider::remote().with_ids(&["c1"])),
    ]);
    manager.load(&ui(), &empty_doc()).await;

    assert!(!manager.is_writable());
    assert_eq!(ids(&manager.all_sources()), vec!["a1", "b1"]);
    assert!(manager.sources_for_provider(ZOTERO_PROVIDER_KEY).is_empty());
    assert!(manager
        .search(Some("title"), None, None)
        .iter()
        .all(|s| s.provider_key == LOCAL_PROVIDER_KEY));
}

#[tokio::test]
async fn test_search_before_load_is_empty() {
    let manager = manager(vec![Arc::new(FakeProvider::local().with_ids(&["smith"]))]);
    assert!(manager.search(Some("smith"), None, None).is_empty());
    assert!(manager.search(None, None, None).is_empty());
    assert!(manager.all_sources().is_empty());
}

#[tokio::test]
async fn test_unchanged_load_keeps_index() {
    let local = Arc::new(FakeProvider::local().with_ids(&["a1", "b1"]));
    let manager = manager(vec![local.clone()]);

    manager.load(&ui(), &empty_doc()).await;
    assert_eq!(manager.index_rebuild_count(), 1);
    let before = manager.all_sources();

    manager.load(&ui(), &empty_doc()).await;
    assert_eq!(manager.index_rebuild_count(), 1);
    let after = manager.all_sources();
    assert_eq!(before.len(), after.len());
    assert!(before.iter().zip(&after).all(|(a, b)| Arc::ptr_eq(a, b)));

    local.publish(&["a1", "b1", "z9"]);
    manager.load(&ui(), &empty_doc()).await;
    assert_eq!(manager.index_rebuild_count(), 2);
    assert_eq!(manager.all_sources().len(), 3);
    assert_eq!(local.loads.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_first_load_builds_even_without_changes() {
    let manager = manager(vec![Arc::new(FakeProvider::remote())]);
    manager.load(&ui(), &empty_doc()).await;
    assert!(manager.is_loaded());
    assert_eq!(manager.index_rebuild_count(), 1);
    assert_eq!(manager.load_generation(), 1);
}

#[tokio::test]
async fn test_fuzzy_search_is_capped_at_1000() {
    let sources = (0..1500)
        .map(|i| {
            Arc::new(BibliographySource::new(
                CslItem::new(format!("smith{}", i), "book")
                    .with_author(CslName::new("Smith", "Jane")),
                LOCAL_PROVIDER_KEY,
            ))
        })
        .collect();
    let manager = manager(vec![Arc::new(FakeProvider::local().with_sources(sources))]);
    manager.load(&ui(), &empty_doc()).await;

    assert_eq!(manager.all_sources().len(), 1500);
    assert_eq!(manager.search(Some("smith"), None, None).len(), 1000);
}

#[tokio::test]
async fn test_empty_query_returns_scoped_list() {
    let in_collection = |id: &str| {
        Arc::new(
            BibliographySource::new(CslItem::new(id, "book"), ZOTERO_PROVIDER_KEY)
                .with_collection("THESIS"),
        )
    };
    let remote = FakeProvider::remote().with_sources(vec![
        in_collection("r1"),
        source("r2", ZOTERO_PROVIDER_KEY),
        in_collection("r3"),
    ]);
    let manager = manager(vec![
        Arc::new(FakeProvider::local().with_ids(&["l1"])),
        Arc::new(remote),
    ]);
    manager.load(&ui(), &empty_doc()).await;

    let scoped = manager.search(None, Some(ZOTERO_PROVIDER_KEY), Some("THESIS"));
    assert_eq!(
        ids(&scoped),
        ids(&manager.sources_for_provider_collection(ZOTERO_PROVIDER_KEY, "THESIS"))
    );
    assert_eq!(ids(&scoped), vec!["r1", "r3"]);

    assert_eq!(
        ids(&manager.search(Some("  "), Some(ZOTERO_PROVIDER_KEY), None)),
        vec!["r1", "r2", "r3"]
    );
    assert_eq!(ids(&manager.search(None, None, None)), vec!["l1", "r1", "r2", "r3"]);
}

#[tokio::test]
async fn test_writability_follows_bibliography_files() {
    let manager = manager(vec![Arc::new(FakeProvider::local())]);

    manager.load(&ui(), &empty_doc()).await;
    assert!(manager.is_writable());

    manager.load(&ui(), &doc("bibliography: refs.ris")).await;
    assert!(!manager.is_writable());

    let mixed = doc("bibliography:\n  - refs.ris\n  - refs.bib");
    manager.load(&ui(), &mixed).await;
    assert!(manager.is_writable());
    assert_eq!(manager.writable_bibliography_files(&mixed, &ui()).len(), 1);
    assert_eq!(manager.bibliography_files(&mixed, &ui()).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_load_does_not_commit() {
    let local = Arc::new(FakeProvider::local());
    let manager = manager(vec![local.clone()]);

    let slow = doc("delay_ms: 500\nbibliography: refs.ris\nlocal: [old]");
    let fast = doc("bibliography: refs.bib\nlocal: [new]");
    let ui_slow = ui();
    let ui_fast = ui();
    tokio::join!(manager.load(&ui_slow, &slow), manager.load(&ui_fast, &fast));

    // Everything committed comes from the newer document
    assert_eq!(manager.load_generation(), 2);
    assert!(manager.is_writable());
    assert_eq!(ids(&manager.all_sources()), vec!["new"]);
    assert_eq!(ids(&manager.search(Some("title"), None, None)), vec!["new"]);
    assert_eq!(manager.index_rebuild_count(), 1);

    // The provider changed under the discarded load, so the next load
    // rebuilds even though no provider reports a change
    let quiet = doc("bibliography: refs.bib");
    manager.load(&ui(), &quiet).await;
    assert_eq!(manager.load_generation(), 3);
    assert_eq!(manager.index_rebuild_count(), 2);
    assert_eq!(ids(&manager.all_sources()), ids(&local.items()));

    manager.load(&ui(), &quiet).await;
    assert_eq!(manager.index_rebuild_count(), 2);
}

#[tokio::test]
async fn test_read_only_keeps_sources_of_any_local_provider() {
    let manager = manager(vec![
        Arc::new(
            FakeProvider::new("project", true)
                .with_ids(&["p1", "p2"])
                .with_file("/work/refs.ris", false),
        ),
        Arc::new(FakeProvider::remote().with_ids(&["r1"])),
    ]);
    manager.load(&ui(), &empty_doc()).await;

    assert!(!manager.is_writable());
    assert_eq!(ids(&manager.all_sources()), vec!["p1", "p2"]);
    assert_eq!(ids(&manager.search(Some("title"), None, None)), vec!["p1", "p2"]);
    assert_eq!(
        manager.find_id_in_local_bibliography("p2").map(|s| s.id().to_string()),
        Some("p2".to_string())
    );
}

#[tokio::test]
async fn test_ranked_search_within_provider() {
    let manager = manager(vec![
        Arc::new(FakeProvider::local().with_ids(&["knuth1984", "lamport1978"])),
        Arc::new(FakeProvider::remote().with_ids(&["knuth1968"])),
    ]);
    manager.load(&ui(), &empty_doc()).await;

    assert_eq!(
        ids(&manager.search(Some("knuth"), None, None)),
        vec!["knuth1984", "knuth1968"]
    );
    assert_eq!(
        ids(&manager.search(Some("knuth"), Some(ZOTERO_PROVIDER_KEY), None)),
        vec!["knuth1968"]
    );
}

#[tokio::test]
async fn test_local_lookups_ignore_remote_sources() {
    let with_doi = |id: &str, doi: &str, provider: &str| {
        Arc::new(BibliographySource::new(
            CslItem::new(id, "article-journal").with_doi(doi),
            provider,
        ))
    };
    let manager = manager(vec![
        Arc::new(FakeProvider::local().with_sources(vec![with_doi(
            "local1",
            "10.1000/ABC",
            LOCAL_PROVIDER_KEY,
        )])),
        Arc::new(FakeProvider::remote().with_sources(vec![with_doi(
            "remote1",
            "10.1000/remote",
            ZOTERO_PROVIDER_KEY,
        )])),
    ]);

    assert!(manager.find_id_in_local_bibliography("local1").is_none());
    manager.load(&ui(), &empty_doc()).await;

    assert_eq!(
        manager
            .find_doi_in_local_bibliography("https://doi.org/10.1000/abc")
            .map(|s| s.id().to_string()),
        Some("local1".to_string())
    );
    assert!(manager.find_doi_in_local_bibliography("10.1000/remote").is_none());
    assert!(manager.find_id_in_local_bibliography("remote1").is_none());
    assert!(manager.find_id_in_local_bibliography("local1").is_some());
}

#[tokio::test]
async fn test_generate_biblatex_prefers_provider_export() {
    let mut remote = FakeProvider::remote();
    remote.biblatex = Some("@book{exported}".to_string());
    let manager = manager(vec![Arc::new(FakeProvider::local()), Arc::new(remote)]);
    let csl = CslItem::new("x", "book").with_title("A Book");

    let exported = manager
        .generate_biblatex(&ui(), "x", &csl, Some(ZOTERO_PROVIDER_KEY))
        .await;
    assert_eq!(exported, "@book{exported}");

    let generic = manager
        .generate_biblatex(&ui(), "x", &csl, Some(LOCAL_PROVIDER_KEY))
        .await;
    assert!(generic.starts_with("@book{x,"));
    assert!(generic.contains("title = {A Book}"));

    let unknown_provider = manager.generate_biblatex(&ui(), "x", &csl, Some("nope")).await;
    assert_eq!(unknown_provider, generic);
}

#[tokio::test]
async fn test_first_warning_in_registration_order() {
    let manager = manager(vec![
        Arc::new(FakeProvider::local()),
        Arc::new(FakeProvider::new("first", false).with_warning("first warning")),
        Arc::new(FakeProvider::new("second", false).with_warning("second warning")),
    ]);
    assert_eq!(manager.warning().as_deref(), Some("first warning"));
    assert_eq!(
        manager.warning_for_provider("second").as_deref(),
        Some("second warning")
    );
    assert!(manager.warning_for_provider(LOCAL_PROVIDER_KEY).is_none());
}

#[tokio::test]
async fn test_collection_tree_from_provider() {
    let mut remote = FakeProvider::remote();
    remote.collections = vec![
        BibliographyCollection::new("Thesis", "T", ZOTERO_PROVIDER_KEY),
        BibliographyCollection::new("Chapter 1", "C1", ZOTERO_PROVIDER_KEY).with_parent("T"),
    ];
    let manager = manager(vec![Arc::new(FakeProvider::local()), Arc::new(remote)]);

    let tree = manager.collection_tree(ZOTERO_PROVIDER_KEY, &empty_doc(), &ui());
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].children[0].collection.name, "Chapter 1");
    assert!(manager
        .collections("missing", &empty_doc(), &ui())
        .is_empty());
    assert_eq!(manager.local_providers().len(), 1);
    assert!(manager.provider(ZOTERO_PROVIDER_KEY).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_debounced_search_runs_latest_query() {
    let mut config = CitationsConfig::default();
    config.search.min_query_interval_ms = 200;
    let provider: Arc<dyn BibliographyDataProvider> =
        Arc::new(FakeProvider::local().with_ids(&["smith2020", "jones2021"]));
    let manager = BibliographyManager::with_config(vec![provider], &config);
    manager.load(&ui(), &empty_doc()).await;

    let (first, second) = tokio::join!(
        manager.search_debounced(Some("smi"), None, None),
        manager.search_debounced(Some("jones"), None, None)
    );
    assert!(first.is_none());
    assert_eq!(ids(&second.unwrap()), vec!["jones2021"]);
}
