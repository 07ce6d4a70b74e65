//! Zotero provider against an in-memory library

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use impress_csl::CslItem;
use imprint_citations::provider::zotero::{
    ZoteroCollection, ZoteroItem, ZoteroLibrary, ZoteroLibraryStatus,
};
use imprint_citations::provider::{ZoteroProvider, ZoteroServer};
use imprint_citations::{
    BibliographyDataProvider, BibliographyManager, LoadContext, MarkdownDocument, ProviderError,
    StaticUiContext, ZOTERO_PROVIDER_KEY,
};

/// Server replaying scripted responses and recording the versions asked for
#[derive(Default)]
struct ScriptedServer {
    responses: Mutex<VecDeque<Result<ZoteroLibraryStatus, ProviderError>>>,
    requested_versions: Mutex<Vec<Option<u64>>>,
}

impl ScriptedServer {
    fn then(self, response: Result<ZoteroLibraryStatus, ProviderError>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }
}

#[async_trait]
impl ZoteroServer for ScriptedServer {
    async fn library(
        &self,
        since_version: Option<u64>,
    ) -> imprint_citations::Result<ZoteroLibraryStatus> {
        self.requested_versions.lock().unwrap().push(since_version);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(ZoteroLibraryStatus::Unchanged))
    }

    async fn better_bibtex_export(
        &self,
        citation_key: &str,
    ) -> imprint_citations::Result<Option<String>> {
        Ok((citation_key == "smith2020").then(|| "@article{smith2020}".to_string()))
    }
}

fn collection(key: &str, name: &str, parent: Option<&str>) -> ZoteroCollection {
    ZoteroCollection {
        key: key.to_string(),
        name: name.to_string(),
        parent_key: parent.map(str::to_string),
    }
}

fn item(id: &str, collections: &[&str]) -> ZoteroItem {
    ZoteroItem {
        key: id.to_uppercase(),
        collection_keys: collections.iter().map(|c| c.to_string()).collect(),
        csl: CslItem::new(id, "article-journal").with_title(format!("About {}", id)),
    }
}

fn library(version: u64) -> ZoteroLibrary {
    ZoteroLibrary {
        version,
        collections: vec![
            collection("THESIS", "Thesis", None),
            collection("CH1", "Chapter 1", Some("THESIS")),
            collection("MISC", "Misc", None),
        ],
        items: vec![
            item("smith2020", &["CH1"]),
            item("jones2021", &["MISC"]),
            item("loose2019", &[]),
        ],
    }
}

fn context(yaml: &str) -> LoadContext {
    let doc = MarkdownDocument::new(format!("---\n{}\n---\n", yaml));
    LoadContext::from_document(&doc, &StaticUiContext::for_document("/work/paper.md"))
}

fn ids(provider: &ZoteroProvider) -> Vec<String> {
    provider.items().iter().map(|s| s.id().to_string()).collect()
}

#[tokio::test]
async fn test_version_tracking() {
    let server = Arc::new(
        ScriptedServer::default()
            .then(Ok(ZoteroLibraryStatus::Updated(library(7))))
            .then(Ok(ZoteroLibraryStatus::Unchanged)),
    );
    let provider = ZoteroProvider::new(server.clone());

    assert!(provider.load(&context("title: x")).await);
    assert_eq!(ids(&provider), vec!["smith2020", "jones2021", "loose2019"]);
    assert!(provider.items().iter().all(|s| s.provider_key == ZOTERO_PROVIDER_KEY));

    assert!(!provider.load(&context("title: x")).await);
    assert_eq!(
        *server.requested_versions.lock().unwrap(),
        vec![None, Some(7)]
    );
}

#[tokio::test]
async fn test_named_collection_includes_descendants() {
    let server = ScriptedServer::default().then(Ok(ZoteroLibraryStatus::Updated(library(1))));
    let provider = ZoteroProvider::new(Arc::new(server));

    assert!(provider.load(&context("zotero: Thesis")).await);
    assert_eq!(ids(&provider), vec!["smith2020"]);
    assert!(provider.items()[0].in_collection("CH1"));
    assert!(provider.warning_message().is_none());

    // Changing the selection re-filters without a new download
    assert!(provider.load(&context("zotero: [Misc, Nope]")).await);
    assert_eq!(ids(&provider), vec!["jones2021"]);
    assert!(provider.warning_message().unwrap().contains("Nope"));
}

#[tokio::test]
async fn test_network_failure_keeps_stale_items() {
    let server = ScriptedServer::default()
        .then(Ok(ZoteroLibraryStatus::Updated(library(3))))
        .then(Err(ProviderError::Unavailable("offline".to_string())))
        .then(Ok(ZoteroLibraryStatus::Unchanged));
    let provider = ZoteroProvider::new(Arc::new(server));

    assert!(provider.load(&context("title: x")).await);
    assert!(!provider.load(&context("title: x")).await);
    assert_eq!(ids(&provider).len(), 3);
    assert!(provider.warning_message().unwrap().contains("offline"));

    assert!(!provider.load(&context("title: x")).await);
    assert!(provider.warning_message().is_none());
}

#[tokio::test]
async fn test_disabled_by_document() {
    let server = ScriptedServer::default().then(Ok(ZoteroLibraryStatus::Updated(library(1))));
    let provider = ZoteroProvider::new(Arc::new(server));

    assert!(provider.load(&context("title: x")).await);
    assert!(provider.load(&context("zotero: false")).await);
    assert!(provider.items().is_empty());
    assert!(!provider.load(&context("zotero: false")).await);
}

#[tokio::test]
async fn test_unconfigured_provider_is_empty() {
    let provider = ZoteroProvider::unconfigured();
    assert!(!provider.is_configured());
    assert!(!provider.load(&context("title: x")).await);
    assert!(provider.items().is_empty());
}

#[tokio::test]
async fn test_manager_uses_better_bibtex_export() {
    let server = ScriptedServer::default().then(Ok(ZoteroLibraryStatus::Updated(library(1))));
    let zotero: Arc<dyn BibliographyDataProvider> =
        Arc::new(ZoteroProvider::new(Arc::new(server)));
    let manager = BibliographyManager::new(vec![zotero]);
    let ui = StaticUiContext::for_document("/work/paper.md");

    let smith = CslItem::new("smith2020", "article-journal");
    let exported = manager
        .generate_biblatex(&ui, "smith2020", &smith, Some(ZOTERO_PROVIDER_KEY))
        .await;
    assert_eq!(exported, "@article{smith2020}");

    let other = CslItem::new("jones2021", "article-journal");
    let fallback = manager
        .generate_biblatex(&ui, "jones2021", &other, Some(ZOTERO_PROVIDER_KEY))
        .await;
    assert!(fallback.starts_with("@article{jones2021"));
}

#[tokio::test]
async fn test_collection_tree_through_manager() {
    let server = ScriptedServer::default().then(Ok(ZoteroLibraryStatus::Updated(library(1))));
    let zotero: Arc<dyn BibliographyDataProvider> =
        Arc::new(ZoteroProvider::new(Arc::new(server)));
    let manager = BibliographyManager::new(vec![zotero]);
    let doc = MarkdownDocument::new("Body\n");
    let ui = StaticUiContext::for_document("/work/paper.md");

    manager.load(&ui, &doc).await;
    let tree = manager.collection_tree(ZOTERO_PROVIDER_KEY, &doc, &ui);
    let roots: Vec<&str> = tree.iter().map(|n| n.collection.name.as_str()).collect();
    assert_eq!(roots, vec!["Thesis", "Misc"]);
    assert_eq!(tree[0].children[0].collection.key, "CH1");
    assert_eq!(
        manager.sources_for_provider_collection(ZOTERO_PROVIDER_KEY, "MISC").len(),
        1
    );
}
