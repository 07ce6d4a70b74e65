//! Zotero provider
//!
//! API docs: https://www.zotero.org/support/dev/web_api/v3/basics
//!
//! The document's `zotero:` YAML key selects what is visible:
//! - `false` disables the provider for the document
//! - `true` (or no key) shows the whole library
//! - a collection name or list of names restricts to those collections and
//!   their descendants

use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use impress_csl::CslItem;
use serde::Deserialize;
use serde_yaml::Value;

use crate::config::ZoteroConfig;
use crate::document::{yaml_string_list, EditorDocument, EditorUiContext, ParsedYaml};
use crate::error::{ProviderError, Result};
use crate::http::{HttpClient, HttpError, HttpResponse};
use crate::provider::{BibliographyDataProvider, LoadContext};
use crate::source::{
    BibliographyCollection, BibliographyFile, BibliographySource, SharedSource,
    ZOTERO_PROVIDER_KEY,
};

/// Per-document Zotero selection
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ZoteroSetting {
    Disabled,
    #[default]
    AllCollections,
    Collections(Vec<String>),
}

impl ZoteroSetting {
    /// Read the `zotero` key; the last block declaring it wins
    pub fn from_yaml_blocks(blocks: &[ParsedYaml]) -> Self {
        match blocks.iter().rev().find_map(|b| b.get("zotero")) {
            None => ZoteroSetting::AllCollections,
            Some(Value::Bool(false)) => ZoteroSetting::Disabled,
            Some(Value::Bool(true)) => ZoteroSetting::AllCollections,
            Some(value) => {
                let names = yaml_string_list(value);
                if names.is_empty() {
                    ZoteroSetting::AllCollections
                } else {
                    ZoteroSetting::Collections(names)
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoteroCollection {
    pub key: String,
    pub name: String,
    pub parent_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoteroItem {
    pub key: String,
    pub collection_keys: Vec<String>,
    /// CSL record with `id` set to the citation key (or the item key)
    pub csl: CslItem,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoteroLibrary {
    pub version: u64,
    pub collections: Vec<ZoteroCollection>,
    pub items: Vec<ZoteroItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ZoteroLibraryStatus {
    /// Library has not changed since the given version
    Unchanged,
    Updated(ZoteroLibrary),
}

/// Access to a Zotero library
#[async_trait]
pub trait ZoteroServer: Send + Sync {
    /// Fetch the library unless it is still at `since_version`
    async fn library(&self, since_version: Option<u64>) -> Result<ZoteroLibraryStatus>;

    /// BibLaTeX for a citation key via Better BibTeX, if available
    async fn better_bibtex_export(&self, _citation_key: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

#[derive(Default)]
struct ZoteroState {
    library: Option<ZoteroLibrary>,
    setting: Option<ZoteroSetting>,
    items: Vec<SharedSource>,
    collections: Vec<BibliographyCollection>,
    warning: Option<String>,
}

pub struct ZoteroProvider {
    server: Option<Arc<dyn ZoteroServer>>,
    state: RwLock<ZoteroState>,
}

impl ZoteroProvider {
    pub fn new(server: Arc<dyn ZoteroServer>) -> Self {
        Self {
            server: Some(server),
            state: RwLock::new(ZoteroState::default()),
        }
    }

    /// Provider with no library connection; it never has items
    pub fn unconfigured() -> Self {
        Self {
            server: None,
            state: RwLock::new(ZoteroState::default()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.server.is_some()
    }

    fn state(&self) -> std::sync::RwLockReadGuard<'_, ZoteroState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn state_mut(&self) -> std::sync::RwLockWriteGuard<'_, ZoteroState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop the visible items; true if there were any
    fn clear_view(&self, setting: ZoteroSetting) -> bool {
        let mut state = self.state_mut();
        let had_items = !state.items.is_empty() || !state.collections.is_empty();
        state.items.clear();
        state.collections.clear();
        state.setting = Some(setting);
        had_items
    }
}

/// Items and collections visible under a setting, plus any warning
fn select_view(
    library: &ZoteroLibrary,
    setting: &ZoteroSetting,
) -> (Vec<SharedSource>, Vec<BibliographyCollection>, Option<String>) {
    let (visible, warning) = match setting {
        ZoteroSetting::Disabled => (HashSet::new(), None),
        ZoteroSetting::AllCollections => (
            library
                .collections
                .iter()
                .map(|c| c.key.clone())
                .collect::<HashSet<_>>(),
            None,
        ),
        ZoteroSetting::Collections(names) => {
            let mut selected = HashSet::new();
            let mut missing = Vec::new();
            for name in names {
                let roots: Vec<&ZoteroCollection> = library
                    .collections
                    .iter()
                    .filter(|c| c.name.eq_ignore_ascii_case(name))
                    .collect();
                if roots.is_empty() {
                    missing.push(name.as_str());
                }
                for root in roots {
                    collect_descendants(library, &root.key, &mut selected);
                }
            }
            let warning = (!missing.is_empty())
                .then(|| format!("Zotero collections not found: {}", missing.join(", ")));
            (selected, warning)
        }
    };

    let restrict = matches!(setting, ZoteroSetting::Collections(_));
    let items = library
        .items
        .iter()
        .filter(|item| {
            !restrict || item.collection_keys.iter().any(|k| visible.contains(k))
        })
        .map(|item| {
            let mut source = BibliographySource::new(item.csl.clone(), ZOTERO_PROVIDER_KEY);
            source.collection_keys = item
                .collection_keys
                .iter()
                .filter(|k| visible.contains(*k))
                .cloned()
                .collect();
            Arc::new(source)
        })
        .collect();

    let collections = library
        .collections
        .iter()
        .filter(|c| visible.contains(&c.key))
        .map(|c| {
            let collection = BibliographyCollection::new(&c.name, &c.key, ZOTERO_PROVIDER_KEY);
            // Selected roots become tree roots
            match &c.parent_key {
                Some(parent) if visible.contains(parent) => collection.with_parent(parent),
                _ => collection,
            }
        })
        .collect();

    (items, collections, warning)
}

fn collect_descendants(library: &ZoteroLibrary, key: &str, selected: &mut HashSet<String>) {
    if !selected.insert(key.to_string()) {
        return;
    }
    for child in library
        .collections
        .iter()
        .filter(|c| c.parent_key.as_deref() == Some(key))
    {
        collect_descendants(library, &child.key, selected);
    }
}

#[async_trait]
impl BibliographyDataProvider for ZoteroProvider {
    fn key(&self) -> &str {
        ZOTERO_PROVIDER_KEY
    }

    fn name(&self) -> &str {
        "Zotero"
    }

    async fn load(&self, context: &LoadContext) -> bool {
        let setting = ZoteroSetting::from_yaml_blocks(&context.yaml_blocks);

        let Some(server) = &self.server else {
            return self.clear_view(setting);
        };
        if setting == ZoteroSetting::Disabled {
            return self.clear_view(setting);
        }

        let since = self.state().library.as_ref().map(|l| l.version);
        let status = match server.library(since).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("Zotero sync failed: {}", e);
                self.state_mut().warning = Some(format!("Unable to sync Zotero library: {}", e));
                return false;
            }
        };

        let mut state = self.state_mut();
        match status {
            ZoteroLibraryStatus::Unchanged => {
                if state.setting.as_ref() == Some(&setting) && state.library.is_some() {
                    // Sync recovered; keep collection warnings from the last view
                    if state
                        .warning
                        .as_deref()
                        .is_some_and(|w| w.starts_with("Unable to sync"))
                    {
                        state.warning = None;
                    }
                    return false;
                }
            }
            ZoteroLibraryStatus::Updated(library) => {
                tracing::debug!(
                    "Zotero library at version {} ({} items)",
                    library.version,
                    library.items.len()
                );
                state.library = Some(library);
            }
        }

        let Some(library) = state.library.as_ref() else {
            return false;
        };
        let (items, collections, warning) = select_view(library, &setting);
        state.items = items;
        state.collections = collections;
        state.warning = warning;
        state.setting = Some(setting);
        true
    }

    fn collections(
        &self,
        _doc: &dyn EditorDocument,
        _ui: &dyn EditorUiContext,
    ) -> Vec<BibliographyCollection> {
        self.state().collections.clone()
    }

    fn items(&self) -> Vec<SharedSource> {
        self.state().items.clone()
    }

    fn bibliography_paths(
        &self,
        _doc: &dyn EditorDocument,
        _ui: &dyn EditorUiContext,
    ) -> Vec<BibliographyFile> {
        Vec::new()
    }

    async fn generate_biblatex(
        &self,
        _ui: &dyn EditorUiContext,
        id: &str,
        _csl: &CslItem,
    ) -> Option<String> {
        let server = self.server.as_ref()?;
        match server.better_bibtex_export(id).await {
            Ok(biblatex) => biblatex,
            Err(e) => {
                tracing::debug!("Better BibTeX export of {} unavailable: {}", id, e);
                None
            }
        }
    }

    fn warning_message(&self) -> Option<String> {
        self.state().warning.clone()
    }
}

// Web API

#[derive(Debug, Deserialize)]
struct RawCollection {
    key: String,
    data: RawCollectionData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCollectionData {
    name: String,
    /// `false` for top-level collections, otherwise the parent key
    #[serde(default)]
    parent_collection: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    key: String,
    #[serde(default)]
    data: RawItemData,
    csljson: Option<CslItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawItemData {
    item_type: String,
    collections: Vec<String>,
    citation_key: Option<String>,
    extra: Option<String>,
}

/// Parse one page of `/collections`
pub fn parse_collections_page(json: &str) -> Result<Vec<ZoteroCollection>> {
    let raw: Vec<RawCollection> =
        serde_json::from_str(json).map_err(|e| ProviderError::parse("Zotero collections", e))?;
    Ok(raw
        .into_iter()
        .map(|c| ZoteroCollection {
            key: c.key,
            name: c.data.name,
            parent_key: c.data.parent_collection.as_str().map(str::to_string),
        })
        .collect())
}

/// Parse one page of `/items?include=csljson,data`.
///
/// Attachments and notes are skipped. The citation key comes from CSL
/// `citation-key`, then the item's `citationKey`, then a `Citation Key:`
/// line in `extra`, falling back to the Zotero item key.
pub fn parse_items_page(json: &str) -> Result<Vec<ZoteroItem>> {
    let raw: Vec<RawItem> =
        serde_json::from_str(json).map_err(|e| ProviderError::parse("Zotero items", e))?;
    Ok(raw
        .into_iter()
        .filter(|item| !matches!(item.data.item_type.as_str(), "attachment" | "note"))
        .filter_map(|item| {
            let mut csl = item.csljson?;
            let citation_key = csl
                .extra_str("citation-key")
                .map(str::to_string)
                .or(item.data.citation_key.filter(|k| !k.is_empty()))
                .or_else(|| item.data.extra.as_deref().and_then(citation_key_from_extra))
                .unwrap_or_else(|| item.key.clone());
            csl.id = citation_key;
            Some(ZoteroItem {
                key: item.key,
                collection_keys: item.data.collections,
                csl,
            })
        })
        .collect())
}

fn citation_key_from_extra(extra: &str) -> Option<String> {
    extra.lines().find_map(|line| {
        let (label, value) = line.split_once(':')?;
        let value = value.trim();
        (label.trim().eq_ignore_ascii_case("citation key") && !value.is_empty())
            .then(|| value.to_string())
    })
}

/// Zotero web API v3 client
pub struct ZoteroWebServer {
    client: HttpClient,
    base_url: String,
    user_id: String,
    api_key: String,
    page_size: u32,
    better_bibtex_url: Option<String>,
}

impl ZoteroWebServer {
    pub fn new(config: &ZoteroConfig) -> Result<Self> {
        let (Some(user_id), Some(api_key)) = (&config.user_id, &config.api_key) else {
            return Err(ProviderError::Unavailable(
                "Zotero user_id and api_key are not configured".to_string(),
            ));
        };

        let base = url::Url::parse(&config.base_url).map_err(|_| HttpError::InvalidUrl {
            url: config.base_url.clone(),
        })?;

        let client = HttpClient::new(
            concat!("imprint-citations/", env!("CARGO_PKG_VERSION")),
            Duration::from_secs(config.timeout_secs),
        )?;

        Ok(Self {
            client,
            base_url: base.as_str().trim_end_matches('/').to_string(),
            user_id: user_id.clone(),
            api_key: api_key.clone(),
            page_size: config.page_size.clamp(1, 100),
            better_bibtex_url: config
                .better_bibtex
                .then(|| config.better_bibtex_url.clone()),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/users/{}/{}", self.base_url, self.user_id, path)
    }

    fn headers(&self, since_version: Option<u64>) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("Zotero-API-Version", "3".to_string()),
            ("Zotero-API-Key", self.api_key.clone()),
        ];
        if let Some(version) = since_version {
            headers.push(("If-Modified-Since-Version", version.to_string()));
        }
        headers
    }

    /// Fetch every page of a listing. `None` means 304 Not Modified.
    async fn fetch_all(
        &self,
        path: &str,
        extra_params: &[(&str, String)],
        since_version: Option<u64>,
    ) -> Result<Option<(Vec<String>, Option<u64>)>> {
        let url = self.endpoint(path);
        let headers = self.headers(since_version);
        let mut pages = Vec::new();
        let mut version = None;
        let mut start = 0usize;

        loop {
            let mut params = vec![
                ("format", "json".to_string()),
                ("start", start.to_string()),
                ("limit", self.page_size.to_string()),
            ];
            params.extend(extra_params.iter().cloned());

            let response = self.client.get(&url, &params, &headers).await?;
            if response.status == 304 {
                return Ok(None);
            }
            if !response.is_success() {
                return Err(HttpError::Status {
                    status: response.status,
                }
                .into());
            }

            if version.is_none() {
                version = header_number(&response, "Last-Modified-Version");
            }
            let total = header_number(&response, "Total-Results").unwrap_or(0) as usize;
            pages.push(response.body);

            start += self.page_size as usize;
            if start >= total {
                break;
            }
        }

        Ok(Some((pages, version)))
    }
}

fn header_number(response: &HttpResponse, name: &str) -> Option<u64> {
    response.header(name).and_then(|v| v.trim().parse().ok())
}

#[async_trait]
impl ZoteroServer for ZoteroWebServer {
    async fn library(&self, since_version: Option<u64>) -> Result<ZoteroLibraryStatus> {
        let include = [("include", "csljson,data".to_string())];
        let Some((item_pages, version)) = self.fetch_all("items", &include, since_version).await?
        else {
            return Ok(ZoteroLibraryStatus::Unchanged);
        };

        let mut items = Vec::new();
        for page in &item_pages {
            items.extend(parse_items_page(page)?);
        }

        let mut collections = Vec::new();
        if let Some((pages, _)) = self.fetch_all("collections", &[], None).await? {
            for page in &pages {
                collections.extend(parse_collections_page(page)?);
            }
        }

        Ok(ZoteroLibraryStatus::Updated(ZoteroLibrary {
            version: version.unwrap_or(0),
            collections,
            items,
        }))
    }

    async fn better_bibtex_export(&self, citation_key: &str) -> Result<Option<String>> {
        let Some(url) = &self.better_bibtex_url else {
            return Ok(None);
        };

        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "item.export",
            "params": [[citation_key], "Better BibLaTeX"],
        });
        let response = self.client.post_json(url, &request).await?;
        if !response.is_success() {
            return Err(HttpError::Status {
                status: response.status,
            }
            .into());
        }

        let reply: serde_json::Value = serde_json::from_str(&response.body)
            .map_err(|e| ProviderError::parse("Better BibTeX", e))?;
        // Older plugin versions wrap the text in [status, type, text]
        let text = match &reply["result"] {
            serde_json::Value::String(text) => Some(text.clone()),
            serde_json::Value::Array(parts) => {
                parts.iter().rev().find_map(|p| p.as_str()).map(str::to_string)
            }
            _ => None,
        };
        Ok(text.filter(|t| !t.trim().is_empty()))
    }
}
