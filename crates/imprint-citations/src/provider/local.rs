//! Local bibliography provider
//!
//! Sources come from the files named by the document's `bibliography:` key,
//! the project's bibliographies and inline `references:` blocks.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use async_trait::async_trait;
use impress_csl::{read_bibliography, BibliographyFormat, CslError, CslItem};

use crate::config::LocalConfig;
use crate::document::{yaml_string_list, EditorDocument, EditorUiContext, ParsedYaml};
use crate::error::{ProviderError, Result};
use crate::provider::{BibliographyDataProvider, LoadContext};
use crate::source::{
    BibliographyCollection, BibliographyFile, BibliographySource, SharedSource,
    LOCAL_PROVIDER_KEY,
};

/// Modification stamp used for change detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub modified: Option<SystemTime>,
    pub len: u64,
    pub read_only: bool,
}

/// Document-processing backend for local bibliography files
#[async_trait]
pub trait BibliographyServer: Send + Sync {
    /// Stamp of the file, `None` if it does not exist
    async fn file_stamp(&self, path: &Path) -> Option<FileStamp>;

    async fn read_bibliography(&self, path: &Path) -> Result<Vec<CslItem>>;

    /// BibLaTeX for a CSL record, when the backend can produce it
    async fn csl_to_biblatex(&self, _id: &str, _csl: &CslItem) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Reads BibTeX, CSL-JSON and CSL-YAML files from disk
#[derive(Debug, Clone, Default)]
pub struct FileBibliographyServer;

#[async_trait]
impl BibliographyServer for FileBibliographyServer {
    async fn file_stamp(&self, path: &Path) -> Option<FileStamp> {
        let metadata = tokio::fs::metadata(path).await.ok()?;
        Some(FileStamp {
            modified: metadata.modified().ok(),
            len: metadata.len(),
            read_only: metadata.permissions().readonly(),
        })
    }

    async fn read_bibliography(&self, path: &Path) -> Result<Vec<CslItem>> {
        let format = BibliographyFormat::from_path(path).ok_or_else(|| {
            ProviderError::parse(
                path.display().to_string(),
                CslError::UnsupportedFormat(path.display().to_string()),
            )
        })?;

        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProviderError::io(path, e))?;

        let contents = read_bibliography(&text, format)
            .map_err(|e| ProviderError::parse(path.display().to_string(), e))?;

        if !contents.errors.is_empty() {
            tracing::warn!(
                "Skipped {} malformed entries in {} (first at line {}: {})",
                contents.errors.len(),
                path.display(),
                contents.errors[0].line,
                contents.errors[0].message
            );
        }

        Ok(contents.items)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Fingerprint {
    files: Vec<(PathBuf, Option<FileStamp>)>,
    references: String,
}

#[derive(Default)]
struct LocalState {
    fingerprint: Option<Fingerprint>,
    /// Read-only files seen by the last load
    read_only: HashSet<PathBuf>,
    items: Vec<SharedSource>,
    warning: Option<String>,
}

pub struct LocalBibliographyProvider {
    server: Arc<dyn BibliographyServer>,
    writable_extensions: Vec<String>,
    state: RwLock<LocalState>,
}

impl LocalBibliographyProvider {
    pub fn new(server: Arc<dyn BibliographyServer>) -> Self {
        Self::with_config(server, &LocalConfig::default())
    }

    pub fn with_config(server: Arc<dyn BibliographyServer>, config: &LocalConfig) -> Self {
        Self {
            server,
            writable_extensions: config
                .writable_extensions
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
            state: RwLock::new(LocalState::default()),
        }
    }

    /// Provider reading from the file system
    pub fn from_files(config: &LocalConfig) -> Self {
        Self::with_config(Arc::new(FileBibliographyServer), config)
    }

    fn resolve_files(&self, context: &LoadContext) -> Vec<BibliographyFile> {
        let base_dir = context.base_dir();
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        let declared = context
            .yaml_blocks
            .iter()
            .filter_map(|block| block.get("bibliography"))
            .flat_map(yaml_string_list)
            .map(|path| (path, false))
            .chain(
                context
                    .project_bibliographies
                    .iter()
                    .map(|path| (path.clone(), true)),
            );

        for (display_path, is_project) in declared {
            let full_path = resolve_path(&base_dir, &display_path);
            if !seen.insert(full_path.clone()) {
                continue;
            }
            let writable = self.is_writable_path(&full_path);
            files.push(BibliographyFile {
                display_path,
                full_path,
                writable,
                is_project,
            });
        }

        files
    }

    /// Writable by extension, unless the last load found the file read-only
    fn is_writable_path(&self, path: &Path) -> bool {
        let extension_ok = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| self.writable_extensions.contains(&e.to_lowercase()))
            .unwrap_or(false);
        extension_ok && !self.state().read_only.contains(path)
    }

    async fn read_all(
        &self,
        files: &[BibliographyFile],
        fingerprint: &Fingerprint,
    ) -> Result<Vec<SharedSource>> {
        let mut sources = Vec::new();
        for (file, (_, stamp)) in files.iter().zip(&fingerprint.files) {
            if stamp.is_none() {
                tracing::debug!("Bibliography {} does not exist yet", file.display_path);
                continue;
            }
            let items = self.server.read_bibliography(&file.full_path).await?;
            let collection_key = collection_key(file);
            sources.extend(items.into_iter().map(|csl| {
                Arc::new(
                    BibliographySource::new(csl, LOCAL_PROVIDER_KEY)
                        .with_collection(collection_key.clone()),
                )
            }));
        }
        Ok(sources)
    }

    fn state(&self) -> std::sync::RwLockReadGuard<'_, LocalState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }
}

fn resolve_path(base_dir: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn collection_key(file: &BibliographyFile) -> String {
    file.full_path.to_string_lossy().into_owned()
}

/// Inline `references:` from every block, with the YAML text for fingerprinting
fn inline_references(blocks: &[ParsedYaml]) -> (Vec<CslItem>, String) {
    let mut items = Vec::new();
    let mut text = String::new();
    for references in blocks.iter().filter_map(|b| b.get("references")) {
        if let Ok(yaml) = serde_yaml::to_string(references) {
            text.push_str(&yaml);
        }
        match serde_yaml::from_value::<Vec<CslItem>>(references.clone()) {
            Ok(parsed) => items.extend(parsed),
            Err(e) => tracing::warn!("Ignoring invalid inline references: {}", e),
        }
    }
    (items, text)
}

#[async_trait]
impl BibliographyDataProvider for LocalBibliographyProvider {
    fn key(&self) -> &str {
        LOCAL_PROVIDER_KEY
    }

    fn name(&self) -> &str {
        "Bibliography"
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn load(&self, context: &LoadContext) -> bool {
        let files = self.resolve_files(context);
        let (references, references_text) = inline_references(&context.yaml_blocks);

        let mut stamps = Vec::with_capacity(files.len());
        for file in &files {
            stamps.push((
                file.full_path.clone(),
                self.server.file_stamp(&file.full_path).await,
            ));
        }
        let fingerprint = Fingerprint {
            files: stamps,
            references: references_text,
        };

        {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            state.read_only = fingerprint
                .files
                .iter()
                .filter(|(_, stamp)| stamp.is_some_and(|s| s.read_only))
                .map(|(path, _)| path.clone())
                .collect();
            if state.fingerprint.as_ref() == Some(&fingerprint) {
                return false;
            }
        }

        let mut sources = match self.read_all(&files, &fingerprint).await {
            Ok(sources) => sources,
            Err(e) => {
                tracing::warn!("Local bibliography load failed: {}", e);
                let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
                state.warning = Some(e.to_string());
                return false;
            }
        };
        sources.extend(
            references
                .into_iter()
                .map(|csl| Arc::new(BibliographySource::new(csl, LOCAL_PROVIDER_KEY))),
        );

        tracing::debug!(
            "Loaded {} local sources from {} bibliographies",
            sources.len(),
            files.len()
        );

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.fingerprint = Some(fingerprint);
        state.items = sources;
        state.warning = None;
        true
    }

    fn collections(
        &self,
        doc: &dyn EditorDocument,
        ui: &dyn EditorUiContext,
    ) -> Vec<BibliographyCollection> {
        self.bibliography_paths(doc, ui)
            .iter()
            .map(|file| {
                let name = file
                    .full_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| file.display_path.clone());
                BibliographyCollection::new(name, collection_key(file), LOCAL_PROVIDER_KEY)
            })
            .collect()
    }

    fn items(&self) -> Vec<SharedSource> {
        self.state().items.clone()
    }

    fn bibliography_paths(
        &self,
        doc: &dyn EditorDocument,
        ui: &dyn EditorUiContext,
    ) -> Vec<BibliographyFile> {
        self.resolve_files(&LoadContext::from_document(doc, ui))
    }

    async fn generate_biblatex(
        &self,
        _ui: &dyn EditorUiContext,
        id: &str,
        csl: &CslItem,
    ) -> Option<String> {
        match self.server.csl_to_biblatex(id, csl).await {
            Ok(biblatex) => biblatex,
            Err(e) => {
                tracing::warn!("BibLaTeX generation for {} failed: {}", id, e);
                None
            }
        }
    }

    fn warning_message(&self) -> Option<String> {
        self.state().warning.clone()
    }
}
