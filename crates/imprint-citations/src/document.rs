//! Host document seam
//!
//! The manager only needs three things from the editor: the YAML blocks
//! embedded in the document, the document's path and the default resource
//! directory used to resolve relative bibliography paths.

use std::path::{Path, PathBuf};

use serde_yaml::Value;

/// One parsed YAML block from a document
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedYaml {
    /// Source text between the delimiters
    pub yaml_code: String,
    pub yaml: Value,
}

impl ParsedYaml {
    /// Look up a top-level key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.yaml.get(key)
    }
}

/// A document open in the editor
pub trait EditorDocument: Send + Sync {
    /// YAML front matter and any other `---` delimited metadata blocks
    fn yaml_nodes(&self) -> Vec<ParsedYaml>;
}

/// Editor environment queried while resolving bibliographies
pub trait EditorUiContext: Send + Sync {
    /// Path of the active document, if it has been saved
    fn document_path(&self) -> Option<PathBuf>;

    /// Directory relative paths resolve against for unsaved documents
    fn default_resource_dir(&self) -> PathBuf;

    /// Bibliographies declared by the enclosing project
    fn project_bibliographies(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Plain Markdown text
#[derive(Debug, Clone, Default)]
pub struct MarkdownDocument {
    text: String,
}

impl MarkdownDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl EditorDocument for MarkdownDocument {
    fn yaml_nodes(&self) -> Vec<ParsedYaml> {
        parse_yaml_nodes(&self.text)
    }
}

/// UI context with fixed answers, used by the CLI and in tests
#[derive(Debug, Clone, Default)]
pub struct StaticUiContext {
    pub document_path: Option<PathBuf>,
    pub resource_dir: PathBuf,
    pub project_bibliographies: Vec<String>,
}

impl StaticUiContext {
    pub fn for_document(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            document_path: Some(path.to_path_buf()),
            resource_dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            project_bibliographies: Vec::new(),
        }
    }

    pub fn with_project_bibliography(mut self, path: impl Into<String>) -> Self {
        self.project_bibliographies.push(path.into());
        self
    }
}

impl EditorUiContext for StaticUiContext {
    fn document_path(&self) -> Option<PathBuf> {
        self.document_path.clone()
    }

    fn default_resource_dir(&self) -> PathBuf {
        self.resource_dir.clone()
    }

    fn project_bibliographies(&self) -> Vec<String> {
        self.project_bibliographies.clone()
    }
}

/// Extract every `---` delimited YAML mapping block from Markdown text.
///
/// A block opens with a line that is exactly `---` (the previous line, if
/// any, must be blank) and closes with `---` or `...`. Blocks that do not
/// parse to a mapping are skipped.
pub fn parse_yaml_nodes(text: &str) -> Vec<ParsedYaml> {
    let lines: Vec<&str> = text.lines().collect();
    let mut nodes = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let opens = lines[i].trim_end() == "---"
            && (i == 0 || lines[i - 1].trim().is_empty())
            && lines.get(i + 1).is_some_and(|next| !next.trim().is_empty());
        if !opens {
            i += 1;
            continue;
        }

        let close = (i + 1..lines.len()).find(|&j| {
            let line = lines[j].trim_end();
            line == "---" || line == "..."
        });
        let Some(close) = close else {
            break;
        };

        let yaml_code = lines[i + 1..close].join("\n");
        match serde_yaml::from_str::<Value>(&yaml_code) {
            Ok(yaml @ Value::Mapping(_)) => {
                nodes.push(ParsedYaml { yaml_code, yaml });
                i = close + 1;
            }
            Ok(_) => i += 1,
            Err(e) => {
                tracing::debug!("Skipping unparsable YAML block at line {}: {}", i + 1, e);
                i += 1;
            }
        }
    }

    nodes
}

/// Read a YAML value that may be a single string or a list of strings
pub fn yaml_string_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Sequence(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}
