//! Bibliographic records, collections and files as seen by the citation UI

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use impress_csl::CslItem;
use serde::{Deserialize, Serialize};

/// Provider key of the local (document/project) bibliography provider
pub const LOCAL_PROVIDER_KEY: &str = "local";

/// Provider key of the Zotero provider
pub const ZOTERO_PROVIDER_KEY: &str = "zotero";

/// One bibliographic record from a provider.
///
/// The CSL fields are flattened, so the serialized form is a CSL-JSON object
/// with `providerKey` and `collectionKeys` alongside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BibliographySource {
    #[serde(flatten)]
    pub csl: CslItem,
    pub provider_key: String,
    #[serde(default)]
    pub collection_keys: BTreeSet<String>,
}

/// Sources are shared between the aggregate list, the index and query results
pub type SharedSource = Arc<BibliographySource>;

impl BibliographySource {
    pub fn new(csl: CslItem, provider_key: impl Into<String>) -> Self {
        Self {
            csl,
            provider_key: provider_key.into(),
            collection_keys: BTreeSet::new(),
        }
    }

    pub fn with_collection(mut self, key: impl Into<String>) -> Self {
        self.collection_keys.insert(key.into());
        self
    }

    /// Citation id, the dedup and search key
    pub fn id(&self) -> &str {
        &self.csl.id
    }

    pub fn title(&self) -> Option<&str> {
        self.csl.title.as_deref()
    }

    pub fn in_collection(&self, key: &str) -> bool {
        self.collection_keys.contains(key)
    }
}

/// A named folder of sources within one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BibliographyCollection {
    pub name: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_key: Option<String>,
    pub provider_key: String,
}

impl BibliographyCollection {
    pub fn new(
        name: impl Into<String>,
        key: impl Into<String>,
        provider_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            parent_key: None,
            provider_key: provider_key.into(),
        }
    }

    pub fn with_parent(mut self, parent_key: impl Into<String>) -> Self {
        self.parent_key = Some(parent_key.into());
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_key.is_none()
    }
}

/// A bibliography file discovered for the current document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BibliographyFile {
    /// Path as written in the document (or project)
    pub display_path: String,
    pub full_path: PathBuf,
    pub writable: bool,
    /// Declared by the project rather than the document itself
    #[serde(default)]
    pub is_project: bool,
}

/// A collection with its child collections, for tree rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionNode {
    pub collection: BibliographyCollection,
    pub children: Vec<CollectionNode>,
}

/// Arrange a provider's flat collection list into a forest.
///
/// Collections without a parent key are roots. A collection whose parent is
/// missing from the list is also treated as a root. Sibling order follows the
/// input order; a parent cycle is broken at the first repeated key.
pub fn build_collection_tree(collections: &[BibliographyCollection]) -> Vec<CollectionNode> {
    let keys: HashSet<&str> = collections.iter().map(|c| c.key.as_str()).collect();

    let mut children: HashMap<&str, Vec<&BibliographyCollection>> = HashMap::new();
    let mut roots = Vec::new();
    for collection in collections {
        match collection.parent_key.as_deref() {
            Some(parent) if keys.contains(parent) && parent != collection.key => {
                children.entry(parent).or_default().push(collection)
            }
            _ => roots.push(collection),
        }
    }

    let mut visited = HashSet::new();
    let mut forest: Vec<CollectionNode> = roots
        .into_iter()
        .filter_map(|c| build_node(c, &children, &mut visited))
        .collect();

    // Collections only reachable through a cycle never hang off a root
    for collection in collections {
        if !visited.contains(collection.key.as_str()) {
            if let Some(node) = build_node(collection, &children, &mut visited) {
                forest.push(node);
            }
        }
    }

    forest
}

fn build_node<'a>(
    collection: &'a BibliographyCollection,
    children: &HashMap<&str, Vec<&'a BibliographyCollection>>,
    visited: &mut HashSet<&'a str>,
) -> Option<CollectionNode> {
    if !visited.insert(collection.key.as_str()) {
        return None;
    }
    let kids = children
        .get(collection.key.as_str())
        .map(|kids| {
            kids.iter()
                .filter_map(|child| build_node(child, children, visited))
                .collect()
        })
        .unwrap_or_default();
    Some(CollectionNode {
        collection: collection.clone(),
        children: kids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(key: &str, parent: Option<&str>) -> BibliographyCollection {
        let c = BibliographyCollection::new(key.to_uppercase(), key, ZOTERO_PROVIDER_KEY);
        match parent {
            Some(p) => c.with_parent(p),
            None => c,
        }
    }

    #[test]
    fn test_source_serializes_as_csl_with_provider_fields() {
        let source = BibliographySource::new(
            CslItem::new("smith2020", "article-journal").with_title("On Things"),
            LOCAL_PROVIDER_KEY,
        )
        .with_collection("refs.bib");

        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["id"], "smith2020");
        assert_eq!(json["type"], "article-journal");
        assert_eq!(json["providerKey"], "local");
        assert_eq!(json["collectionKeys"][0], "refs.bib");

        let back: BibliographySource = serde_json::from_value(json).unwrap();
        assert_eq!(back, source);
    }

    #[test]
    fn test_tree_nests_children_under_parents() {
        let tree = build_collection_tree(&[
            collection("a", None),
            collection("b", Some("a")),
            collection("c", Some("b")),
            collection("d", None),
        ]);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].collection.key, "a");
        assert_eq!(tree[0].children[0].collection.key, "b");
        assert_eq!(tree[0].children[0].children[0].collection.key, "c");
        assert!(tree[1].children.is_empty());
    }

    #[test]
    fn test_tree_orphan_becomes_root() {
        let tree = build_collection_tree(&[collection("x", Some("missing"))]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].collection.key, "x");
    }

    #[test]
    fn test_tree_survives_parent_cycle() {
        let tree = build_collection_tree(&[collection("a", Some("b")), collection("b", Some("a"))]);
        let total: usize = tree.iter().map(|n| 1 + n.children.len()).sum();
        assert_eq!(total, 2);
    }
}
