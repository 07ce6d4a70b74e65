//! Reading bibliography files into CSL items
//!
//! Supported formats are chosen by file extension:
//! - `.bib` / `.bibtex`: BibTeX or BibLaTeX
//! - `.json`: CSL-JSON (an array of items)
//! - `.yaml` / `.yml`: CSL-YAML (`references:` list, or a bare list)

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::bibtex::{self, BibTeXParseError};
use crate::convert::bibtex_entry_to_csl;
use crate::item::CslItem;

#[derive(Error, Debug)]
pub enum CslError {
    #[error("Invalid CSL-JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid CSL-YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Unsupported bibliography format: {0}")]
    UnsupportedFormat(String),
    #[error("No readable entries ({errors} malformed)")]
    Unreadable { errors: usize },
}

/// Bibliography file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BibliographyFormat {
    BibTeX,
    CslJson,
    CslYaml,
}

impl BibliographyFormat {
    /// Detect the format from a file extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        match extension.as_str() {
            "bib" | "bibtex" => Some(Self::BibTeX),
            "json" => Some(Self::CslJson),
            "yaml" | "yml" => Some(Self::CslYaml),
            _ => None,
        }
    }
}

/// Items read from one file plus any per-entry problems
#[derive(Debug, Clone, Default)]
pub struct BibliographyContents {
    pub items: Vec<CslItem>,
    pub errors: Vec<BibTeXParseError>,
}

/// Read CSL-JSON text
pub fn read_csl_json(text: &str) -> Result<Vec<CslItem>, CslError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(text)?)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CslYamlDocument {
    References { references: Vec<CslItem> },
    List(Vec<CslItem>),
}

/// Read CSL-YAML text
pub fn read_csl_yaml(text: &str) -> Result<Vec<CslItem>, CslError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_yaml::from_str(text)? {
        CslYamlDocument::References { references } => Ok(references),
        CslYamlDocument::List(items) => Ok(items),
    }
}

/// Read BibTeX text; entries that cannot be read are reported, not fatal
pub fn read_bibtex(text: &str) -> BibliographyContents {
    let parsed = bibtex::parse(text);
    BibliographyContents {
        items: parsed.entries.iter().map(bibtex_entry_to_csl).collect(),
        errors: parsed.errors,
    }
}

/// Read bibliography text in the given format.
///
/// A BibTeX file in which every entry is malformed is an error; partially
/// readable files return what could be read.
pub fn read_bibliography(
    text: &str,
    format: BibliographyFormat,
) -> Result<BibliographyContents, CslError> {
    match format {
        BibliographyFormat::BibTeX => {
            let contents = read_bibtex(text);
            if contents.items.is_empty() && !contents.errors.is_empty() {
                return Err(CslError::Unreadable {
                    errors: contents.errors.len(),
                });
            }
            Ok(contents)
        }
        BibliographyFormat::CslJson => Ok(BibliographyContents {
            items: read_csl_json(text)?,
            errors: Vec::new(),
        }),
        BibliographyFormat::CslYaml => Ok(BibliographyContents {
            items: read_csl_yaml(text)?,
            errors: Vec::new(),
        }),
    }
}
