//! CSL bibliographic records for the impress suite
//!
//! This crate provides:
//! - `CslItem`: an open-schema Citation Style Language record
//! - A nom-based BibTeX/BibLaTeX reader with LaTeX decoding
//! - BibTeX entry → CSL conversion
//! - Generic CSL → BibLaTeX generation
//! - CSL-JSON / CSL-YAML / BibTeX file reading by extension

pub mod biblatex;
pub mod bibtex;
mod convert;
mod item;
mod latex;
mod names;
mod reader;

pub use biblatex::{biblatex_type_for_csl, csl_to_biblatex};
pub use bibtex::{BibTeXEntry, BibTeXParseError, BibTeXParseResult};
pub use convert::{bibtex_entry_to_csl, csl_type_for_entry};
pub use item::{CslDate, CslItem, CslName};
pub use latex::{decode_latex, escape_latex};
pub use names::{format_bibtex_name, parse_names};
pub use reader::{
    read_bibliography, read_bibtex, read_csl_json, read_csl_yaml, BibliographyContents,
    BibliographyFormat, CslError,
};
