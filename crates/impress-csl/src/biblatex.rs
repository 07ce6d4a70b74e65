//! Generic CSL to BibLaTeX conversion
//!
//! Produces a single `@type{id, ...}` entry. Used when no provider-specific
//! exporter (e.g. Better BibTeX) is available.

use crate::item::{CslItem, CslName};
use crate::latex::escape_latex;
use crate::names::format_bibtex_name;

/// Map a CSL item type to a BibLaTeX entry type
pub fn biblatex_type_for_csl(item_type: &str) -> &'static str {
    match item_type {
        "article" | "article-journal" | "article-magazine" | "article-newspaper" => "article",
        "book" => "book",
        "chapter" | "entry-dictionary" | "entry-encyclopedia" => "incollection",
        "paper-conference" => "inproceedings",
        "thesis" => "thesis",
        "report" => "report",
        "webpage" | "post" | "post-weblog" => "online",
        "manuscript" => "unpublished",
        "patent" => "patent",
        "dataset" => "dataset",
        "software" => "software",
        "pamphlet" => "booklet",
        "periodical" => "periodical",
        _ => "misc",
    }
}

fn format_names(names: &[CslName]) -> String {
    names
        .iter()
        .map(format_bibtex_name)
        .collect::<Vec<_>>()
        .join(" and ")
}

/// Convert a CSL item to BibLaTeX source text using `id` as the cite key
pub fn csl_to_biblatex(id: &str, item: &CslItem) -> String {
    let entry_type = biblatex_type_for_csl(&item.item_type);
    let mut fields: Vec<(&str, String)> = Vec::new();

    if !item.author.is_empty() {
        fields.push(("author", format_names(&item.author)));
    }
    if !item.editor.is_empty() {
        fields.push(("editor", format_names(&item.editor)));
    }
    if let Some(title) = &item.title {
        fields.push(("title", escape_latex(title)));
    }
    if let Some(container) = &item.container_title {
        let field = match entry_type {
            "article" | "periodical" => "journaltitle",
            "online" => "organization",
            _ => "booktitle",
        };
        fields.push((field, escape_latex(container)));
    }
    if let Some(date) = item.issued.as_ref().and_then(|d| d.to_iso_string()) {
        fields.push(("date", date));
    }

    let simple = [
        ("volume", &item.volume),
        ("number", &item.issue),
        ("publisher", &item.publisher),
        ("location", &item.publisher_place),
        ("isbn", &item.isbn),
        ("abstract", &item.abstract_text),
        ("note", &item.note),
    ];
    for (name, value) in simple {
        if let Some(value) = value {
            fields.push((name, escape_latex(value)));
        }
    }
    if let Some(page) = &item.page {
        fields.push(("pages", page.replace('-', "--").replace("----", "--")));
    }
    for (variable, name) in [
        ("ISSN", "issn"),
        ("collection-title", "series"),
        ("edition", "edition"),
        ("keyword", "keywords"),
    ] {
        if let Some(value) = item.extra_str(variable) {
            fields.push((name, escape_latex(value)));
        }
    }
    // identifiers are written verbatim
    if let Some(doi) = &item.doi {
        fields.push(("doi", doi.clone()));
    }
    if let Some(url) = &item.url {
        fields.push(("url", url.clone()));
    }

    let mut result = format!("@{}{{{}", entry_type, id);
    for (name, value) in fields {
        result.push_str(",\n  ");
        result.push_str(name);
        result.push_str(" = {");
        result.push_str(&value);
        result.push('}');
    }
    result.push_str("\n}\n");
    result
}
