//! BibTeX/BibLaTeX entry to CSL item conversion

use crate::bibtex::BibTeXEntry;
use crate::item::{CslDate, CslItem};
use crate::latex::decode_latex;
use crate::names::parse_names;

/// Map a BibTeX/BibLaTeX entry type to a CSL item type
pub fn csl_type_for_entry(entry_type: &str) -> &'static str {
    match entry_type.to_lowercase().as_str() {
        "article" => "article-journal",
        "book" | "mvbook" | "collection" | "mvcollection" | "proceedings" | "mvproceedings"
        | "reference" => "book",
        "inbook" | "incollection" | "bookinbook" | "suppbook" | "inreference" => "chapter",
        "inproceedings" | "conference" => "paper-conference",
        "phdthesis" | "mastersthesis" | "thesis" => "thesis",
        "techreport" | "report" => "report",
        "manual" => "book",
        "booklet" => "pamphlet",
        "online" | "electronic" | "www" => "webpage",
        "unpublished" => "manuscript",
        "patent" => "patent",
        "dataset" => "dataset",
        "software" => "software",
        "periodical" => "periodical",
        _ => "document",
    }
}

fn decoded(entry: &BibTeXEntry, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| entry.field(name))
        .map(decode_latex)
        .filter(|value| !value.is_empty())
}

fn month_number(month: &str) -> Option<i32> {
    let month = month.trim().to_lowercase();
    if let Ok(n) = month.parse::<i32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    MONTHS
        .iter()
        .position(|m| month.starts_with(m))
        .map(|i| i as i32 + 1)
}

/// Parse an EDTF-ish BibLaTeX date ("2020", "2020-05", "2020-05-01", "2019/2020")
fn parse_date_field(date: &str) -> Option<CslDate> {
    let ranges: Vec<Vec<i32>> = date
        .split('/')
        .map(|part| {
            part.trim()
                .split('-')
                .map_while(|n| n.trim().parse::<i32>().ok())
                .take(3)
                .collect::<Vec<_>>()
        })
        .filter(|parts| !parts.is_empty())
        .collect();
    if ranges.is_empty() {
        None
    } else {
        Some(CslDate {
            date_parts: ranges,
            ..Default::default()
        })
    }
}

fn issued(entry: &BibTeXEntry) -> Option<CslDate> {
    if let Some(date) = entry.field("date") {
        return parse_date_field(date).or_else(|| Some(CslDate::from_literal(decode_latex(date))));
    }
    let year = entry.field("year")?;
    let digits: String = year.chars().filter(|c| c.is_ascii_digit()).collect();
    let Ok(year_number) = digits.parse::<i32>() else {
        return Some(CslDate::from_literal(decode_latex(year)));
    };
    let mut parts = vec![year_number];
    if let Some(month) = entry.field("month").and_then(month_number) {
        parts.push(month);
        if let Some(day) = entry.field("day").and_then(|d| d.trim().parse::<i32>().ok()) {
            parts.push(day);
        }
    }
    Some(CslDate::from_parts(&parts))
}

const HANDLED_FIELDS: &[&str] = &[
    "author",
    "editor",
    "title",
    "journal",
    "journaltitle",
    "booktitle",
    "date",
    "year",
    "month",
    "day",
    "doi",
    "url",
    "isbn",
    "volume",
    "number",
    "pages",
    "publisher",
    "school",
    "institution",
    "organization",
    "address",
    "location",
    "abstract",
    "note",
    "issn",
    "series",
    "edition",
    "keywords",
];

/// Convert a raw BibTeX entry to a CSL item, keyed by the entry's cite key
pub fn bibtex_entry_to_csl(entry: &BibTeXEntry) -> CslItem {
    let item_type = csl_type_for_entry(&entry.entry_type);
    let mut item = CslItem::new(entry.cite_key.clone(), item_type);

    item.title = decoded(entry, &["title"]);
    item.author = entry.field("author").map(parse_names).unwrap_or_default();
    item.editor = entry.field("editor").map(parse_names).unwrap_or_default();
    item.issued = issued(entry);
    item.container_title = decoded(entry, &["journaltitle", "journal", "booktitle"]);
    item.doi = entry.field("doi").map(|d| d.trim().to_string());
    item.url = entry.field("url").map(|u| u.trim().to_string());
    item.isbn = decoded(entry, &["isbn"]);
    item.volume = decoded(entry, &["volume"]);
    item.issue = decoded(entry, &["number"]);
    item.page = entry.field("pages").map(|p| p.replace("--", "-").trim().to_string());
    item.publisher = match item_type {
        "thesis" => decoded(entry, &["school", "institution", "publisher"]),
        "report" => decoded(entry, &["institution", "publisher", "organization"]),
        _ => decoded(entry, &["publisher", "organization"]),
    };
    item.publisher_place = decoded(entry, &["location", "address"]);
    item.abstract_text = decoded(entry, &["abstract"]);
    item.note = decoded(entry, &["note"]);

    for (field, variable) in [
        ("issn", "ISSN"),
        ("series", "collection-title"),
        ("edition", "edition"),
        ("keywords", "keyword"),
    ] {
        if let Some(value) = decoded(entry, &[field]) {
            item.extra
                .insert(variable.to_string(), serde_json::Value::String(value));
        }
    }
    for (key, value) in &entry.fields {
        if !HANDLED_FIELDS.contains(&key.as_str()) {
            item.extra
                .entry(key.clone())
                .or_insert_with(|| serde_json::Value::String(decode_latex(value)));
        }
    }

    item
}
