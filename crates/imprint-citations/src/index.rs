//! Weighted fuzzy search over bibliography sources
//!
//! The index is built wholesale from an aggregate snapshot and never updated
//! in place. Matching is case- and diacritic-insensitive. Every query term
//! must match at least one scored field; an item's relevance is the mean of
//! its per-term weighted scores.

use strsim::jaro_winkler;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::config::SearchConfig;
use crate::source::SharedSource;

/// Indexed fields and their weights
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Id,
    AuthorFamily,
    AuthorLiteral,
    Title,
    AuthorGiven,
    Issued,
    /// Indexed for scoping only
    Provider,
}

impl SearchField {
    pub const ALL: [SearchField; 7] = [
        SearchField::Id,
        SearchField::AuthorFamily,
        SearchField::AuthorLiteral,
        SearchField::Title,
        SearchField::AuthorGiven,
        SearchField::Issued,
        SearchField::Provider,
    ];

    pub fn weight(self) -> f64 {
        match self {
            SearchField::Id => 0.30,
            SearchField::AuthorFamily => 0.275,
            SearchField::AuthorLiteral => 0.275,
            SearchField::Title => 0.10,
            SearchField::AuthorGiven => 0.025,
            SearchField::Issued => 0.025,
            SearchField::Provider => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    pub max_results: usize,
    /// Minimum Jaro-Winkler similarity for a fuzzy token match
    pub fuzzy_threshold: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

impl From<&SearchConfig> for SearchOptions {
    fn from(config: &SearchConfig) -> Self {
        Self {
            max_results: config.max_results,
            fuzzy_threshold: config.fuzzy_threshold,
        }
    }
}

/// Which sources a search considers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope<'a> {
    All,
    Provider(&'a str),
    Collection {
        provider: &'a str,
        collection: &'a str,
    },
}

impl SearchScope<'_> {
    fn admits(&self, source: &SharedSource) -> bool {
        match self {
            SearchScope::All => true,
            SearchScope::Provider(provider) => source.provider_key == *provider,
            SearchScope::Collection {
                provider,
                collection,
            } => source.provider_key == *provider && source.in_collection(collection),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub source: SharedSource,
    pub score: f64,
}

/// Shortest term that gets fuzzy (non-substring) matching
const MIN_FUZZY_TERM_CHARS: usize = 3;

/// Substring matches inside a word rank below word-start matches
const INNER_MATCH_SCORE: f64 = 0.9;

/// Fuzzy matches rank below any substring match
const FUZZY_MATCH_FACTOR: f64 = 0.8;

struct IndexedField {
    field: SearchField,
    text: String,
    tokens: Vec<String>,
}

struct IndexedSource {
    source: SharedSource,
    fields: Vec<IndexedField>,
}

pub struct SourceIndex {
    entries: Vec<IndexedSource>,
    options: SearchOptions,
}

impl SourceIndex {
    pub fn build(sources: &[SharedSource], options: SearchOptions) -> Self {
        let entries = sources
            .iter()
            .map(|source| IndexedSource {
                source: source.clone(),
                fields: SearchField::ALL
                    .iter()
                    .filter_map(|&field| {
                        let text = normalize(&field_text(source, field));
                        if text.is_empty() {
                            return None;
                        }
                        let tokens = tokenize(&text);
                        Some(IndexedField {
                            field,
                            text,
                            tokens,
                        })
                    })
                    .collect(),
            })
            .collect();

        Self { entries, options }
    }

    pub fn empty(options: SearchOptions) -> Self {
        Self {
            entries: Vec::new(),
            options,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn options(&self) -> SearchOptions {
        self.options
    }

    /// Ranked matches, best first, capped at `max_results`. Equal scores keep
    /// index order. A query without terms matches nothing.
    pub fn search(&self, query: &str, scope: SearchScope<'_>) -> Vec<SearchHit> {
        let terms: Vec<String> = normalize(query)
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .filter(|entry| scope.admits(&entry.source))
            .filter_map(|entry| {
                let mut total = 0.0;
                for term in &terms {
                    let score = self.term_score(entry, term);
                    if score <= 0.0 {
                        return None;
                    }
                    total += score;
                }
                Some(SearchHit {
                    source: entry.source.clone(),
                    score: total / terms.len() as f64,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(self.options.max_results);
        hits
    }

    fn term_score(&self, entry: &IndexedSource, term: &str) -> f64 {
        entry
            .fields
            .iter()
            .map(|f| f.field.weight() * self.match_score(f, term))
            .sum()
    }

    fn match_score(&self, field: &IndexedField, term: &str) -> f64 {
        if let Some(score) = substring_score(&field.text, term) {
            return score;
        }
        if term.chars().count() < MIN_FUZZY_TERM_CHARS {
            return 0.0;
        }
        let best = field
            .tokens
            .iter()
            .map(|token| jaro_winkler(term, token))
            .fold(0.0, f64::max);
        if best >= self.options.fuzzy_threshold {
            best * FUZZY_MATCH_FACTOR
        } else {
            0.0
        }
    }
}

fn field_text(source: &SharedSource, field: SearchField) -> String {
    let csl = &source.csl;
    let names = || csl.author.iter().chain(csl.editor.iter());
    match field {
        SearchField::Id => csl.id.clone(),
        SearchField::AuthorFamily => names()
            .filter_map(|n| n.full_family())
            .collect::<Vec<_>>()
            .join(" "),
        SearchField::AuthorLiteral => names()
            .filter_map(|n| n.literal.clone())
            .collect::<Vec<_>>()
            .join(" "),
        SearchField::Title => csl.title.clone().unwrap_or_default(),
        SearchField::AuthorGiven => names()
            .filter_map(|n| n.given.clone())
            .collect::<Vec<_>>()
            .join(" "),
        SearchField::Issued => csl
            .issued
            .as_ref()
            .and_then(|d| d.to_iso_string())
            .unwrap_or_default(),
        SearchField::Provider => source.provider_key.clone(),
    }
}

/// Lowercase with diacritics removed
pub fn normalize(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// 1.0 when the term starts a word of the text, 0.9 when it only occurs
/// inside one, `None` when absent
fn substring_score(text: &str, term: &str) -> Option<f64> {
    let mut best = None;
    for (pos, _) in text.match_indices(term) {
        let word_start = text[..pos]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        if word_start {
            return Some(1.0);
        }
        best = Some(INNER_MATCH_SCORE);
    }
    best
}
