//! CSL item data structures
//!
//! `CslItem` models a Citation Style Language record. The well-known fields are
//! typed; every other key survives round-trips through the flattened `extra` map.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// A single CSL record (CSL-JSON / CSL-YAML item)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CslItem {
    #[serde(default, deserialize_with = "de_string_or_number")]
    pub id: String,

    #[serde(rename = "type", default)]
    pub item_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub author: Vec<CslName>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub editor: Vec<CslName>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued: Option<CslDate>,

    #[serde(
        rename = "container-title",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub container_title: Option<String>,

    #[serde(rename = "DOI", default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,

    #[serde(rename = "URL", default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(rename = "ISBN", default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,

    #[serde(
        default,
        deserialize_with = "de_opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub volume: Option<String>,

    #[serde(
        default,
        deserialize_with = "de_opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub issue: Option<String>,

    #[serde(
        default,
        deserialize_with = "de_opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub page: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,

    #[serde(
        rename = "publisher-place",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub publisher_place: Option<String>,

    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Any other CSL variable (open schema)
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl CslItem {
    /// Create an item with an id and CSL type
    pub fn new(id: impl Into<String>, item_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            item_type: item_type.into(),
            ..Default::default()
        }
    }

    /// Builder method to set the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Builder method to append an author
    pub fn with_author(mut self, author: CslName) -> Self {
        self.author.push(author);
        self
    }

    /// Builder method to set the issued date
    pub fn with_issued(mut self, issued: CslDate) -> Self {
        self.issued = Some(issued);
        self
    }

    /// Builder method to set the DOI
    pub fn with_doi(mut self, doi: impl Into<String>) -> Self {
        self.doi = Some(doi.into());
        self
    }

    /// Issued year, if any
    pub fn year(&self) -> Option<i32> {
        self.issued.as_ref().and_then(CslDate::year)
    }

    /// Look up a string-valued variable in the open part of the record
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }
}

/// A CSL name variable (author, editor, ...)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CslName {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal: Option<String>,

    #[serde(
        rename = "non-dropping-particle",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub non_dropping_particle: Option<String>,

    #[serde(
        rename = "dropping-particle",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub dropping_particle: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

impl CslName {
    /// Personal name with family and given parts
    pub fn new(family: impl Into<String>, given: impl Into<String>) -> Self {
        Self {
            family: Some(family.into()),
            given: Some(given.into()),
            ..Default::default()
        }
    }

    /// Family name only
    pub fn family_only(family: impl Into<String>) -> Self {
        Self {
            family: Some(family.into()),
            ..Default::default()
        }
    }

    /// Institutional or otherwise unparsed name
    pub fn literal(literal: impl Into<String>) -> Self {
        Self {
            literal: Some(literal.into()),
            ..Default::default()
        }
    }

    /// Family name including a non-dropping particle ("van Gogh")
    pub fn full_family(&self) -> Option<String> {
        let family = self.family.as_deref()?;
        Some(match &self.non_dropping_particle {
            Some(particle) => format!("{} {}", particle, family),
            None => family.to_string(),
        })
    }

    /// Format as "Given Family" for display
    pub fn display_name(&self) -> String {
        if let Some(literal) = &self.literal {
            return literal.clone();
        }
        let mut parts: Vec<&str> = Vec::new();
        if let Some(given) = &self.given {
            parts.push(given);
        }
        if let Some(particle) = &self.dropping_particle {
            parts.push(particle);
        }
        let family = self.full_family();
        if let Some(family) = &family {
            parts.push(family);
        }
        let mut name = parts.join(" ");
        if let Some(suffix) = &self.suffix {
            name.push_str(", ");
            name.push_str(suffix);
        }
        name
    }
}

/// A CSL date variable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CslDate {
    #[serde(
        rename = "date-parts",
        default,
        deserialize_with = "de_date_parts",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub date_parts: Vec<Vec<i32>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl CslDate {
    /// Date from year/month/day parts (trailing parts may be omitted)
    pub fn from_parts(parts: &[i32]) -> Self {
        Self {
            date_parts: vec![parts.to_vec()],
            ..Default::default()
        }
    }

    /// Year-only date
    pub fn from_year(year: i32) -> Self {
        Self::from_parts(&[year])
    }

    /// Unparsed date text
    pub fn from_literal(literal: impl Into<String>) -> Self {
        Self {
            literal: Some(literal.into()),
            ..Default::default()
        }
    }

    /// Year of the first date part, falling back to a leading 4-digit year in raw/literal text
    pub fn year(&self) -> Option<i32> {
        if let Some(year) = self.date_parts.first().and_then(|p| p.first()) {
            return Some(*year);
        }
        let text = self.raw.as_deref().or(self.literal.as_deref())?;
        let digits: String = text.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.len() == 4 {
            digits.parse().ok()
        } else {
            None
        }
    }

    /// ISO-8601-like rendering of the first date ("2020", "2020-05", "2020-05-01").
    /// Ranges render as "start/end". Falls back to raw, then literal.
    pub fn to_iso_string(&self) -> Option<String> {
        if self.date_parts.is_empty() {
            return self.raw.clone().or_else(|| self.literal.clone());
        }
        let rendered: Vec<String> = self
            .date_parts
            .iter()
            .filter(|parts| !parts.is_empty())
            .map(|parts| {
                parts
                    .iter()
                    .enumerate()
                    .map(|(i, part)| {
                        if i == 0 {
                            format!("{:04}", part)
                        } else {
                            format!("{:02}", part)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("-")
            })
            .collect();
        if rendered.is_empty() {
            None
        } else {
            Some(rendered.join("/"))
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(i64),
    Float(f64),
    Text(String),
}

impl NumberOrString {
    fn into_string(self) -> String {
        match self {
            NumberOrString::Number(n) => n.to_string(),
            NumberOrString::Float(f) => f.to_string(),
            NumberOrString::Text(s) => s,
        }
    }
}

fn de_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(NumberOrString::deserialize(deserializer)?.into_string())
}

fn de_opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<NumberOrString>::deserialize(deserializer)?.map(NumberOrString::into_string))
}

// date-parts entries are numbers in CSL-JSON but frequently strings in the wild
fn de_date_parts<'de, D>(deserializer: D) -> Result<Vec<Vec<i32>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Vec<NumberOrString>> = Vec::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|parts| {
            parts
                .into_iter()
                .map_while(|part| part.into_string().trim().parse::<i32>().ok())
                .collect::<Vec<_>>()
        })
        .filter(|parts| !parts.is_empty())
        .collect())
}
