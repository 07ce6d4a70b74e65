//! BibTeX / BibLaTeX reader using nom
//!
//! Handles:
//! - @string macros (including the predefined month macros)
//! - @preamble and @comment blocks (skipped)
//! - Braced and quoted field values with nested braces
//! - Concatenation with #
//! - Recovery: a malformed entry is recorded as an error and parsing resumes at the next @

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::map,
    IResult,
};
use std::collections::HashMap;

/// A raw entry as read from a .bib file. Field names are lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibTeXEntry {
    pub entry_type: String,
    pub cite_key: String,
    pub fields: Vec<(String, String)>,
}

impl BibTeXEntry {
    /// Look up a field value by (case-insensitive) name
    pub fn field(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.fields
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Location and description of an entry that could not be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibTeXParseError {
    pub line: u32,
    pub message: String,
}

/// Result of reading a whole .bib file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BibTeXParseResult {
    pub entries: Vec<BibTeXEntry>,
    pub strings: HashMap<String, String>,
    pub errors: Vec<BibTeXParseError>,
}

const MONTH_MACROS: [(&str, &str); 12] = [
    ("jan", "1"),
    ("feb", "2"),
    ("mar", "3"),
    ("apr", "4"),
    ("may", "5"),
    ("jun", "6"),
    ("jul", "7"),
    ("aug", "8"),
    ("sep", "9"),
    ("oct", "10"),
    ("nov", "11"),
    ("dec", "12"),
];

/// Read every entry from BibTeX text. Never fails; malformed entries end up in `errors`.
pub fn parse(input: &str) -> BibTeXParseResult {
    let mut result = BibTeXParseResult {
        strings: MONTH_MACROS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        ..Default::default()
    };

    let mut remaining = input;
    while let Some(at) = remaining.find('@') {
        let line = line_of(input, remaining, at);
        let candidate = &remaining[at..];
        match parse_at_block(candidate, &result.strings) {
            Ok((rest, block)) => {
                match block {
                    AtBlock::Entry(entry) => result.entries.push(entry),
                    AtBlock::String(key, value) => {
                        result.strings.insert(key.to_lowercase(), value);
                    }
                    AtBlock::Skipped => {}
                }
                remaining = rest;
            }
            Err(_) => {
                result.errors.push(BibTeXParseError {
                    line,
                    message: format!("Failed to parse entry: {}", first_line(candidate)),
                });
                remaining = &candidate[1..];
            }
        }
    }

    result
}

enum AtBlock {
    Entry(BibTeXEntry),
    String(String, String),
    Skipped,
}

fn line_of(input: &str, remaining: &str, offset: usize) -> u32 {
    let consumed = input.len() - remaining.len() + offset;
    input[..consumed].matches('\n').count() as u32 + 1
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or(text).trim()
}

fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || "_-:./+'".contains(c))(input)
}

fn parse_at_block<'a>(
    input: &'a str,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, AtBlock> {
    let (rest, _) = char('@')(input)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, block_type) = take_while1(|c: char| c.is_ascii_alphabetic())(rest)?;
    let (rest, _) = multispace0(rest)?;

    match block_type.to_lowercase().as_str() {
        "comment" => {
            if rest.starts_with('{') || rest.starts_with('(') {
                let (rest, _) = delimited_body(rest)?;
                Ok((rest, AtBlock::Skipped))
            } else {
                let end = rest.find('\n').unwrap_or(rest.len());
                Ok((&rest[end..], AtBlock::Skipped))
            }
        }
        "preamble" => {
            let (rest, _) = delimited_body(rest)?;
            Ok((rest, AtBlock::Skipped))
        }
        "string" => {
            let (rest, close) = open_delimiter(rest)?;
            let (rest, _) = multispace0(rest)?;
            let (rest, (key, value)) = field(rest, strings)?;
            let (rest, _) = multispace0(rest)?;
            let (rest, _) = char(close)(rest)?;
            Ok((rest, AtBlock::String(key, value)))
        }
        entry_type => {
            let (rest, close) = open_delimiter(rest)?;
            let (rest, _) = multispace0(rest)?;
            let (rest, cite_key) = identifier(rest)?;
            let (rest, _) = multispace0(rest)?;
            let (rest, fields) = fields(rest, strings, close)?;
            let (rest, _) = char(close)(rest)?;
            Ok((
                rest,
                AtBlock::Entry(BibTeXEntry {
                    entry_type: entry_type.to_string(),
                    cite_key: cite_key.to_string(),
                    fields,
                }),
            ))
        }
    }
}

fn open_delimiter(input: &str) -> IResult<&str, char> {
    alt((map(char('{'), |_| '}'), map(char('('), |_| ')')))(input)
}

/// Skip a `{...}` or `(...)` body, honoring nested braces
fn delimited_body(input: &str) -> IResult<&str, &str> {
    if input.starts_with('{') {
        return braced(input);
    }
    let (rest, _) = char('(')(input)?;
    match rest.find(')') {
        Some(end) => Ok((&rest[end + 1..], &rest[..end])),
        None => Err(nom_error(input)),
    }
}

fn fields<'a>(
    input: &'a str,
    strings: &HashMap<String, String>,
    close: char,
) -> IResult<&'a str, Vec<(String, String)>> {
    let mut fields = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, _) = multispace0(remaining)?;
        let rest = rest.strip_prefix(',').unwrap_or(rest);
        let (rest, _) = multispace0(rest)?;
        if rest.starts_with(close) || rest.is_empty() {
            return Ok((rest, fields));
        }
        let (rest, (key, value)) = field(rest, strings)?;
        fields.push((key.to_lowercase(), value));
        remaining = rest;
    }
}

fn field<'a>(
    input: &'a str,
    strings: &HashMap<String, String>,
) -> IResult<&'a str, (String, String)> {
    let (rest, key) = identifier(input)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = char('=')(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, value) = field_value(rest, strings)?;
    Ok((rest, (key.to_string(), value)))
}

/// A value: braced, quoted, number or macro reference, joined with `#`
fn field_value<'a>(input: &'a str, strings: &HashMap<String, String>) -> IResult<&'a str, String> {
    let mut value = String::new();
    let mut remaining = input;

    loop {
        let (rest, _) = multispace0(remaining)?;
        let (rest, part) = alt((
            map(braced, |s: &str| s[1..s.len() - 1].to_string()),
            quoted,
            map(
                take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '-' || c == '.'),
                |s: &str| {
                    strings
                        .get(&s.to_lowercase())
                        .cloned()
                        .unwrap_or_else(|| s.to_string())
                },
            ),
        ))(rest)?;
        value.push_str(&part);

        let (rest, _) = multispace0(rest)?;
        match rest.strip_prefix('#') {
            Some(rest) => remaining = rest,
            None => return Ok((rest, value)),
        }
    }
}

/// `{...}` including the outer braces
fn braced(input: &str) -> IResult<&str, &str> {
    if !input.starts_with('{') {
        return Err(nom_error(input));
    }
    let mut depth = 0usize;
    let mut escaped = false;
    for (pos, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&input[pos + 1..], &input[..pos + 1]));
                }
            }
            _ => {}
        }
    }
    Err(nom_error(input))
}

/// `"..."` with braces protecting inner quotes
fn quoted(input: &str) -> IResult<&str, String> {
    let (body, _) = char('"')(input)?;
    let mut depth = 0usize;
    let mut escaped = false;
    for (pos, c) in body.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '"' if depth == 0 => return Ok((&body[pos + 1..], body[..pos].to_string())),
            _ => {}
        }
    }
    Err(nom_error(input))
}

fn nom_error(input: &str) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Char))
}
