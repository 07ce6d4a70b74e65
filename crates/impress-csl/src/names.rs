//! BibTeX name-list parsing
//!
//! Splits an `author`/`editor` field on top-level `and` and parses each name in
//! one of the three BibTeX forms:
//! - `First von Last`
//! - `von Last, First`
//! - `von Last, Jr, First`
//!
//! A name wrapped entirely in braces (`{World Health Organization}`) is kept as a literal.

use crate::item::CslName;
use crate::latex::decode_latex;

/// Parse a BibTeX name list into CSL names. `and others` is dropped.
pub fn parse_names(field: &str) -> Vec<CslName> {
    split_top_level_and(field)
        .into_iter()
        .filter(|name| !name.eq_ignore_ascii_case("others"))
        .filter_map(|name| parse_name(&name))
        .collect()
}

/// Split on " and " outside braces (case-insensitive)
fn split_top_level_and(field: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let words: Vec<&str> = field.split_whitespace().collect();

    for word in words {
        if depth == 0 && word.eq_ignore_ascii_case("and") {
            if !current.trim().is_empty() {
                names.push(current.trim().to_string());
            }
            current.clear();
            continue;
        }
        for c in word.chars() {
            match c {
                '{' => depth += 1,
                '}' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.trim().is_empty() {
        names.push(current.trim().to_string());
    }
    names
}

/// Split on commas outside braces
fn split_top_level_commas(name: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for c in name.chars() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    parts.push(current.trim().to_string());
    parts
}

fn is_fully_braced(name: &str) -> bool {
    if !(name.starts_with('{') && name.ends_with('}')) {
        return false;
    }
    let mut depth = 0usize;
    for (i, c) in name.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 && i != name.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}

/// A "von" particle starts with a lowercase letter (outside braces)
fn is_particle(word: &str) -> bool {
    !word.starts_with('{')
        && word
            .chars()
            .find(|c| c.is_alphabetic())
            .map(|c| c.is_lowercase())
            .unwrap_or(false)
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn parse_name(raw: &str) -> Option<CslName> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if is_fully_braced(raw) {
        return Some(CslName::literal(decode_latex(raw)));
    }

    let parts = split_top_level_commas(raw);
    let (von_last, suffix, given) = match parts.as_slice() {
        [single] => return Some(parse_first_von_last(single)),
        [last, first] => (last.as_str(), None, first.as_str()),
        [last, jr, first, ..] => (last.as_str(), Some(jr.as_str()), first.as_str()),
        [] => return None,
    };

    let words: Vec<&str> = von_last.split_whitespace().collect();
    let particle_len = words
        .iter()
        .take(words.len().saturating_sub(1))
        .take_while(|w| is_particle(w))
        .count();
    let particle = words[..particle_len].join(" ");
    let family = words[particle_len..].join(" ");

    Some(CslName {
        family: non_empty(decode_latex(&family)),
        given: non_empty(decode_latex(given)),
        non_dropping_particle: non_empty(decode_latex(&particle)),
        suffix: suffix.map(decode_latex).and_then(non_empty),
        ..Default::default()
    })
}

fn parse_first_von_last(name: &str) -> CslName {
    let words: Vec<&str> = name.split_whitespace().collect();
    if words.len() == 1 {
        return CslName::family_only(decode_latex(words[0]));
    }

    // Family is the last word; particles are the lowercase run before it
    let family_start = words.len() - 1;
    let first_particle = words[..family_start]
        .iter()
        .position(|w| is_particle(w))
        .unwrap_or(family_start);

    let given = words[..first_particle].join(" ");
    let particle = words[first_particle..family_start].join(" ");
    let family = words[family_start];

    CslName {
        family: non_empty(decode_latex(family)),
        given: non_empty(decode_latex(&given)),
        non_dropping_particle: non_empty(decode_latex(&particle)),
        ..Default::default()
    }
}

/// Format a CSL name for a BibTeX/BibLaTeX name list ("von Last, Jr, First")
pub fn format_bibtex_name(name: &CslName) -> String {
    if let Some(literal) = &name.literal {
        return format!("{{{}}}", literal);
    }
    let family = name.full_family().unwrap_or_default();
    match (&name.suffix, &name.given) {
        (Some(suffix), Some(given)) => format!("{}, {}, {}", family, suffix, given),
        (None, Some(given)) => format!("{}, {}", family, given),
        (Some(suffix), None) => format!("{}, {}, ", family, suffix),
        (None, None) => family,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_first() {
        let names = parse_names("Smith, John and Doe, Jane");
        assert_eq!(names.len(), 2);
        assert_eq!(names[0], CslName::new("Smith", "John"));
        assert_eq!(names[1], CslName::new("Doe", "Jane"));
    }

    #[test]
    fn test_first_last_with_particle() {
        let names = parse_names("Ludwig van Beethoven");
        assert_eq!(names[0].family.as_deref(), Some("Beethoven"));
        assert_eq!(names[0].given.as_deref(), Some("Ludwig"));
        assert_eq!(names[0].non_dropping_particle.as_deref(), Some("van"));
    }

    #[test]
    fn test_von_last_jr_first() {
        let names = parse_names("van der Berg, Jr, Piet");
        assert_eq!(names[0].family.as_deref(), Some("Berg"));
        assert_eq!(names[0].non_dropping_particle.as_deref(), Some("van der"));
        assert_eq!(names[0].suffix.as_deref(), Some("Jr"));
        assert_eq!(names[0].given.as_deref(), Some("Piet"));
    }

    #[test]
    fn test_braced_literal_and_others() {
        let names = parse_names("{World Health Organization} and Smith, J. and others");
        assert_eq!(names.len(), 2);
        assert_eq!(
            names[0].literal.as_deref(),
            Some("World Health Organization")
        );
        assert_eq!(names[1].family.as_deref(), Some("Smith"));
    }

    #[test]
    fn test_and_inside_braces_is_not_a_separator() {
        let names = parse_names("{Barnes and Noble}");
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].literal.as_deref(), Some("Barnes and Noble"));
    }

    #[test]
    fn test_latex_in_names() {
        let names = parse_names(r#"M{\"u}ller, J{\"o}rg"#);
        assert_eq!(names[0], CslName::new("Müller", "Jörg"));
    }

    #[test]
    fn test_format_bibtex_name() {
        let mut name = CslName::new("Gogh", "Vincent");
        name.non_dropping_particle = Some("van".to_string());
        assert_eq!(format_bibtex_name(&name), "van Gogh, Vincent");
        assert_eq!(format_bibtex_name(&CslName::literal("ACME")), "{ACME}");
    }
}
