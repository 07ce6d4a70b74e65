//! LaTeX decoding for BibTeX field values
//!
//! Accent commands become combining marks that are then composed (NFC), so
//! `\"{o}`, `\"o` and `{\"o}` all decode to `ö`.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    // Symbol accents may touch their letter (\"o); letter accents need braces or a space (\c c)
    static ref ACCENT: Regex = Regex::new(concat!(
        r#"\\(?:([`'^"~=.])\s*(?:\{\s*(\\?[A-Za-z])\s*\}|(\\?[A-Za-z]))"#,
        r#"|([uvHckrd])(?:\s*\{\s*(\\?[A-Za-z])\s*\}|\s+(\\?[A-Za-z])))"#,
    ))
    .expect("accent pattern is valid");
    static ref SYMBOL: Regex =
        Regex::new(r"\\(ss|ae|AE|oe|OE|aa|AA|o|O|l|L|i|j)\b\s*(?:\{\})?")
            .expect("symbol pattern is valid");
    static ref ESCAPED: Regex = Regex::new(r"\\([&%$#_{}])").expect("escape pattern is valid");
    static ref COMMAND: Regex =
        Regex::new(r"\\[A-Za-z]+\*?\s*").expect("command pattern is valid");
}

fn combining_mark(accent: &str) -> Option<char> {
    Some(match accent {
        "`" => '\u{0300}',
        "'" => '\u{0301}',
        "^" => '\u{0302}',
        "~" => '\u{0303}',
        "=" => '\u{0304}',
        "u" => '\u{0306}',
        "." => '\u{0307}',
        "\"" => '\u{0308}',
        "r" => '\u{030A}',
        "H" => '\u{030B}',
        "v" => '\u{030C}',
        "d" => '\u{0323}',
        "c" => '\u{0327}',
        "k" => '\u{0328}',
        _ => return None,
    })
}

fn symbol(command: &str) -> &'static str {
    match command {
        "ss" => "ß",
        "ae" => "æ",
        "AE" => "Æ",
        "oe" => "œ",
        "OE" => "Œ",
        "aa" => "å",
        "AA" => "Å",
        "o" => "ø",
        "O" => "Ø",
        "l" => "ł",
        "L" => "Ł",
        "i" => "ı",
        "j" => "ȷ",
        _ => "",
    }
}

/// Decode LaTeX markup in a field value to plain Unicode text
pub fn decode_latex(input: &str) -> String {
    if !input.contains('\\') && !input.contains('{') && !input.contains("--") {
        return input.to_string();
    }

    let decoded = ACCENT.replace_all(input, |caps: &Captures| {
        let accent = caps.get(1).or_else(|| caps.get(4)).map_or("", |m| m.as_str());
        let base = [2, 3, 5, 6]
            .iter()
            .find_map(|&i| caps.get(i))
            .map_or("", |m| m.as_str());
        // dotless i/j take the accent as plain i/j
        let base = base.trim_start_matches('\\');
        match combining_mark(accent) {
            Some(mark) => format!("{}{}", base, mark).nfc().collect::<String>(),
            None => base.to_string(),
        }
    });
    let decoded = SYMBOL.replace_all(&decoded, |caps: &Captures| symbol(&caps[1]).to_string());
    let decoded = ESCAPED.replace_all(&decoded, "\u{0}$1");
    let decoded = COMMAND.replace_all(&decoded, "");

    let mut result = String::with_capacity(decoded.len());
    let mut escaped = false;
    for c in decoded.chars() {
        match c {
            '\u{0}' => escaped = true,
            '{' | '}' if !escaped => {}
            '~' if !escaped => result.push(' '),
            c => {
                escaped = false;
                result.push(c);
            }
        }
    }

    result
        .replace("---", "\u{2014}")
        .replace("--", "\u{2013}")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Escape characters that are special in BibTeX/LaTeX values
pub fn escape_latex(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '&' | '%' | '$' | '#' | '_') {
            result.push('\\');
        }
        result.push(c);
    }
    result
}
