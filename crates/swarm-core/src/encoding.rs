//! Text Normalization
//!
//! Tool output arrives as text, bytes or JSON. Everything is turned into a
//! `String` here before the middleware concatenates it:
//!
//! 1. bytes are decoded as UTF-8, falling back to Latin-1 when that fails;
//! 2. "hex corruption" is repaired. Some upstream pipelines replace a
//!    non-ASCII character with its lowercase Latin-1 hex code and fuse it
//!    into the word, so `använde` shows up as `anve4nde`.
//!
//! The repair is a heuristic. A token is rewritten only when it is made of a
//! short letter prefix, exactly one known hex pair and a letter suffix, and
//! is not glued to `.`, `_`, `/` or `-` (file names, identifiers). A pair at
//! the end of a word is left alone, so `file4` or `node5` survive. Pairs
//! without a digit (`fc`, `dc`) look like ordinary letters, so they are only
//! repaired when the same text already contains a digit-bearing corruption.
//!
//! JSON output is repaired value by value: object keys and identifier-like
//! fields (`id`, `name`, `path`, `*_id`, `*_path`) are never touched.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::tool::ToolOutput;

/// Hex pair -> character it stands for
const HEX_TABLE: &[(&str, char)] = &[
    ("e4", 'ä'),
    ("f6", 'ö'),
    ("e5", 'å'),
    ("e9", 'é'),
    ("fc", 'ü'),
    ("c4", 'Ä'),
    ("d6", 'Ö'),
    ("c5", 'Å'),
    ("c9", 'É'),
    ("dc", 'Ü'),
    ("e0", 'à'),
    ("e6", 'æ'),
    ("e7", 'ç'),
    ("f1", 'ñ'),
    ("c6", 'Æ'),
];

const MAX_PREFIX: usize = 10;
const MAX_SUFFIX: usize = 12;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9]+").expect("token pattern is valid"));

fn lookup(pair: &str) -> Option<char> {
    HEX_TABLE
        .iter()
        .find(|(hex, _)| *hex == pair)
        .map(|(_, ch)| *ch)
}

/// A token that looks like `<letters><pair><letters>`, suffix required
struct Candidate {
    pair_at: usize,
    replacement: char,
    letter_only: bool,
}

fn candidate(token: &str) -> Option<Candidate> {
    let mut found: Option<(usize, char)> = None;

    for i in 0..token.len().saturating_sub(1) {
        if let Some(ch) = lookup(&token[i..i + 2]) {
            if found.is_some() {
                // more than one pair: leave it alone
                return None;
            }
            found = Some((i, ch));
        }
    }

    let (pair_at, replacement) = found?;
    let prefix = &token[..pair_at];
    let suffix = &token[pair_at + 2..];

    // a pair ending the word is more likely a number than a letter
    if prefix.is_empty() || suffix.is_empty() {
        return None;
    }
    if prefix.len() > MAX_PREFIX || suffix.len() > MAX_SUFFIX {
        return None;
    }
    if !prefix.bytes().all(|b| b.is_ascii_alphabetic())
        || !suffix.bytes().all(|b| b.is_ascii_alphabetic())
    {
        return None;
    }

    Some(Candidate {
        pair_at,
        replacement,
        letter_only: token[pair_at..pair_at + 2]
            .bytes()
            .all(|b| b.is_ascii_alphabetic()),
    })
}

/// Decode bytes as UTF-8, falling back to Latin-1
pub fn decode_bytes(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(err) => {
            tracing::debug!(
                valid_up_to = err.valid_up_to(),
                len = bytes.len(),
                "Output is not UTF-8, decoding as Latin-1"
            );
            Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect())
        }
    }
}

/// Repair hex-corrupted words; returns the input untouched when nothing matches
pub fn repair_hex_corruption(text: &str) -> Cow<'_, str> {
    let matches: Vec<(regex::Match<'_>, Candidate)> = TOKEN
        .find_iter(text)
        .filter(|m| !glued(text, m.start(), m.end()))
        .filter_map(|m| candidate(m.as_str()).map(|c| (m, c)))
        .collect();

    let evidenced = matches.iter().any(|(_, c)| !c.letter_only);
    if !evidenced {
        return Cow::Borrowed(text);
    }

    let mut repaired = String::with_capacity(text.len());
    let mut cursor = 0;
    let mut count = 0usize;

    for (m, c) in &matches {
        let token = m.as_str();
        repaired.push_str(&text[cursor..m.start()]);
        repaired.push_str(&token[..c.pair_at]);
        repaired.push(c.replacement);
        repaired.push_str(&token[c.pair_at + 2..]);
        cursor = m.end();
        count += 1;
    }
    repaired.push_str(&text[cursor..]);

    tracing::debug!(repaired = count, "Repaired hex-corrupted tokens");
    Cow::Owned(repaired)
}

/// Token touches a path or identifier separator
fn glued(text: &str, start: usize, end: usize) -> bool {
    let is_sep = |c: char| matches!(c, '.' | '_' | '/' | '\\' | '-');
    text[..start].chars().next_back().is_some_and(is_sep)
        || text[end..].chars().next().is_some_and(is_sep)
}

fn repair_owned(text: String) -> String {
    let repaired = match repair_hex_corruption(&text) {
        Cow::Borrowed(_) => None,
        Cow::Owned(repaired) => Some(repaired),
    };
    repaired.unwrap_or(text)
}

fn is_identifier_key(key: &str) -> bool {
    matches!(key, "id" | "name" | "path") || key.ends_with("_id") || key.ends_with("_path")
}

/// Repair string values in place; keys and identifier fields stay as they are
fn repair_json(value: &mut Value) {
    match value {
        Value::String(text) => *text = repair_owned(std::mem::take(text)),
        Value::Array(items) => items.iter_mut().for_each(repair_json),
        Value::Object(map) => {
            for (key, item) in map.iter_mut() {
                if !is_identifier_key(key) {
                    repair_json(item);
                }
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Turn raw tool output into clean text
pub fn normalize_output(output: ToolOutput) -> String {
    match output {
        ToolOutput::Text(text) => repair_owned(text),
        ToolOutput::Bytes(bytes) => repair_owned(decode_bytes(&bytes).into_owned()),
        ToolOutput::Json(Value::String(text)) => repair_owned(text),
        ToolOutput::Json(mut value) => {
            repair_json(&mut value);
            value.to_string()
        }
    }
}
