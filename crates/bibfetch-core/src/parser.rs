//! Splitting pasted bibliography text into [`ReferenceRecord`]s.
//!
//! Records are separated by blank lines. A line that opens with a numbering
//! token (`[12]`, `(3)`, `4.`, or a bare integer followed by a word) also
//! starts a new record, so numbered lists pasted without blank lines still
//! split correctly.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ReferenceRecord;

/// Bracketed, parenthesized, or dotted numbering: `[12]`, `(3)`, `4.`.
static MARKED_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:\[\d{1,4}\]|\(\d{1,3}\)|\d{1,3}\.(?:\s|$))\s*").unwrap());

/// A bare leading integer followed by a word: `7 Smith J ...`.
/// Capped at three digits so a line opening with a year is not mistaken for numbering.
static BARE_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d{1,3}\s+\p{L}").unwrap());

/// Byte length of the numbering token (plus following whitespace) at the start of `line`.
fn numbering_token_len(line: &str) -> Option<usize> {
    if let Some(m) = MARKED_NUMBER_RE.find(line) {
        return Some(m.end());
    }
    BARE_NUMBER_RE.find(line).map(|m| {
        // Keep the first letter of the word that followed the number.
        let matched = m.as_str();
        let last_char_len = matched.chars().last().map_or(0, char::len_utf8);
        m.end() - last_char_len
    })
}

/// Split raw bibliography text into ordered, 1-based reference records.
///
/// Pure function of the input. Every non-blank line ends up in exactly one
/// record's `raw_text`; empty or whitespace-only input yields no records.
pub fn parse_references(text: &str) -> Vec<ReferenceRecord> {
    let mut records = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            flush(&mut current, &mut records);
            continue;
        }
        if !current.is_empty() && numbering_token_len(line).is_some() {
            flush(&mut current, &mut records);
        }
        current.push(line);
    }
    flush(&mut current, &mut records);

    tracing::debug!(count = records.len(), "parsed references");
    records
}

fn flush(current: &mut Vec<&str>, records: &mut Vec<ReferenceRecord>) {
    if current.is_empty() {
        return;
    }

    let raw_text = current.join("\n");

    let mut parts: Vec<&str> = Vec::with_capacity(current.len());
    for (i, line) in current.iter().enumerate() {
        let line = if i == 0 {
            numbering_token_len(line).map_or(*line, |len| &line[len..])
        } else {
            line
        };
        let line = line.trim();
        if !line.is_empty() {
            parts.push(line);
        }
    }
    let mut stripped_text = parts.join(" ");
    // A record that was nothing but a number keeps its raw text so it is never blank.
    if stripped_text.is_empty() {
        stripped_text = raw_text.trim().to_string();
    }

    records.push(ReferenceRecord {
        index: records.len() + 1,
        raw_text,
        stripped_text,
    });
    current.clear();
}
