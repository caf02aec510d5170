//! Tolerant JSON object extraction from model text.
//!
//! Models wrap JSON in code fences or surround it with prose. These helpers
//! recover the first object they can find.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref FENCED_BLOCK: Regex =
        Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)```").unwrap();
}

/// Find a JSON object in `text`.
///
/// Tries, in order: the whole text, each fenced code block, then every
/// balanced `{...}` span in the text.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Some(value) = parse_object(trimmed) {
        return Some(value);
    }

    for caps in FENCED_BLOCK.captures_iter(text) {
        if let Some(value) = caps.get(1).and_then(|m| parse_object(m.as_str().trim())) {
            return Some(value);
        }
    }

    let mut offset = 0;
    while let Some(start) = text[offset..].find('{') {
        let start = offset + start;
        if let Some(end) = balanced_end(&text[start..]) {
            if let Some(value) = parse_object(&text[start..start + end]) {
                return Some(value);
            }
        }
        offset = start + 1;
    }

    None
}

fn parse_object(candidate: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Byte length of the balanced object starting at `text[0] == '{'`.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }

    None
}
