//! Best-effort recovery of a JSON object from generated text.
//!
//! Generated text often wraps the object in prose or markdown fences, or
//! trails extra tokens after it. Fenced blocks are tried first, then every
//! balanced `{...}` span in the whole text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)```(?:json|python|py)?\r?\n([\s\S]*?)```").expect("fence pattern is valid")
});

/// Extract the first JSON value recoverable from `text`.
pub fn extract_json(text: &str) -> Option<Value> {
    for caps in FENCE.captures_iter(text) {
        let block = caps.get(1).map_or("", |m| m.as_str());
        if let Ok(value) = serde_json::from_str::<Value>(block) {
            return Some(value);
        }
        if let Some(value) = extract_balanced(block) {
            return Some(value);
        }
    }

    extract_balanced(text)
}

/// Try every `{` as the start of a balanced object and return the first
/// span that parses.
pub fn extract_balanced(text: &str) -> Option<Value> {
    text.char_indices()
        .filter(|&(_, ch)| ch == '{')
        .find_map(|(start, _)| {
            let end = balanced_end(&text[start..])?;
            serde_json::from_str::<Value>(&text[start..start + end]).ok()
        })
}

/// Byte length of the balanced object starting at `text[0] == '{'`.
///
/// Braces inside string literals do not count towards nesting.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escape = false;

    for (index, ch) in text.char_indices() {
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(index + ch.len_utf8());
                }
            }
            _ => {}
        }
    }

    None
}
