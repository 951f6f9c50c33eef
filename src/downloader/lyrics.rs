//! LRC text handling for the lyrics endpoint.

use std::collections::HashMap;

const JSONP_CALLBACK: &str = "MusicJsonCallback";

/// Removes a `MusicJsonCallback(...)` wrapper, if present.
pub fn strip_jsonp(body: &str) -> &str {
    let body = body.trim();
    match body
        .strip_prefix(JSONP_CALLBACK)
        .and_then(|rest| rest.trim_start().strip_prefix('('))
    {
        Some(inner) => inner.trim_end().trim_end_matches(';').trim_end_matches(')'),
        None => body,
    }
}

/// Unescapes the HTML entities of the lyrics payload, in a single pass.
pub fn unescape_lyrics(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

/// Splits `[mm:ss.xx]content` into tag and trimmed content.
///
/// Lines without a tag or with empty content yield `None`.
fn split_time_tag(line: &str) -> Option<(&str, &str)> {
    let start = line.find('[')?;
    let end = start + line[start..].find(']')?;
    let content = line[end + 1..].trim();
    if content.is_empty() {
        return None;
    }
    Some((&line[start..=end], content))
}

/// Interleaves a translation into the original lyrics.
///
/// Keeps the original's line order; each translated line is placed right
/// after the original line carrying the same time tag. Untagged and empty
/// lines are dropped.
pub fn merge_translated_lyrics(original: &str, translation: &str) -> String {
    let translated: HashMap<&str, &str> = translation.lines().filter_map(split_time_tag).collect();

    let mut merged = Vec::new();
    for (tag, content) in original.lines().filter_map(split_time_tag) {
        merged.push(format!("{}{}", tag, content));
        if let Some(line) = translated.get(tag) {
            merged.push(format!("{}{}", tag, line));
        }
    }
    merged.join("\n")
}
