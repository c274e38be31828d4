//! Fragment extraction from model output
//!
//! Models answer with prose around fenced blocks:
//!
//! ````text
//! Here is the change:
//!
//! ```java
//! int a = 1;
//! // Version 2
//! int a = 2;
//! ```
//! ````
//!
//! `extract_code` selects the fences matching a language tag (falling back to untagged
//! fences, then to the whole text) and splits each selected fence on version-marker
//! comment lines. `extract_doc` finds the first documentation comment in that selection.

use crate::models::{ExtractedFragment, FragmentKind};
use regex::Regex;
use std::sync::OnceLock;

const FENCE: &str = "```";
const DOC_OPENER: &str = "/**";
const DOC_CLOSER: &str = "*/";

fn version_marker_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"^\s*(?://+|#+|--|/\*+)\s*Version\s+\d+\s*(?:\*+/)?\s*$")
            .expect("version marker regex must compile")
    })
}

/// Which tagged fences end up in the typed list.
#[derive(Clone, Copy)]
enum TagFilter<'a> {
    Exact(&'a str),
    Any,
}

impl TagFilter<'_> {
    fn accepts(&self, tag: &str) -> bool {
        match self {
            TagFilter::Exact(target) => tag == *target,
            TagFilter::Any => true,
        }
    }
}

/// Whether a single line is a `Version <n>` comment.
pub fn is_version_marker(line: &str) -> bool {
    version_marker_regex().is_match(line.trim_end_matches(['\r', '\n']))
}

/// Split a fence body on version-marker lines.
///
/// A body without markers is returned as one piece, even when empty. Around markers,
/// whitespace-only pieces are dropped.
fn split_versions(body: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut piece_start = 0;
    let mut offset = 0;
    let mut saw_marker = false;

    for line in body.split_inclusive('\n') {
        if is_version_marker(line) {
            saw_marker = true;
            pieces.push(&body[piece_start..offset]);
            piece_start = offset + line.len();
        }
        offset += line.len();
    }
    pieces.push(&body[piece_start..]);

    if saw_marker {
        pieces.retain(|piece| !piece.trim().is_empty());
    }
    pieces
}

fn select_fragments(text: &str, filter: TagFilter<'_>) -> Vec<ExtractedFragment> {
    let mut typed = Vec::new();
    let mut untyped = Vec::new();
    let mut saw_fence = false;
    let mut cursor = 0;

    while let Some(found) = text[cursor..].find(FENCE) {
        saw_fence = true;
        let after_marker = cursor + found + FENCE.len();

        let (tag, body_start) = match text[after_marker..].find('\n') {
            Some(newline) => (
                text[after_marker..after_marker + newline].trim(),
                after_marker + newline + 1,
            ),
            None => (text[after_marker..].trim(), text.len()),
        };

        // An unclosed fence runs to the end of the text.
        let (body_end, next) = match text[body_start..].find(FENCE) {
            Some(close) => (body_start + close, body_start + close + FENCE.len()),
            None => (text.len(), text.len()),
        };

        let target = if tag.is_empty() {
            Some(&mut untyped)
        } else if filter.accepts(tag) {
            Some(&mut typed)
        } else {
            None
        };

        if let Some(list) = target {
            for (version, piece) in split_versions(&text[body_start..body_end])
                .into_iter()
                .enumerate()
            {
                list.push(ExtractedFragment::new(FragmentKind::Code, version, piece));
            }
        }

        cursor = next;
    }

    if !typed.is_empty() {
        typed
    } else if !untyped.is_empty() {
        untyped
    } else if !saw_fence {
        vec![ExtractedFragment::new(FragmentKind::Plain, 0, text)]
    } else {
        Vec::new()
    }
}

/// Extract the code fragments tagged `target_tag` from model output.
///
/// Precedence: fences tagged `target_tag`, then untagged fences, then (only when the
/// text holds no fence at all) the whole text as one plain fragment. Fences with any
/// other tag are ignored.
pub fn extract_code(text: &str, target_tag: &str) -> Vec<ExtractedFragment> {
    select_fragments(text, TagFilter::Exact(target_tag))
}

/// Find the first documentation comment in model output.
///
/// Fences are selected regardless of their tag. The returned text starts at the `/**`
/// opener, runs to the end of the line holding the matching `*/`, and always ends with
/// a newline.
pub fn extract_doc(text: &str) -> Option<ExtractedFragment> {
    select_fragments(text, TagFilter::Any)
        .iter()
        .find_map(|fragment| find_doc_comment(&fragment.text).map(|doc| (fragment.version, doc)))
        .map(|(version, doc)| ExtractedFragment::new(FragmentKind::Doc, version, doc))
}

fn find_doc_comment(text: &str) -> Option<String> {
    let open = text.find(DOC_OPENER)?;
    let close_search = open + DOC_OPENER.len();
    let close = close_search + text[close_search..].find(DOC_CLOSER)?;
    let after_close = close + DOC_CLOSER.len();
    let line_end = match text[after_close..].find('\n') {
        Some(newline) => after_close + newline + 1,
        None => text.len(),
    };

    let mut doc = text[open..line_end].to_string();
    if !doc.ends_with('\n') {
        doc.push('\n');
    }
    Some(doc)
}
