//! Tag extraction from document text.
//!
//! Tags come from a YAML front-matter `tags`/`tag` field and from inline
//! `#tag` tokens outside fenced code. Results drop the `#`, keep first-seen
//! order and contain no duplicates.

use crate::parser::front_matter_end;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;

static INLINE_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[\s(\[,])#([\p{L}\p{N}_\-/]+)").expect("valid inline tag regex")
});

/// Front-matter tags first, then inline tags in source order.
pub fn extract_tags(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let body_start = front_matter_end(&lines);
    let mut tags = Vec::new();

    if body_start > 0 {
        let yaml = lines[1..body_start - 1].join("\n");
        for tag in front_matter_tags(&yaml) {
            push_tag(&mut tags, &tag);
        }
    }

    let mut in_fence = false;
    for line in &lines[body_start..] {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        for captures in INLINE_TAG_RE.captures_iter(line) {
            if let Some(tag) = captures.get(1) {
                push_tag(&mut tags, tag.as_str());
            }
        }
    }
    tags
}

fn front_matter_tags(yaml: &str) -> Vec<String> {
    let Ok(Value::Mapping(mapping)) = serde_yaml::from_str::<Value>(yaml) else {
        return Vec::new();
    };
    let field = mapping.get("tags").or_else(|| mapping.get("tag"));
    match field {
        Some(Value::String(raw)) => raw
            .split(|ch: char| ch == ',' || ch.is_whitespace())
            .map(str::to_string)
            .collect(),
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn push_tag(tags: &mut Vec<String>, raw: &str) {
    let tag = raw.trim().trim_start_matches('#').trim_end_matches('/');
    if tag.is_empty() || tag.chars().all(|ch| ch.is_ascii_digit()) {
        return;
    }
    if !tags.iter().any(|existing| existing == tag) {
        tags.push(tag.to_string());
    }
}
