//! Inline `#hashtag` rendering.

use super::{html_escape, inline_html, rewrite_text, text};
use pulldown_cmark::Event;
use regex::Regex;
use std::sync::OnceLock;

static HASHTAG_REGEX: OnceLock<Regex> = OnceLock::new();

fn hashtag_regex() -> &'static Regex {
    HASHTAG_REGEX.get_or_init(|| {
        Regex::new(r"(^|[\s(\[,;])#([\p{L}\p{N}_][\p{L}\p{N}_/-]*)").expect("hashtag regex is valid")
    })
}

/// Transformer wrapping `#tags` in `<span class="hashtag">`.
///
/// A tag must start the text or follow whitespace or opening punctuation,
/// and must contain at least one non-digit, so `#1` stays plain text.
#[derive(Debug, Default)]
pub struct HashtagTransformer;

impl HashtagTransformer {
    pub fn new() -> Self {
        Self
    }

    pub fn transform<'a>(&self, events: Vec<Event<'a>>) -> Vec<Event<'a>> {
        rewrite_text(events, true, |content| {
            if !content.contains('#') {
                return None;
            }
            self.tag_text(content)
        })
    }

    fn tag_text<'a>(&self, content: &str) -> Option<Vec<Event<'a>>> {
        let mut events = Vec::new();
        let mut last = 0;

        for caps in hashtag_regex().captures_iter(content) {
            let (Some(prefix), Some(tag)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let name = tag.as_str().trim_end_matches(['-', '/']);
            if name.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }

            let hash_start = prefix.end();
            if hash_start > last {
                events.push(text(&content[last..hash_start]));
            }
            events.push(inline_html(format!(
                "<span class=\"hashtag\">#{}</span>",
                html_escape(name)
            )));
            last = tag.start() + name.len();
        }

        if events.is_empty() {
            return None;
        }
        if last < content.len() {
            events.push(text(&content[last..]));
        }
        Some(events)
    }
}
