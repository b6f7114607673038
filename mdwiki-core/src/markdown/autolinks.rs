//! Bare URL autolinking (`https://...` and `www....`), GFM style.

use super::{rewrite_text, text};
use pulldown_cmark::{CowStr, Event, LinkType, Tag, TagEnd};
use regex::Regex;
use std::sync::OnceLock;

static URL_REGEX: OnceLock<Regex> = OnceLock::new();

fn url_regex() -> &'static Regex {
    URL_REGEX.get_or_init(|| {
        Regex::new(r#"(?i)\b(?:https?://|www\.)[^\s<>"]+"#).expect("autolink regex is valid")
    })
}

/// Trim trailing punctuation that almost always belongs to the sentence,
/// plus closing parentheses without a matching opener.
fn trim_url(candidate: &str) -> &str {
    let mut url = candidate;
    loop {
        let Some(last) = url.chars().last() else {
            return url;
        };
        let trimmed = match last {
            '.' | ',' | ':' | ';' | '!' | '?' | '*' | '_' | '~' | '\'' => true,
            ')' => url.matches(')').count() > url.matches('(').count(),
            _ => false,
        };
        if !trimmed {
            return url;
        }
        url = &url[..url.len() - last.len_utf8()];
    }
}

/// Transformer turning bare URLs in text into links
#[derive(Debug, Default)]
pub struct AutolinkTransformer;

impl AutolinkTransformer {
    pub fn new() -> Self {
        Self
    }

    pub fn transform<'a>(&self, events: Vec<Event<'a>>) -> Vec<Event<'a>> {
        rewrite_text(events, true, |content| {
            if !url_regex().is_match(content) {
                return None;
            }
            Some(self.link_urls(content))
        })
    }

    fn link_urls<'a>(&self, content: &str) -> Vec<Event<'a>> {
        let mut events = Vec::new();
        let mut last = 0;

        for found in url_regex().find_iter(content) {
            let url = trim_url(found.as_str());
            // a bare scheme or "www." with nothing after it is not a link
            if url.ends_with("://") || url.eq_ignore_ascii_case("www.") {
                continue;
            }

            if found.start() > last {
                events.push(text(&content[last..found.start()]));
            }

            let href = if url.len() >= 4 && url[..4].eq_ignore_ascii_case("www.") {
                format!("http://{url}")
            } else {
                url.to_string()
            };

            events.push(Event::Start(Tag::Link {
                link_type: LinkType::Autolink,
                dest_url: CowStr::from(href),
                title: CowStr::Borrowed(""),
                id: CowStr::Borrowed(""),
            }));
            events.push(text(url));
            events.push(Event::End(TagEnd::Link));

            last = found.start() + url.len();
        }

        if last < content.len() {
            events.push(text(&content[last..]));
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::MarkdownProcessor;

    #[test]
    fn test_trim_url() {
        assert_eq!(trim_url("https://example.com."), "https://example.com");
        assert_eq!(trim_url("https://example.com/a_(b)"), "https://example.com/a_(b)");
        assert_eq!(trim_url("https://example.com/x)"), "https://example.com/x");
        assert_eq!(trim_url("https://example.com?!"), "https://example.com");
    }

    #[test]
    fn test_bare_urls_are_linked() {
        let html = MarkdownProcessor::new()
            .convert_simple("Visit https://example.com/docs. Or www.rust-lang.org today");
        assert!(html.contains("<a href=\"https://example.com/docs\">https://example.com/docs</a>."));
        assert!(html.contains("<a href=\"http://www.rust-lang.org\">www.rust-lang.org</a> today"));
    }

    #[test]
    fn test_explicit_links_untouched() {
        let html = MarkdownProcessor::new().convert_simple("[site](https://example.com)");
        assert_eq!(html.matches("<a ").count(), 1);
        assert!(html.contains(">site</a>"));
    }

    #[test]
    fn test_plain_text_untouched() {
        let events = vec![Event::Text(CowStr::Borrowed("no links here"))];
        let result = AutolinkTransformer::new().transform(events.clone());
        assert_eq!(result, events);
    }
}
