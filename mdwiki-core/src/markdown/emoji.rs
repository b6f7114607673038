//! Emoji shortcodes (`:smile:`) replaced by the emoji itself.

use super::{rewrite_text, text};
use pulldown_cmark::Event;
use regex::Regex;
use std::sync::OnceLock;

static SHORTCODE_REGEX: OnceLock<Regex> = OnceLock::new();

fn shortcode_regex() -> &'static Regex {
    SHORTCODE_REGEX
        .get_or_init(|| Regex::new(r":([a-zA-Z0-9_+-]+):").expect("shortcode regex is valid"))
}

/// Transformer for GitHub-style emoji shortcodes.
///
/// Unknown shortcodes are left as written.
#[derive(Debug, Default)]
pub struct EmojiTransformer;

impl EmojiTransformer {
    pub fn new() -> Self {
        Self
    }

    pub fn transform<'a>(&self, events: Vec<Event<'a>>) -> Vec<Event<'a>> {
        rewrite_text(events, false, |content| {
            replace_shortcodes(content).map(|replaced| vec![text(replaced)])
        })
    }
}

/// Replace known shortcodes, returning `None` when nothing changed
fn replace_shortcodes(content: &str) -> Option<String> {
    let re = shortcode_regex();
    let mut output = String::with_capacity(content.len());
    let mut copied = 0;
    let mut pos = 0;
    let mut changed = false;

    while let Some(caps) = re.captures_at(content, pos) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };

        match emojis::get_by_shortcode(name.as_str()) {
            Some(emoji) => {
                output.push_str(&content[copied..whole.start()]);
                output.push_str(emoji.as_str());
                copied = whole.end();
                pos = whole.end();
                changed = true;
            }
            // The closing colon may open the next shortcode
            None => pos = whole.end() - 1,
        }
    }

    if !changed {
        return None;
    }
    output.push_str(&content[copied..]);
    Some(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_shortcodes() {
        assert_eq!(replace_shortcodes("hi :smile:").as_deref(), Some("hi 😄"));
        assert_eq!(
            replace_shortcodes(":+1: ship it :rocket:").as_deref(),
            Some("👍 ship it 🚀")
        );
    }

    #[test]
    fn test_unknown_shortcodes_kept() {
        assert_eq!(replace_shortcodes("time 10:30:00"), None);
        assert_eq!(replace_shortcodes(":notanemoji:"), None);
    }

    #[test]
    fn test_colon_shared_with_unknown_prefix() {
        assert_eq!(replace_shortcodes("a:zzq:smile:").as_deref(), Some("a:zzq😄"));
    }

    #[test]
    fn test_rendered_in_paragraph() {
        let html = crate::markdown::MarkdownProcessor::new().convert_simple("Nice :tada:");
        assert!(html.contains("Nice 🎉"));
    }
}
