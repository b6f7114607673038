//! Wikilink transformation for `[[target]]`, `[[target|text]]`,
//! `[[target#fragment]]` and embedded `![[target]]` syntax.

use super::{rewrite_text, text};
use crate::slug::canonicalize;
use pulldown_cmark::{CowStr, Event, LinkType, Tag, TagEnd};

/// Maps a wikilink target to the URL it should point at.
pub trait WikilinkResolver {
    /// Destination for `target` and optional `fragment`, or `None` to render
    /// the link as plain text.
    fn resolve(&self, target: &str, fragment: Option<&str>) -> Option<String>;
}

impl<F> WikilinkResolver for F
where
    F: Fn(&str, Option<&str>) -> Option<String>,
{
    fn resolve(&self, target: &str, fragment: Option<&str>) -> Option<String> {
        self(target, fragment)
    }
}

/// Resolves targets to page slugs relative to the site root.
///
/// The target is canonicalized; the fragment is appended verbatim. Whether
/// the page exists is not checked, so dangling links simply 404.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlugResolver;

impl WikilinkResolver for SlugResolver {
    fn resolve(&self, target: &str, fragment: Option<&str>) -> Option<String> {
        if target.is_empty() && fragment.is_none() {
            return None;
        }

        let mut dest = canonicalize(target);
        if let Some(fragment) = fragment {
            dest.push('#');
            dest.push_str(fragment);
        }
        Some(dest)
    }
}

/// The parts of one `[[...]]` occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wikilink<'a> {
    pub target: &'a str,
    pub fragment: Option<&'a str>,
    pub label: Option<&'a str>,
    pub embed: bool,
}

impl<'a> Wikilink<'a> {
    /// Parse the text between `[[` and `]]`
    pub fn parse(inner: &'a str, embed: bool) -> Self {
        let (destination, label) = match inner.split_once('|') {
            Some((destination, label)) => (destination.trim(), Some(label.trim())),
            None => (inner.trim(), None),
        };

        let (target, fragment) = match destination.split_once('#') {
            Some((target, fragment)) => (target.trim(), Some(fragment.trim())),
            None => (destination, None),
        };

        Self {
            target,
            fragment: fragment.filter(|f| !f.is_empty()),
            label: label.filter(|l| !l.is_empty()),
            embed,
        }
    }

    /// Text shown for the link: the label, or the destination as written
    pub fn display(&self) -> String {
        if let Some(label) = self.label {
            return label.to_string();
        }
        match self.fragment {
            Some(fragment) => format!("{}#{}", self.target, fragment),
            None => self.target.to_string(),
        }
    }
}

/// Transformer for wikilink syntax
pub struct WikilinkTransformer<'r> {
    resolver: &'r dyn WikilinkResolver,
}

impl<'r> WikilinkTransformer<'r> {
    pub fn new(resolver: &'r dyn WikilinkResolver) -> Self {
        Self { resolver }
    }

    /// Transform events, converting `[[wikilinks]]` to links and images
    pub fn transform<'a>(&self, events: Vec<Event<'a>>) -> Vec<Event<'a>> {
        rewrite_text(events, true, |content| {
            if content.contains("[[") && content.contains("]]") {
                Some(self.process_wikilinks(content))
            } else {
                None
            }
        })
    }

    fn process_wikilinks<'a>(&self, content: &str) -> Vec<Event<'a>> {
        let mut events = Vec::new();
        let mut remaining = content;

        while let Some(start) = remaining.find("[[") {
            let Some(len) = remaining[start + 2..].find("]]") else {
                break;
            };

            let embed = remaining[..start].ends_with('!');
            let prefix_end = if embed { start - 1 } else { start };
            if prefix_end > 0 {
                events.push(text(&remaining[..prefix_end]));
            }

            let inner = &remaining[start + 2..start + 2 + len];
            let raw = &remaining[prefix_end..start + 2 + len + 2];
            events.extend(self.create_link(Wikilink::parse(inner, embed), raw));

            remaining = &remaining[start + 2 + len + 2..];
        }

        if !remaining.is_empty() {
            events.push(text(remaining));
        }

        events
    }

    fn create_link<'a>(&self, link: Wikilink<'_>, raw: &str) -> Vec<Event<'a>> {
        let Some(dest) = self.resolver.resolve(link.target, link.fragment) else {
            let shown = if link.target.is_empty() && link.fragment.is_none() {
                raw.to_string()
            } else {
                link.display()
            };
            return vec![text(shown)];
        };

        let dest_url = CowStr::from(dest);
        let (start, end) = if link.embed {
            (
                Tag::Image {
                    link_type: LinkType::Inline,
                    dest_url,
                    title: CowStr::Borrowed(""),
                    id: CowStr::Borrowed(""),
                },
                TagEnd::Image,
            )
        } else {
            (
                Tag::Link {
                    link_type: LinkType::Inline,
                    dest_url,
                    title: CowStr::Borrowed(""),
                    id: CowStr::Borrowed(""),
                },
                TagEnd::Link,
            )
        };

        vec![Event::Start(start), text(link.display()), Event::End(end)]
    }
}
