//! Markdown processing pipeline with custom extensions.
//!
//! `pulldown-cmark` parses the document into events; a chain of transformers
//! then rewrites the event stream before it is serialized to HTML:
//!
//! 1. adjacent text events are merged so inline syntax is seen whole;
//! 2. headings get collision-safe ids and a trailing anchor link;
//! 3. soft breaks become hard breaks;
//! 4. wikilinks, bare URLs, hashtags and emoji shortcodes are expanded;
//! 5. images pointing at video/audio become embedded players.

pub mod autolinks;
pub mod embeds;
pub mod emoji;
pub mod hashtags;
pub mod wikilinks;

use crate::slug::slugify;
use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag, TagEnd};
use std::collections::HashSet;
use std::io;

pub use autolinks::AutolinkTransformer;
pub use embeds::EmbedTransformer;
pub use emoji::EmojiTransformer;
pub use hashtags::HashtagTransformer;
pub use wikilinks::{SlugResolver, Wikilink, WikilinkResolver, WikilinkTransformer};

/// Markdown processor with custom extensions
#[derive(Debug, Clone)]
pub struct MarkdownProcessor {
    options: Options,
}

impl MarkdownProcessor {
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
        options.insert(Options::ENABLE_DEFINITION_LIST);
        options.insert(Options::ENABLE_GFM);

        Self { options }
    }

    /// Convert markdown to HTML, writing the output to `out`
    pub fn render_into<W: io::Write>(
        &self,
        markdown: &str,
        resolver: &dyn WikilinkResolver,
        out: W,
    ) -> io::Result<()> {
        let events = self.transform(markdown, resolver);
        html::write_html_io(out, events.into_iter())
    }

    /// Convert markdown to an HTML string
    pub fn convert(&self, markdown: &str, resolver: &dyn WikilinkResolver) -> io::Result<String> {
        let mut buf = Vec::with_capacity(markdown.len() * 3 / 2);
        self.render_into(markdown, resolver, &mut buf)?;
        String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn transform<'a>(&self, markdown: &'a str, resolver: &dyn WikilinkResolver) -> Vec<Event<'a>> {
        let events: Vec<Event<'a>> = Parser::new_ext(markdown, self.options).collect();

        let events = merge_text(events);
        let events = assign_heading_ids(events);
        let events = add_heading_anchors(events);
        let events = hard_wrap(events);

        let events = WikilinkTransformer::new(resolver).transform(events);
        let events = AutolinkTransformer::new().transform(events);
        let events = HashtagTransformer::new().transform(events);
        let events = EmojiTransformer::new().transform(events);
        EmbedTransformer::new().transform(events)
    }
}

impl Default for MarkdownProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks whether the current event sits inside code or a link
#[derive(Debug, Default)]
pub(crate) struct Nesting {
    code: usize,
    link: usize,
}

impl Nesting {
    pub(crate) fn observe(&mut self, event: &Event<'_>) {
        match event {
            Event::Start(Tag::CodeBlock(_)) => self.code += 1,
            Event::End(TagEnd::CodeBlock) => self.code = self.code.saturating_sub(1),
            Event::Start(Tag::Link { .. }) | Event::Start(Tag::Image { .. }) => self.link += 1,
            Event::End(TagEnd::Link) | Event::End(TagEnd::Image) => {
                self.link = self.link.saturating_sub(1)
            }
            _ => {}
        }
    }

    pub(crate) fn in_code(&self) -> bool {
        self.code > 0
    }

    pub(crate) fn in_link(&self) -> bool {
        self.link > 0
    }
}

/// Apply `rewrite` to every text event outside code blocks (and outside
/// links when `skip_links` is set). Returning `None` keeps the text as is.
pub(crate) fn rewrite_text<'a, F>(
    events: Vec<Event<'a>>,
    skip_links: bool,
    mut rewrite: F,
) -> Vec<Event<'a>>
where
    F: FnMut(&str) -> Option<Vec<Event<'a>>>,
{
    let mut nesting = Nesting::default();
    let mut result = Vec::with_capacity(events.len());

    for event in events {
        nesting.observe(&event);

        let eligible = !nesting.in_code() && !(skip_links && nesting.in_link());
        match event {
            Event::Text(text) if eligible => match rewrite(&*text) {
                Some(replacement) => result.extend(replacement),
                None => result.push(Event::Text(text)),
            },
            other => result.push(other),
        }
    }

    result
}

/// Owned text event
pub(crate) fn text<'a>(s: impl Into<String>) -> Event<'a> {
    Event::Text(CowStr::from(s.into()))
}

/// Owned inline HTML event
pub(crate) fn inline_html<'a>(s: impl Into<String>) -> Event<'a> {
    Event::InlineHtml(CowStr::from(s.into()))
}

fn merge_text(events: Vec<Event<'_>>) -> Vec<Event<'_>> {
    let mut result: Vec<Event<'_>> = Vec::with_capacity(events.len());

    for event in events {
        if let (Event::Text(next), Some(Event::Text(prev))) = (&event, result.last_mut()) {
            let mut merged = prev.to_string();
            merged.push_str(next);
            *prev = CowStr::from(merged);
            continue;
        }
        result.push(event);
    }

    result
}

fn hard_wrap(events: Vec<Event<'_>>) -> Vec<Event<'_>> {
    events
        .into_iter()
        .map(|event| match event {
            Event::SoftBreak => Event::HardBreak,
            other => other,
        })
        .collect()
}

/// Give every heading an id, keeping explicit `{#id}` attributes and
/// suffixing generated ids (`-1`, `-2`, ...) until they are unique.
fn assign_heading_ids(events: Vec<Event<'_>>) -> Vec<Event<'_>> {
    let mut used: HashSet<String> = events
        .iter()
        .filter_map(|event| match event {
            Event::Start(Tag::Heading { id: Some(id), .. }) => Some(id.to_string()),
            _ => None,
        })
        .collect();

    let titles = collect_heading_titles(&events);
    let mut titles = titles.into_iter();
    let mut result = Vec::with_capacity(events.len());

    for event in events {
        match event {
            Event::Start(Tag::Heading {
                level,
                id,
                classes,
                attrs,
            }) => {
                let title = titles.next().unwrap_or_default();
                let id = match id {
                    Some(id) => id,
                    None => CowStr::from(unique_id(&title, &mut used)),
                };
                result.push(Event::Start(Tag::Heading {
                    level,
                    id: Some(id),
                    classes,
                    attrs,
                }));
            }
            other => result.push(other),
        }
    }

    result
}

fn collect_heading_titles(events: &[Event<'_>]) -> Vec<String> {
    let mut titles = Vec::new();
    let mut current: Option<String> = None;

    for event in events {
        match event {
            Event::Start(Tag::Heading { .. }) => current = Some(String::new()),
            Event::Text(text) | Event::Code(text) => {
                if let Some(title) = current.as_mut() {
                    title.push_str(text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(title) = current.take() {
                    titles.push(title);
                }
            }
            _ => {}
        }
    }

    titles
}

fn unique_id(title: &str, used: &mut HashSet<String>) -> String {
    let mut base = slugify(title);
    if base.is_empty() {
        base = "heading".to_string();
    }

    let mut candidate = base.clone();
    let mut counter = 1;
    while used.contains(&candidate) {
        candidate = format!("{base}-{counter}");
        counter += 1;
    }
    used.insert(candidate.clone());
    candidate
}

fn add_heading_anchors(events: Vec<Event<'_>>) -> Vec<Event<'_>> {
    let mut result = Vec::with_capacity(events.len());
    let mut current_id: Option<String> = None;

    for event in events {
        match event {
            Event::Start(Tag::Heading { ref id, .. }) => {
                current_id = id.as_ref().map(|s| s.to_string());
                result.push(event);
            }
            Event::End(TagEnd::Heading(level)) => {
                if let Some(id) = current_id.take() {
                    let anchor = format!(
                        "<a class=\"heading-anchor\" href=\"#{}\" aria-label=\"Link to heading\">#</a>",
                        html_escape(&id)
                    );
                    result.push(inline_html(anchor));
                }
                result.push(Event::End(TagEnd::Heading(level)));
            }
            other => result.push(other),
        }
    }

    result
}

pub(crate) fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
impl MarkdownProcessor {
    /// Convert with the default slug resolver.
    pub(crate) fn convert_simple(&self, markdown: &str) -> String {
        self.convert(markdown, &SlugResolver).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(md: &str) -> String {
        MarkdownProcessor::new().convert_simple(md)
    }

    #[test]
    fn test_basic_markdown() {
        let html = render("# Hello World\n\nThis is a **test**.");
        assert!(html.contains("<h1 id=\"hello-world\">"));
        assert!(html.contains("<strong>test</strong>"));
    }

    #[test]
    fn test_tables() {
        let md = r#"
| Header 1 | Header 2 |
|----------|----------|
| Cell 1   | Cell 2   |
"#;
        let html = render(md);
        assert!(html.contains("<table>"));
        assert!(html.contains("<th>Header 1</th>"));
    }

    #[test]
    fn test_soft_breaks_become_hard_breaks() {
        let html = render("line one\nline two");
        assert!(html.contains("line one<br />"), "got: {html}");
        assert!(html.contains("line two"));
    }

    #[test]
    fn test_raw_html_passes_through() {
        let html = render("<div class=\"note\">kept</div>\n\nInline <kbd>Ctrl</kbd> too.");
        assert!(html.contains("<div class=\"note\">kept</div>"));
        assert!(html.contains("<kbd>Ctrl</kbd>"));
    }

    #[test]
    fn test_void_elements_are_self_closing() {
        let html = render("above\n\n---\n\n![alt](pic.png)");
        assert!(html.contains("<hr />"));
        assert!(html.contains("<img src=\"pic.png\" alt=\"alt\" />"));
    }

    #[test]
    fn test_heading_ids_are_unique() {
        let html = render("# Intro\n\n## Intro\n\n### Intro\n");
        assert!(html.contains("<h1 id=\"intro\">"));
        assert!(html.contains("<h2 id=\"intro-1\">"));
        assert!(html.contains("<h3 id=\"intro-2\">"));
    }

    #[test]
    fn test_explicit_heading_id_is_reserved() {
        let html = render("# Setup\n\n## Other {#setup}\n");
        assert!(html.contains("<h2 id=\"setup\">"));
        assert!(html.contains("<h1 id=\"setup-1\">"));
    }

    #[test]
    fn test_heading_anchor_link() {
        let html = render("## Getting Started");
        assert!(html.contains("href=\"#getting-started\""));
        assert!(html.contains("class=\"heading-anchor\""));
    }

    #[test]
    fn test_gfm_extensions() {
        let html = render("~~gone~~\n\n- [x] done\n\nText[^1]\n\n[^1]: A note.\n");
        assert!(html.contains("<del>gone</del>"));
        assert!(html.contains("checkbox"));
        assert!(html.contains("footnote-reference"));
        assert!(html.contains("footnote-definition"));
    }

    #[test]
    fn test_definition_list() {
        let html = render("Apple\n: A red fruit\n");
        assert!(html.contains("<dl>"), "got: {html}");
        assert!(html.contains("<dt>Apple"));
        assert!(html.contains("<dd>A red fruit"));
    }

    #[test]
    fn test_wikilinks_resolve_to_slugs() {
        let html = render("See [[Some Page#intro]] and [[Other Page|this]].");
        assert!(html.contains("<a href=\"some_page#intro\">Some Page#intro</a>"), "got: {html}");
        assert!(html.contains("<a href=\"other_page\">this</a>"));
    }

    #[test]
    fn test_code_is_left_alone() {
        let html = render("```\n[[Not A Link]] #notag :smile:\n```\n\n`[[inline]]`");
        assert!(html.contains("[[Not A Link]] #notag :smile:"));
        assert!(html.contains("<code>[[inline]]</code>"));
        assert!(!html.contains("href=\"not_a_link\""));
    }

    #[test]
    fn test_custom_resolver() {
        let resolver = |target: &str, _fragment: Option<&str>| Some(format!("/wiki/{target}"));
        let html = MarkdownProcessor::new()
            .convert("[[Home]]", &resolver)
            .unwrap();
        assert!(html.contains("<a href=\"/wiki/Home\">Home</a>"));
    }

    #[test]
    fn test_merge_text() {
        let events = vec![
            Event::Text(CowStr::Borrowed("[")),
            Event::Text(CowStr::Borrowed("[Page]")),
            Event::Text(CowStr::Borrowed("]")),
            Event::SoftBreak,
            Event::Text(CowStr::Borrowed("after")),
        ];
        let merged = merge_text(events);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0], Event::Text(CowStr::Borrowed("[[Page]]")));
    }
}
