//! Media embeds: image syntax pointing at a video or audio source becomes a
//! player instead of an `<img>`.
//!
//! - YouTube and Vimeo page URLs become `<iframe>` players
//! - `.mp4`, `.webm`, `.ogv`, `.mov` become `<video>`
//! - `.mp3`, `.ogg`, `.wav`, `.m4a` become `<audio>`
//!
//! Anything else stays an ordinary image.

use super::{html_escape, inline_html};
use pulldown_cmark::{Event, Tag, TagEnd};
use regex::Regex;
use std::sync::OnceLock;

static YOUTUBE_REGEX: OnceLock<Regex> = OnceLock::new();
static VIMEO_REGEX: OnceLock<Regex> = OnceLock::new();

fn youtube_regex() -> &'static Regex {
    YOUTUBE_REGEX.get_or_init(|| {
        Regex::new(
            r"^(?:https?:)?//(?:www\.|m\.)?(?:youtube\.com/(?:watch\?(?:.*&)?v=|embed/)|youtu\.be/)([A-Za-z0-9_-]+)",
        )
        .expect("youtube regex is valid")
    })
}

fn vimeo_regex() -> &'static Regex {
    VIMEO_REGEX.get_or_init(|| {
        Regex::new(r"^(?:https?:)?//(?:www\.|player\.)?vimeo\.com/(?:video/)?([0-9]+)")
            .expect("vimeo regex is valid")
    })
}

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "ogv", "mov"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "ogg", "wav", "m4a"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Media {
    YouTube(String),
    Vimeo(String),
    Video,
    Audio,
}

impl Media {
    fn detect(url: &str) -> Option<Self> {
        if let Some(caps) = youtube_regex().captures(url) {
            return Some(Media::YouTube(caps[1].to_string()));
        }
        if let Some(caps) = vimeo_regex().captures(url) {
            return Some(Media::Vimeo(caps[1].to_string()));
        }

        let extension = file_extension(url)?;
        if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
            Some(Media::Video)
        } else if AUDIO_EXTENSIONS.contains(&extension.as_str()) {
            Some(Media::Audio)
        } else {
            None
        }
    }

    fn to_html(&self, src: &str, title: &str, alt: &str) -> String {
        let title_attr = if title.is_empty() {
            String::new()
        } else {
            format!(" title=\"{}\"", html_escape(title))
        };

        match self {
            Media::YouTube(id) => format!(
                "<iframe class=\"embed-video\" width=\"560\" height=\"315\" \
                 src=\"https://www.youtube.com/embed/{}\"{} frameborder=\"0\" \
                 allowfullscreen=\"allowfullscreen\"></iframe>",
                html_escape(id),
                title_attr
            ),
            Media::Vimeo(id) => format!(
                "<iframe class=\"embed-video\" width=\"560\" height=\"315\" \
                 src=\"https://player.vimeo.com/video/{}\"{} frameborder=\"0\" \
                 allowfullscreen=\"allowfullscreen\"></iframe>",
                html_escape(id),
                title_attr
            ),
            Media::Video => format!(
                "<video class=\"embed-video\" controls=\"controls\" src=\"{}\"{}>{}</video>",
                html_escape(src),
                title_attr,
                html_escape(alt)
            ),
            Media::Audio => format!(
                "<audio class=\"embed-audio\" controls=\"controls\" src=\"{}\"{}>{}</audio>",
                html_escape(src),
                title_attr,
                html_escape(alt)
            ),
        }
    }
}

/// Lowercased extension of the URL path, ignoring query and fragment
fn file_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next().unwrap_or(path);
    let (_, extension) = name.rsplit_once('.')?;
    if extension.is_empty() {
        return None;
    }
    Some(extension.to_ascii_lowercase())
}

/// An image currently being collected
struct PendingImage<'a> {
    start: Event<'a>,
    dest: String,
    title: String,
    media: Media,
    inner: Vec<Event<'a>>,
    depth: usize,
}

/// Transformer replacing media images with embedded players
#[derive(Debug, Default)]
pub struct EmbedTransformer;

impl EmbedTransformer {
    pub fn new() -> Self {
        Self
    }

    pub fn transform<'a>(&self, events: Vec<Event<'a>>) -> Vec<Event<'a>> {
        let mut result = Vec::with_capacity(events.len());
        let mut pending: Option<PendingImage<'a>> = None;

        for event in events {
            if let Some(mut image) = pending.take() {
                match &event {
                    Event::Start(Tag::Image { .. }) => image.depth += 1,
                    Event::End(TagEnd::Image) if image.depth == 0 => {
                        let alt = alt_text(&image.inner);
                        let html = image.media.to_html(&image.dest, &image.title, &alt);
                        result.push(inline_html(html));
                        continue;
                    }
                    Event::End(TagEnd::Image) => image.depth -= 1,
                    _ => {}
                }
                image.inner.push(event);
                pending = Some(image);
                continue;
            }

            let detected = match &event {
                Event::Start(Tag::Image {
                    dest_url, title, ..
                }) => Media::detect(dest_url)
                    .map(|media| (media, dest_url.to_string(), title.to_string())),
                _ => None,
            };

            match detected {
                Some((media, dest, title)) => {
                    pending = Some(PendingImage {
                        start: event,
                        dest,
                        title,
                        media,
                        inner: Vec::new(),
                        depth: 0,
                    });
                }
                None => result.push(event),
            }
        }

        // An unterminated image is emitted untouched
        if let Some(image) = pending {
            result.push(image.start);
            result.extend(image.inner);
        }

        result
    }
}

fn alt_text(events: &[Event<'_>]) -> String {
    let mut alt = String::new();
    for event in events {
        match event {
            Event::Text(text) | Event::Code(text) => alt.push_str(text),
            Event::SoftBreak | Event::HardBreak => alt.push(' '),
            _ => {}
        }
    }
    alt
}
