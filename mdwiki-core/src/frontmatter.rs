//! Frontmatter parsing from markdown files.
//!
//! A document may open with a YAML block fenced by `---` lines or a TOML
//! block fenced by `+++` lines. Everything after the closing fence is the
//! renderable body.

use serde_yaml::{Mapping, Value};
use thiserror::Error;

/// Parsed frontmatter fields, keyed by name
pub type Metadata = Mapping;

#[derive(Error, Debug)]
pub enum FrontmatterError {
    #[error("Invalid YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Frontmatter opened with `{0}` is never closed")]
    Unterminated(&'static str),

    #[error("Frontmatter must be a mapping of fields")]
    NotAMapping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Toml,
}

impl Format {
    fn delimiter(self) -> &'static str {
        match self {
            Format::Yaml => "---",
            Format::Toml => "+++",
        }
    }

    fn from_line(line: &str) -> Option<Self> {
        match line.trim_end() {
            "---" => Some(Format::Yaml),
            "+++" => Some(Format::Toml),
            _ => None,
        }
    }
}

/// Split a document into its metadata and body.
///
/// Documents without a leading fence yield empty metadata and the whole
/// input as body.
///
/// # Example
///
/// ```
/// use mdwiki_core::frontmatter::{split, title};
///
/// let content = "---\ntitle: My Post\n---\n# Hello World\n";
///
/// let (meta, body) = split(content).unwrap();
/// assert_eq!(title(&meta), Some("My Post"));
/// assert_eq!(body, "# Hello World\n");
/// ```
pub fn split(content: &str) -> Result<(Metadata, &str), FrontmatterError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let (first_line, rest) = next_line(content);
    let Some(format) = Format::from_line(first_line) else {
        return Ok((Metadata::new(), content));
    };

    let mut offset = 0;
    let mut remaining = rest;
    while !remaining.is_empty() {
        let (line, after) = next_line(remaining);
        if line.trim_end() == format.delimiter() {
            let block = &rest[..offset];
            let metadata = parse_block(format, block)?;
            return Ok((metadata, after));
        }
        offset += remaining.len() - after.len();
        remaining = after;
    }

    Err(FrontmatterError::Unterminated(format.delimiter()))
}

/// The `title` field, when present as a non-blank string
pub fn title(metadata: &Metadata) -> Option<&str> {
    metadata
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Split off the first line, returning it without its line terminator
fn next_line(text: &str) -> (&str, &str) {
    match text.find('\n') {
        Some(pos) => (text[..pos].trim_end_matches('\r'), &text[pos + 1..]),
        None => (text, ""),
    }
}

fn parse_block(format: Format, block: &str) -> Result<Metadata, FrontmatterError> {
    let value = match format {
        Format::Yaml => serde_yaml::from_str::<Value>(block)?,
        Format::Toml => {
            let table: toml::Table = toml::from_str(block)?;
            serde_yaml::to_value(table)?
        }
    };

    match value {
        Value::Null => Ok(Metadata::new()),
        Value::Mapping(mapping) => Ok(mapping),
        _ => Err(FrontmatterError::NotAMapping),
    }
}
