//! Slug generation: page slugs, display titles, and heading anchors.

use unicode_segmentation::UnicodeSegmentation;

/// Convert a title to the canonical page slug.
///
/// Spaces become underscores and the result is lowercased. Nothing else is
/// touched, so the transform is total and idempotent.
///
/// # Examples
///
/// ```
/// use mdwiki_core::canonicalize;
///
/// assert_eq!(canonicalize("My Page"), "my_page");
/// assert_eq!(canonicalize("my_page"), "my_page");
/// ```
pub fn canonicalize(title: &str) -> String {
    title.replace(' ', "_").to_lowercase()
}

/// Turn a slug or file stem back into a display title.
///
/// Underscores become spaces, then every whitespace-delimited word gets an
/// uppercase first letter with the rest lowercased. This only approximates
/// the inverse of [`canonicalize`]: case and separators are lost on the way
/// in.
///
/// ```
/// use mdwiki_core::prettify;
///
/// assert_eq!(prettify("my_page"), "My Page");
/// assert_eq!(prettify("the_lord_of_the_rings"), "The Lord Of The Rings");
/// ```
pub fn prettify(name: &str) -> String {
    let mut title = String::with_capacity(name.len());
    let mut word_start = true;
    for c in name.chars() {
        let c = if c == '_' { ' ' } else { c };
        if c.is_whitespace() {
            title.push(c);
            word_start = true;
        } else if word_start {
            title.extend(c.to_uppercase());
            word_start = false;
        } else {
            title.extend(c.to_lowercase());
        }
    }
    title
}

/// Convert arbitrary text to a hyphenated anchor id.
///
/// Used for heading ids, not for page slugs.
///
/// ```
/// use mdwiki_core::slugify;
///
/// assert_eq!(slugify("Hello World"), "hello-world");
/// assert_eq!(slugify("Rust & Safety"), "rust-safety");
/// ```
pub fn slugify(input: &str) -> String {
    let lowercased = input.to_lowercase();

    let cleaned = lowercased
        .graphemes(true)
        .filter_map(|g| {
            let c = g.chars().next()?;
            match c {
                ' ' | '_' | '\t' | '\n' | '-' => Some("-"),
                c if c.is_alphanumeric() => Some(g),
                _ => None,
            }
        })
        .collect::<String>();

    // Collapse runs of hyphens and trim them from both ends
    cleaned
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
