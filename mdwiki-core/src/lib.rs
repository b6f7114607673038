//! # mdwiki-core
//!
//! Core library for the mdwiki live markdown server.
//!
//! This crate keeps an in-memory index of the markdown documents under a set
//! of directories, keeps it in sync with the filesystem, and renders indexed
//! documents to HTML with wikilinks resolved to page slugs.

pub mod config;
pub mod exclude;
pub mod frontmatter;
pub mod index;
pub mod markdown;
pub mod models;
pub mod render;
pub mod slug;
pub mod watcher;

pub use config::{Config, ConfigError, ServerConfig};
pub use exclude::{ExcludeError, ExcludeRules};
pub use frontmatter::{FrontmatterError, Metadata};
pub use index::{ContentIndex, ScanError, ScanSummary};
pub use markdown::{MarkdownProcessor, SlugResolver, WikilinkResolver};
pub use models::DocumentRecord;
pub use render::{RenderError, Renderer};
pub use slug::{canonicalize, prettify, slugify};
pub use watcher::{IndexWatcher, WatchError};
