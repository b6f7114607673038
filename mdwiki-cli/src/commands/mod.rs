//! CLI command implementations.

pub mod new;
pub mod serve;

pub use new::new_document;
pub use serve::{serve_wiki, ServeOptions};
