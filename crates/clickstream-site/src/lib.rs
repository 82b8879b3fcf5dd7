//! Site structure model for the Clickstream traffic simulator.
//!
//! The site is a tree of pages decomposed from a flat list of URL paths.
//! It is built once at startup and shared read-only by every worker.
//!
//! # Modules
//!
//! - [`tree`] -- Arena-backed page tree with randomized traversal
//! - [`sitemap`] -- Resolving a sitemap URL or file into URL paths
//! - [`error`] -- Construction errors

pub mod error;
pub mod sitemap;
pub mod tree;

pub use error::SiteError;
pub use sitemap::{extract_paths, load_paths};
pub use tree::{Page, PageId, SiteTree};
