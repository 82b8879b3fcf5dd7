//! Error types for site tree construction.

/// Errors that can occur while loading a sitemap or building the site tree.
#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    /// The sitemap could not be fetched over HTTP.
    #[error("failed to fetch sitemap {source_url}: {source}")]
    Fetch {
        /// The URL being fetched.
        source_url: String,
        /// The underlying HTTP error.
        source: reqwest::Error,
    },

    /// The sitemap file could not be read from disk.
    #[error("failed to read sitemap {path}: {source}")]
    Io {
        /// The file path being read.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The sitemap source produced no usable paths.
    #[error("sitemap {source_name} contains no page locations")]
    Empty {
        /// The sitemap source that was loaded.
        source_name: String,
    },

    /// No sitemap source was configured.
    #[error("no sitemap source configured")]
    MissingSource,
}
