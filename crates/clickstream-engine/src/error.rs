//! Error types for the simulator binary.
//!
//! [`EngineError`] wraps every failure mode during startup and the
//! simulation run so `main` can propagate with `?`.

/// Top-level error for the simulator binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: clickstream_core::ConfigError,
    },

    /// The sitemap could not be loaded.
    #[error("sitemap error: {source}")]
    Site {
        /// The underlying site error.
        #[from]
        source: clickstream_site::SiteError,
    },

    /// Starting or running the workers failed.
    #[error("supervisor error: {source}")]
    Supervisor {
        /// The underlying supervisor error.
        #[from]
        source: clickstream_core::SupervisorError,
    },
}
