//! Shared type definitions for the Clickstream traffic simulator.
//!
//! Types defined here are the contract between the simulation engine and
//! whatever consumes the emitted event stream downstream.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrapper for simulated visitor identifiers
//! - [`event`] -- The page-view record published once per user per tick
//! - [`referrer`] -- Fixed list of reference sites used for arrivals

pub mod event;
pub mod ids;
pub mod referrer;

// Re-export all public types at crate root for convenience.
pub use event::PageViewEvent;
pub use ids::UserId;
pub use referrer::{SAMPLE_REFERRERS, random_referrer};
