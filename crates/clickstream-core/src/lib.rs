//! Simulation engine for the Clickstream traffic simulator.
//!
//! Each worker owns a live population of simulated visitors and advances it
//! once per tick: admitting newcomers, letting visitors dwell, navigate or
//! leave, and publishing one page-view event per visitor action. A
//! supervisor runs many workers in parallel over one shared site tree.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `clickstream-config.yaml`
//! - [`random`] -- Jitter, admission and navigation draws
//! - [`stop`] -- Cooperative stop signal shared by all workers
//! - [`user`] -- Per-visitor state
//! - [`worker`] -- The per-worker tick loop
//! - [`supervisor`] -- Spawning, stopping and awaiting workers

pub mod config;
pub mod random;
pub mod stop;
pub mod supervisor;
pub mod user;
pub mod worker;

pub use config::{ClickstreamConfig, ConfigError, LoggingConfig, SimulationConfig};
pub use stop::{StopHandle, StopSignal, stop_channel};
pub use supervisor::{Supervisor, SupervisorError};
pub use user::SimulatedUser;
pub use worker::{Navigation, TickSummary, Worker, WorkerConfig, WorkerError, WorkerReport};
