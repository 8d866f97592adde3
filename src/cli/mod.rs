//! CLI-specific utilities for catchment
//!
//! Terminal concerns live here, separate from the engine in `catchment::core`.

pub mod progress;

pub use progress::ProgressTracker;
