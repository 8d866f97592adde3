//! Common utilities for the catchment toolkit

pub mod error;

pub use error::{Error, Result};
