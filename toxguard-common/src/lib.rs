//! # ToxGuard Common Library
//!
//! Shared code for the ToxGuard service:
//! - Configuration resolution (CLI/env, TOML file, compiled defaults)
//! - Database connection state and schema initialization
//! - Analysis record model and store
//! - Utility functions

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
