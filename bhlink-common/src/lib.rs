//! # BHLink Common Library
//!
//! Shared code for the BHLink enrichment service:
//! - Error types
//! - TOML configuration loading and validation
//! - Edit-summary generation for write batches

pub mod config;
pub mod error;
pub mod summary;

pub use error::{Error, Result};
