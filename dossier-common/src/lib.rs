//! # Dossier Common Library
//!
//! Shared code for the dossier workspace including:
//! - Error types
//! - Configuration file resolution and TOML loading
//! - Logging initialization
//! - Research event types and the broadcast EventBus

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
