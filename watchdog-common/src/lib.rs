//! # Watchdog Common Library
//!
//! Shared code for the Watchdog monitoring services including:
//! - Stream catalog models and queries
//! - Event types (WatchdogEvent enum) and the EventBus
//! - Bootstrap configuration loading
//! - SSE helpers

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
