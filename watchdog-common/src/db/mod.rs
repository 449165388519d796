//! Database models and queries

pub mod init;
pub mod models;
pub mod streams;

pub use init::*;
pub use models::*;
pub use streams::*;
