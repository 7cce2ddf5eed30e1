//! # Upkeep Core
//!
//! Configuration and the error taxonomy shared by the scheduler engine,
//! the HTTP gateway and the CLI.

pub mod config;
pub mod error;

pub use config::UpkeepConfig;
pub use error::{Result, UpkeepError};
