//! Calendar billing CLI library.
//!
//! Loads per-user configuration, runs the billing pipeline, then renders and
//! dispatches one invoice per customer.

mod cli;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod render;

pub use cli::{Cli, Commands};
pub use config::{ConfigError, UserConfig};
