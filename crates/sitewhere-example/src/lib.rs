//! Demo device host for the SiteWhere client.
//!
//! Registers the device, answers custom commands, streams synthetic audio
//! and reports its location periodically, either against a delivery
//! service or an in-process platform.

pub mod app;
pub mod backend;
pub mod cli;
pub mod commands;
pub mod device;
pub mod error;
pub mod simulator;

pub use cli::Cli;
pub use error::{AppError, AppResult};
