//! Shared utilities

pub mod config;
pub mod fs;
pub mod process;

pub use config::{Config, Paths};
pub use process::{CommandRunner, ProcessBuilder, SystemRunner};
