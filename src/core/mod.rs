//! Core data structures for the stager.
//!
//! This module contains the foundational types used throughout the build:
//! - Target configurations (OS, architecture, base flags)
//! - Clang version and vendor metadata
//! - The fatal error taxonomy

pub mod config;
pub mod errors;
pub mod version;

pub use config::{device_configs, host_config, Arch, Configuration, ExtraConfig, TargetOs};
pub use errors::BuildError;
pub use version::{ClangVersion, VendorInfo};
