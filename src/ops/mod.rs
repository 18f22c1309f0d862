//! High-level operations.
//!
//! This module contains the implementation of the `stager build` pipeline
//! and the packaging step that ends it.

pub mod package;
pub mod pipeline;

pub use package::{package_dir, package_toolchain};
pub use pipeline::{
    builder_names, make_builder, registry_from, run, PipelineOptions, PipelineReport,
};
