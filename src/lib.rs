//! Stager - a multi-stage Clang/LLVM toolchain build orchestrator
//!
//! This crate decides what to build, with which flags and in what order:
//! a bootstrap compiler, the release compiler built with it, the runtime
//! libraries built for every Android architecture, and the packaged
//! distributable. The real compilation is delegated to CMake, Ninja and
//! Autoconf.

pub mod builder;
pub mod core;
pub mod ops;
pub mod util;

/// Test utilities and mocks for stager unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides a scripted command runner and fake
/// toolchain and NDK trees.
#[cfg(test)]
pub mod test_support;

pub use crate::builder::{BuildContext, Builder, BuilderRegistry, ToolchainRef};
pub use crate::core::{BuildError, Configuration};
pub use crate::util::{Config, Paths};
