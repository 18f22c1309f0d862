//! Builders.
//!
//! A builder is built in layers. [`base`] owns the lifecycle and the base
//! flags, [`autoconf`] and [`cmake`] add a build-system strategy, [`llvm`]
//! adds what every LLVM-tree build shares and [`runtime`] what runtime
//! libraries share. Concrete builders live in [`libs`], [`stages`] and
//! [`runtimes`].

pub mod autoconf;
pub mod base;
pub mod cmake;
pub mod context;
pub mod defines;
pub mod libs;
pub mod llvm;
pub mod registry;
pub mod runtime;
pub mod runtimes;
pub mod stages;
pub mod toolchain;

pub use base::{build, BuildOutcome, Builder, BuilderCommon};
pub use context::{ActiveConfig, BuildContext};
pub use defines::Defines;
pub use registry::BuilderRegistry;
pub use stages::{Stage1Builder, Stage2Builder, Stage2Options};
pub use toolchain::ToolchainRef;
