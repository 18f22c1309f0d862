//! Runtime libraries built with the finished compiler.
//!
//! Order matters: the sysroots must exist before anything links against
//! them, libc++abi lands in the platform sysroots before compiler-rt needs
//! it, and the map files read the sanitizers compiler-rt installed.

pub mod asan_mapfile;
pub mod builtins;
pub mod compiler_rt;
pub mod compiler_rt_host;
pub mod libcxxabi;
pub mod libomp;
pub mod libunwind;
pub mod sysroots;

use std::sync::Arc;

use anyhow::Result;

use crate::builder::base::{self, Builder, BuildOutcome};
use crate::builder::context::BuildContext;
use crate::builder::toolchain::ToolchainRef;
use crate::util::config::Paths;

pub use asan_mapfile::AsanMapFileBuilder;
pub use builtins::BuiltinsBuilder;
pub use compiler_rt::CompilerRtBuilder;
pub use compiler_rt_host::CompilerRtHostI386Builder;
pub use libcxxabi::PlatformLibcxxAbiBuilder;
pub use libomp::LibOmpBuilder;
pub use libunwind::LibUnwindBuilder;
pub use sysroots::SysrootsBuilder;

/// Every runtime builder, in build order.
///
/// `toolchain` compiles; `output_toolchain` receives the installed
/// libraries.
pub fn runtime_builders(
    paths: &Paths,
    toolchain: &Arc<ToolchainRef>,
    output_toolchain: &Arc<ToolchainRef>,
) -> Vec<Box<dyn Builder>> {
    let tc = || Arc::clone(toolchain);
    let out = || Arc::clone(output_toolchain);
    vec![
        Box::new(SysrootsBuilder::new(paths, tc())),
        Box::new(PlatformLibcxxAbiBuilder::new(paths, tc(), out())),
        Box::new(BuiltinsBuilder::new(paths, tc(), out())),
        Box::new(LibUnwindBuilder::new(paths, tc(), out())),
        Box::new(CompilerRtBuilder::new(paths, tc(), out())),
        Box::new(CompilerRtHostI386Builder::new(paths, tc(), out())),
        Box::new(LibOmpBuilder::new(paths, tc(), out())),
        Box::new(AsanMapFileBuilder::new(paths, tc(), out())),
    ]
}

/// Build every runtime in order, stopping at the first failure.
pub fn build_runtimes(
    ctx: &BuildContext,
    toolchain: &Arc<ToolchainRef>,
    output_toolchain: &Arc<ToolchainRef>,
) -> Result<Vec<(String, BuildOutcome)>> {
    let mut outcomes = Vec::new();
    for builder in runtime_builders(ctx.paths(), toolchain, output_toolchain) {
        let outcome = base::build(builder.as_ref(), ctx)?;
        outcomes.push((builder.name().to_string(), outcome));
    }
    Ok(outcomes)
}
