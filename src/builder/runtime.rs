//! Runtime library layer: LLVM-tree libraries built per device architecture
//! with the finished compiler.

use std::path::PathBuf;

use anyhow::Result;

use crate::builder::base::output_resource_dir;
use crate::builder::context::ActiveConfig;
use crate::builder::defines::Defines;
use crate::builder::llvm::{self, LlvmBuilder};
use crate::core::config::TargetOs;

/// Marker for builders whose output belongs to the output toolchain's
/// runtime trees.
pub trait RuntimeBuilder: LlvmBuilder {}

/// NDK builds install into `runtimes_ndk_cxx/<arch>` of the output
/// toolchain; everything else into its resource directory.
pub fn install_dir<B: RuntimeBuilder + ?Sized>(b: &B, cx: &ActiveConfig<'_>) -> Result<PathBuf> {
    let arch = cx.arch().as_str();
    let config = cx.config;
    if config.target_os() == TargetOs::Android && !config.is_platform() {
        return Ok(ndk_runtimes_dir(b).join(arch));
    }
    Ok(output_resource_dir(b, cx)?.join(arch))
}

/// `<output toolchain>/runtimes_ndk_cxx`
pub fn ndk_runtimes_dir<B: RuntimeBuilder + ?Sized>(b: &B) -> PathBuf {
    b.output_toolchain().install_path().join("runtimes_ndk_cxx")
}

pub fn defines<B: RuntimeBuilder + ?Sized>(b: &B, cx: &ActiveConfig<'_>) -> Result<Defines> {
    let mut defines = llvm::base_defines(b, cx)?;
    defines.set(
        "LLVM_CONFIG_PATH",
        b.toolchain().llvm_config().display().to_string(),
    );
    if cx.config.target_os() == TargetOs::Android {
        // checked when enabling TSAN; normally set by the NDK toolchain file
        defines.set("ANDROID_PLATFORM_LEVEL", cx.config.api_level().to_string());
    }
    Ok(defines)
}
