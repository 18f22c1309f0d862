//! libc++abi for the platform sysroots.
//!
//! 64-bit targets get a static libc++abi that compiler-rt's sanitizers link
//! against. 32-bit targets only need a linker script forwarding to libc++.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::builder::base::{self, Builder, BuilderCommon};
use crate::builder::cmake::{self, CMakeBuilder};
use crate::builder::context::ActiveConfig;
use crate::builder::defines::Defines;
use crate::builder::llvm::LlvmBuilder;
use crate::builder::runtime::{self, RuntimeBuilder};
use crate::builder::toolchain::ToolchainRef;
use crate::core::config::{device_configs, Arch};
use crate::util::config::Paths;
use crate::util::fs::{copy_file, write_string};

pub struct PlatformLibcxxAbiBuilder {
    common: BuilderCommon,
}

impl PlatformLibcxxAbiBuilder {
    pub fn new(
        paths: &Paths,
        toolchain: Arc<ToolchainRef>,
        output_toolchain: Arc<ToolchainRef>,
    ) -> Self {
        PlatformLibcxxAbiBuilder {
            common: BuilderCommon::new(
                "platform-libcxxabi",
                device_configs(paths, true, None),
                toolchain,
            )
            .with_output_toolchain(output_toolchain),
        }
    }

    /// `usr/lib64` for x86_64, `usr/lib` everywhere else.
    fn sysroot_lib_dir(&self, cx: &ActiveConfig<'_>) -> Result<PathBuf> {
        let lib = if cx.arch() == Arch::X86_64 { "lib64" } else { "lib" };
        Ok(base::sysroot(self, cx)?.join("usr").join(lib))
    }
}

impl Builder for PlatformLibcxxAbiBuilder {
    fn common(&self) -> &BuilderCommon {
        &self.common
    }

    fn build_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
        if cx.arch().is_64bit() {
            cmake::build_config(self, cx)
        } else {
            self.install_config(cx)
        }
    }

    fn as_cmake(&self) -> Option<&dyn CMakeBuilder> {
        Some(self)
    }
}

impl CMakeBuilder for PlatformLibcxxAbiBuilder {
    fn src_dir(&self, cx: &ActiveConfig<'_>) -> PathBuf {
        cx.paths().llvm_path("libcxxabi")
    }

    fn install_dir(&self, cx: &ActiveConfig<'_>) -> Result<PathBuf> {
        runtime::install_dir(self, cx)
    }

    fn cmake_defines(&self, cx: &ActiveConfig<'_>) -> Result<Defines> {
        let mut defines = runtime::defines(self, cx)?;
        defines.set(
            "LIBCXXABI_LIBCXX_INCLUDES",
            cx.paths().llvm_path("libcxx/include").display().to_string(),
        );
        defines.set("LIBCXXABI_ENABLE_SHARED", "OFF");
        Ok(defines)
    }

    fn install_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
        let lib_dir = self.sysroot_lib_dir(cx)?;
        if cx.arch().is_64bit() {
            let src = self.output_dir(cx).join("lib64/libc++abi.a");
            copy_file(&src, &lib_dir.join("libc++abi.a"))
        } else {
            write_string(&lib_dir.join("libc++abi.so"), "INPUT(-lc++)")
        }
    }
}

impl LlvmBuilder for PlatformLibcxxAbiBuilder {}

impl RuntimeBuilder for PlatformLibcxxAbiBuilder {}
