//! compiler-rt builtins.
//!
//! Only the NDK flavor is built; the platform reuses it, and both share the
//! single resource directory of the output toolchain. arm and x86 get an
//! extra copy with exported symbols for Bionic's libc.so and libm.so.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::builder::base::{sibling, Builder, BuilderCommon};
use crate::builder::cmake::{self, CMakeBuilder};
use crate::builder::context::ActiveConfig;
use crate::builder::defines::Defines;
use crate::builder::llvm::LlvmBuilder;
use crate::builder::runtime::{self, RuntimeBuilder};
use crate::builder::toolchain::ToolchainRef;
use crate::core::config::{device_configs, extra_flag, Arch, Configuration};
use crate::util::config::Paths;
use crate::util::fs::copy_file;

const IS_EXPORTED: &str = "is_exported";

pub struct BuiltinsBuilder {
    common: BuilderCommon,
}

impl BuiltinsBuilder {
    pub fn new(
        paths: &Paths,
        toolchain: Arc<ToolchainRef>,
        output_toolchain: Arc<ToolchainRef>,
    ) -> Self {
        let mut configs = device_configs(paths, false, Some(&extra_flag(IS_EXPORTED, false)));
        let exported = extra_flag(IS_EXPORTED, true);
        for arch in [Arch::Arm, Arch::X86] {
            configs.push(Configuration::android(paths, arch, false).with_extra(&exported));
        }

        BuiltinsBuilder {
            common: BuilderCommon::new("builtins", configs, toolchain)
                .with_output_toolchain(output_toolchain),
        }
    }

    fn is_exported(cx: &ActiveConfig<'_>) -> bool {
        cx.config.extra_bool(IS_EXPORTED).unwrap_or(false)
    }
}

impl Builder for BuiltinsBuilder {
    fn common(&self) -> &BuilderCommon {
        &self.common
    }

    fn build_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
        cmake::build_config(self, cx)
    }

    fn as_cmake(&self) -> Option<&dyn CMakeBuilder> {
        Some(self)
    }
}

impl CMakeBuilder for BuiltinsBuilder {
    fn src_dir(&self, cx: &ActiveConfig<'_>) -> PathBuf {
        cx.paths().llvm_path("compiler-rt/lib/builtins")
    }

    fn output_dir(&self, cx: &ActiveConfig<'_>) -> PathBuf {
        let dir = cmake::output_dir(self, cx);
        if Self::is_exported(cx) {
            sibling(&dir, "-exported")
        } else {
            dir
        }
    }

    fn install_dir(&self, cx: &ActiveConfig<'_>) -> Result<PathBuf> {
        runtime::install_dir(self, cx)
    }

    fn cmake_defines(&self, cx: &ActiveConfig<'_>) -> Result<Defines> {
        let mut defines = runtime::defines(self, cx)?;
        let hide = if Self::is_exported(cx) { "FALSE" } else { "TRUE" };
        defines.set("COMPILER_RT_BUILTINS_HIDE_SYMBOLS", hide);
        defines.set("COMPILER_RT_DEFAULT_TARGET_TRIPLE", cx.config.llvm_triple());
        // nothing can be linked before the builtins exist
        defines.set("CMAKE_TRY_COMPILE_TARGET_TYPE", "STATIC_LIBRARY");
        Ok(defines)
    }

    /// Copy the archive into the resource directories and the NDK runtimes.
    fn install_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
        let llvm_arch = cx.arch().llvm_arch();
        let filename = format!("libclang_rt.builtins-{}-android.a", llvm_arch);
        let src = self.output_dir(cx).join("lib/android").join(&filename);
        let out_resource_dir = self.output_toolchain().resource_dir()?;

        if Self::is_exported(cx) {
            // only for Bionic's libc.so
            let exported = format!("libclang_rt.builtins-{}-android-exported.a", llvm_arch);
            return copy_file(&src, &out_resource_dir.join(exported));
        }

        copy_file(&src, &out_resource_dir.join(&filename))?;
        let resource_dir = self.toolchain().resource_dir()?;
        if resource_dir != out_resource_dir {
            copy_file(&src, &resource_dir.join(&filename))?;
        }
        copy_file(&src, &runtime::ndk_runtimes_dir(self).join(&filename))
    }
}

impl LlvmBuilder for BuiltinsBuilder {}

impl RuntimeBuilder for BuiltinsBuilder {}
