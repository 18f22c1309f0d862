//! libunwind, in two flavors: a hermetic copy for the NDK and a copy with
//! exported symbols for Bionic's libc.so.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::builder::base::{self, sibling, Builder, BuilderCommon};
use crate::builder::cmake::{self, CMakeBuilder};
use crate::builder::context::ActiveConfig;
use crate::builder::defines::Defines;
use crate::builder::llvm::LlvmBuilder;
use crate::builder::runtime::{self, RuntimeBuilder};
use crate::builder::toolchain::ToolchainRef;
use crate::core::config::device_configs;
use crate::util::config::Paths;
use crate::util::fs::copy_file;

pub struct LibUnwindBuilder {
    common: BuilderCommon,
}

impl LibUnwindBuilder {
    pub fn new(
        paths: &Paths,
        toolchain: Arc<ToolchainRef>,
        output_toolchain: Arc<ToolchainRef>,
    ) -> Self {
        let mut configs = device_configs(paths, true, None);
        configs.extend(device_configs(paths, false, None));
        LibUnwindBuilder {
            common: BuilderCommon::new("libunwind", configs, toolchain)
                .with_output_toolchain(output_toolchain),
        }
    }
}

/// The platform copy exports its symbols.
fn is_exported(cx: &ActiveConfig<'_>) -> bool {
    cx.config.is_platform()
}

impl Builder for LibUnwindBuilder {
    fn common(&self) -> &BuilderCommon {
        &self.common
    }

    fn cflags(&self, cx: &ActiveConfig<'_>) -> Result<Vec<String>> {
        let mut cflags = base::cflags(self, cx)?;
        cflags.push("-D_LIBUNWIND_USE_DLADDR=0".to_string());
        Ok(cflags)
    }

    fn ldflags(&self, cx: &ActiveConfig<'_>) -> Result<Vec<String>> {
        let mut ldflags = base::ldflags(self, cx)?;
        // libunwind.a does not exist yet
        ldflags.push("-unwindlib=none".to_string());
        Ok(ldflags)
    }

    fn build_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
        cmake::build_config(self, cx)
    }

    fn as_cmake(&self) -> Option<&dyn CMakeBuilder> {
        Some(self)
    }
}

impl CMakeBuilder for LibUnwindBuilder {
    fn src_dir(&self, cx: &ActiveConfig<'_>) -> PathBuf {
        cx.paths().llvm_path("libunwind")
    }

    fn output_dir(&self, cx: &ActiveConfig<'_>) -> PathBuf {
        let suffix = if is_exported(cx) { "-exported" } else { "-hermetic" };
        sibling(&cmake::output_dir(self, cx), suffix)
    }

    fn install_dir(&self, cx: &ActiveConfig<'_>) -> Result<PathBuf> {
        runtime::install_dir(self, cx)
    }

    fn cmake_defines(&self, cx: &ActiveConfig<'_>) -> Result<Defines> {
        let mut defines = runtime::defines(self, cx)?;
        let hermetic = if is_exported(cx) { "FALSE" } else { "TRUE" };
        defines.set("LIBUNWIND_HERMETIC_STATIC_LIBRARY", hermetic);
        defines.set("LIBUNWIND_ENABLE_SHARED", "FALSE");
        Ok(defines)
    }

    fn install_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
        let src = self.output_dir(cx).join("lib64/libunwind.a");
        let arch = cx.arch().as_str();
        let out_resource_dir = self.output_toolchain().resource_dir()?;

        if is_exported(cx) {
            return copy_file(&src, &out_resource_dir.join(arch).join("libunwind-exported.a"));
        }

        copy_file(&src, &out_resource_dir.join(arch).join("libunwind.a"))?;
        let resource_dir = self.toolchain().resource_dir()?;
        if resource_dir != out_resource_dir {
            copy_file(&src, &resource_dir.join(arch).join("libunwind.a"))?;
        }
        copy_file(
            &src,
            &runtime::ndk_runtimes_dir(self).join(arch).join("libunwind.a"),
        )
    }
}

impl LlvmBuilder for LibUnwindBuilder {}

impl RuntimeBuilder for LibUnwindBuilder {}
