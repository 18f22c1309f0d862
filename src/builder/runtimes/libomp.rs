//! OpenMP runtime, static for the platform and both static and shared for
//! the NDK.

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
use crate::core::config::{device_configs, extra_flag, Configuration};
use crate::util::config::Paths;
use crate::util::fs::copy_file;

const IS_SHARED: &str = "is_shared";

pub struct LibOmpBuilder {
    common: BuilderCommon,
}

impl LibOmpBuilder {
    pub fn new(
        paths: &Paths,
        toolchain: Arc<ToolchainRef>,
        output_toolchain: Arc<ToolchainRef>,
    ) -> Self {
        let static_lib = extra_flag(IS_SHARED, false);
        let mut configs = device_configs(paths, true, Some(&static_lib));
        configs.extend(device_configs(paths, false, Some(&static_lib)));
        configs.extend(device_configs(paths, false, Some(&extra_flag(IS_SHARED, true))));

        LibOmpBuilder {
            common: BuilderCommon::new("libomp", configs, toolchain)
                .with_output_toolchain(output_toolchain),
        }
    }

    /// Restrict the build to `configs`.
    pub fn with_configs(mut self, configs: Vec<Configuration>) -> Self {
        self.common.configs = configs;
        self
    }

    fn is_shared(cx: &ActiveConfig<'_>) -> bool {
        cx.config.extra_bool(IS_SHARED).unwrap_or(false)
    }

    fn lib_name(cx: &ActiveConfig<'_>) -> &'static str {
        if Self::is_shared(cx) {
            "libomp.so"
        } else {
            "libomp.a"
        }
    }
}

impl Builder for LibOmpBuilder {
    fn common(&self) -> &BuilderCommon {
        &self.common
    }

    fn cflags(&self, cx: &ActiveConfig<'_>) -> Result<Vec<String>> {
        let mut cflags = base::cflags(self, cx)?;
        cflags.push("-Wno-unused-command-line-argument".to_string());
        cflags.push("-Wno-non-c-typedef-for-linkage".to_string());
        Ok(cflags)
    }

    fn build_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
        cmake::build_config(self, cx)
    }

    fn as_cmake(&self) -> Option<&dyn CMakeBuilder> {
        Some(self)
    }
}

impl CMakeBuilder for LibOmpBuilder {
    fn src_dir(&self, cx: &ActiveConfig<'_>) -> PathBuf {
        cx.paths().llvm_path("openmp")
    }

    fn output_dir(&self, cx: &ActiveConfig<'_>) -> PathBuf {
        let suffix = if Self::is_shared(cx) { "-shared" } else { "-static" };
        sibling(&cmake::output_dir(self, cx), suffix)
    }

    fn install_dir(&self, cx: &ActiveConfig<'_>) -> Result<PathBuf> {
        runtime::install_dir(self, cx)
    }

    fn cmake_defines(&self, cx: &ActiveConfig<'_>) -> Result<Defines> {
        let mut defines = runtime::defines(self, cx)?;
        defines.set("OPENMP_ENABLE_LIBOMPTARGET", "FALSE");
        defines.set("OPENMP_ENABLE_OMPT_TOOLS", "FALSE");
        let shared = if Self::is_shared(cx) { "TRUE" } else { "FALSE" };
        defines.set("LIBOMP_ENABLE_SHARED", shared);
        // compiler-rt math builtins need libm
        defines.set("LIBOMP_LIBFLAGS", "-lm");
        defines.set("CMAKE_POLICY_DEFAULT_CMP0056", "NEW");
        Ok(defines)
    }

    /// libomp has no usable install target; copy the library by hand.
    fn install_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
        let name = Self::lib_name(cx);
        let src = self.output_dir(cx).join("runtime/src").join(name);
        copy_file(&src, &self.install_dir(cx)?.join(name))
    }
}

impl LlvmBuilder for LibOmpBuilder {}

impl RuntimeBuilder for LibOmpBuilder {}
