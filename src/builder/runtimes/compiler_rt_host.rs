//! 32-bit compiler-rt for the build host.

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
use crate::core::config::host_config_i386;
use crate::util::config::Paths;
use crate::util::fs::remove_dir_all_if_exists;

pub struct CompilerRtHostI386Builder {
    common: BuilderCommon,
}

impl CompilerRtHostI386Builder {
    pub fn new(
        paths: &Paths,
        toolchain: Arc<ToolchainRef>,
        output_toolchain: Arc<ToolchainRef>,
    ) -> Self {
        CompilerRtHostI386Builder {
            common: BuilderCommon::new(
                "compiler-rt-i386-host",
                vec![host_config_i386(paths)],
                toolchain,
            )
            .with_output_toolchain(output_toolchain),
        }
    }
}

impl Builder for CompilerRtHostI386Builder {
    fn common(&self) -> &BuilderCommon {
        &self.common
    }

    fn cflags(&self, cx: &ActiveConfig<'_>) -> Result<Vec<String>> {
        let mut cflags = base::cflags(self, cx)?;
        // gwp_asan uses PRIu64 and friends
        cflags.push("-D__STDC_FORMAT_MACROS".to_string());
        cflags.push("--target=i386-linux-gnu".to_string());
        cflags.push("-march=i686".to_string());
        Ok(cflags)
    }

    fn build_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
        // Forces the libcxx bundled with libFuzzer to reconfigure too.
        let stamps = self
            .output_dir(cx)
            .join("lib/fuzzer/libcxx_fuzzer_i386-stamps");
        remove_dir_all_if_exists(&stamps)?;
        cmake::build_config(self, cx)
    }

    fn as_cmake(&self) -> Option<&dyn CMakeBuilder> {
        Some(self)
    }
}

impl CMakeBuilder for CompilerRtHostI386Builder {
    fn src_dir(&self, cx: &ActiveConfig<'_>) -> PathBuf {
        cx.paths().llvm_path("compiler-rt")
    }

    fn install_dir(&self, _cx: &ActiveConfig<'_>) -> Result<PathBuf> {
        self.output_toolchain().clang_lib_dir()
    }

    fn cmake_defines(&self, cx: &ActiveConfig<'_>) -> Result<Defines> {
        let mut defines = runtime::defines(self, cx)?;
        // CMake cannot work out the i386 target from the flags alone
        defines.set("CMAKE_C_COMPILER_TARGET", "i386-linux-gnu");
        defines.set("COMPILER_RT_INCLUDE_TESTS", "ON");
        defines.set("COMPILER_RT_ENABLE_WERROR", "ON");
        defines.set("SANITIZER_CXX_ABI", "libstdc++");
        Ok(defines)
    }
}

impl LlvmBuilder for CompilerRtHostI386Builder {}

impl RuntimeBuilder for CompilerRtHostI386Builder {}
