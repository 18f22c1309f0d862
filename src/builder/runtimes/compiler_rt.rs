//! Sanitizers, libFuzzer and the rest of compiler-rt for Android.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::builder::base::{self, sibling, Builder, BuilderCommon};
use crate::builder::cmake::{self, CMakeBuilder};
use crate::builder::context::{ActiveConfig, BuildContext};
use crate::builder::defines::Defines;
use crate::builder::llvm::LlvmBuilder;
use crate::builder::runtime::{self, RuntimeBuilder};
use crate::builder::toolchain::ToolchainRef;
use crate::core::config::{device_configs, Arch};
use crate::util::config::Paths;
use crate::util::fs::{copy_dir_all, copy_file, ensure_dir, force_symlink, glob_files};

pub struct CompilerRtBuilder {
    common: BuilderCommon,
}

impl CompilerRtBuilder {
    pub fn new(
        paths: &Paths,
        toolchain: Arc<ToolchainRef>,
        output_toolchain: Arc<ToolchainRef>,
    ) -> Self {
        let mut configs = device_configs(paths, true, None);
        configs.extend(device_configs(paths, false, None));
        CompilerRtBuilder {
            common: BuilderCommon::new("compiler-rt", configs, toolchain)
                .with_output_toolchain(output_toolchain),
        }
    }
}

impl Builder for CompilerRtBuilder {
    fn common(&self) -> &BuilderCommon {
        &self.common
    }

    fn cflags(&self, cx: &ActiveConfig<'_>) -> Result<Vec<String>> {
        let mut cflags = base::cflags(self, cx)?;
        cflags.push("-funwind-tables".to_string());
        Ok(cflags)
    }

    fn build_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
        cmake::build_config(self, cx)
    }

    /// Fuzzer headers and the hwasan static alias, once for all configs.
    fn install(&self, ctx: &BuildContext) -> Result<()> {
        let header_src = ctx.paths().llvm_path("compiler-rt/lib/fuzzer");
        let header_dst = self
            .output_toolchain()
            .install_path()
            .join("prebuilt_include/llvm/lib/Fuzzer");
        ensure_dir(&header_dst)?;
        let headers = glob_files(&header_src, &["*.h".to_string(), "*.def".to_string()])?;
        for header in headers {
            if let Some(name) = header.file_name() {
                copy_file(&header, &header_dst.join(name))?;
            }
        }

        let resource_dir = self.output_toolchain().resource_dir()?;
        force_symlink(
            Path::new("libclang_rt.hwasan-aarch64-android.a"),
            &resource_dir.join("libclang_rt.hwasan_static-aarch64-android.a"),
        )
    }

    fn as_cmake(&self) -> Option<&dyn CMakeBuilder> {
        Some(self)
    }
}

impl CMakeBuilder for CompilerRtBuilder {
    fn src_dir(&self, cx: &ActiveConfig<'_>) -> PathBuf {
        cx.paths().llvm_path("compiler-rt")
    }

    /// Platform builds install straight into the output toolchain; NDK builds
    /// go to a scratch prefix and are copied to `runtimes_ndk_cxx`.
    fn install_dir(&self, cx: &ActiveConfig<'_>) -> Result<PathBuf> {
        if cx.config.is_platform() {
            return self.output_toolchain().clang_lib_dir();
        }
        Ok(sibling(&self.output_dir(cx), "-install"))
    }

    fn cmake_defines(&self, cx: &ActiveConfig<'_>) -> Result<Defines> {
        let mut defines = runtime::defines(self, cx)?;
        let config = cx.config;

        defines.set("COMPILER_RT_BUILD_BUILTINS", "OFF");
        defines.set("COMPILER_RT_USE_BUILTINS_LIBRARY", "ON");
        let test_cflags = defines.get("CMAKE_C_FLAGS").unwrap_or_default().to_string();
        defines.set("COMPILER_RT_TEST_COMPILER_CFLAGS", test_cflags);
        defines.set("COMPILER_RT_DEFAULT_TARGET_TRIPLE", config.llvm_triple());
        defines.set("COMPILER_RT_INCLUDE_TESTS", "OFF");
        defines.set("SANITIZER_CXX_ABI", "libcxxabi");
        // With an Android system name the libraries land in lib/android.
        defines.remove("CMAKE_SYSTEM_NAME");

        let mut libs = Vec::new();
        if cx.arch() == Arch::Arm {
            libs.push("-latomic");
        }
        if config.api_level() < 21 {
            libs.push("-landroid_support");
        }
        // -rtlib=compiler-rt does not pull in libunwind.a on Android
        libs.push("-lunwind");
        defines.set("SANITIZER_COMMON_LINK_LIBS", libs.join(" "));

        if config.is_platform() {
            defines.set("COMPILER_RT_HWASAN_WITH_INTERCEPTORS", "OFF");
        }
        Ok(defines)
    }

    fn install_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
        cmake::install_config(self, cx)?;

        // libFuzzer is still looked up at <arch>/libFuzzer.a
        let arch = cx.arch();
        let lib_dir = self.install_dir(cx)?.join("lib").join("linux");
        let fuzzer = format!("libclang_rt.fuzzer-{}-android.a", arch.llvm_arch());
        copy_file(
            &lib_dir.join(fuzzer),
            &lib_dir.join(arch.as_str()).join("libFuzzer.a"),
        )?;

        if !cx.config.is_platform() {
            copy_dir_all(&lib_dir, &runtime::ndk_runtimes_dir(self))?;
        }
        Ok(())
    }
}

impl LlvmBuilder for CompilerRtBuilder {}

impl RuntimeBuilder for CompilerRtBuilder {}
