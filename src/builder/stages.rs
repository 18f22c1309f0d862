//! The two bootstrap stages.
//!
//! Stage1 is built from the prebuilt compiler for the build host only.
//! Stage2 is built with stage1 and is the compiler that gets shipped.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::builder::base::{self, Builder, BuilderCommon};
use crate::builder::cmake::CMakeBuilder;
use crate::builder::context::ActiveConfig;
use crate::builder::defines::Defines;
use crate::builder::llvm::{self, LldbDeps, LlvmBuilder, LlvmProject, ANDROID_TARGETS, BASE_TARGETS};
use crate::builder::toolchain::ToolchainRef;
use crate::core::config::host_config;
use crate::util::config::Paths;

const RUNTIMES: &[&str] = &["compiler-rt", "libcxx", "libcxxabi"];

/// Tools stage2 never ships.
const UNUSED_TOOLS: &[&str] = &[
    "LIPO",
    "JITLINK",
    "AS_FUZZER",
    "BCANALYZER",
    "CAT",
    "CVTRES",
    "CXXDUMP",
    "CXXFILT",
    "CXXMAP",
    "C_TEST",
    "DIFF",
    "DWP",
    "ELFABI",
    "EXEGESIS",
    "EXTRACT",
    "GO",
    "GSYMUTIL",
    "IFS",
    "ISEL_FUZZER",
    "ITANIUM_DEMANGLE_FUZZER",
    "LTO2",
    "LTO",
    "MCA",
    "MC",
    "ML",
    "MT",
    "OPT_FUZZER",
    "OPT_REPORT",
    "PDBUTIL",
    "REDUCE",
    "RTDYLD",
    "SPLIT",
    "STRESS",
    "UNDNAME",
    "XRAY",
];

const OPENMP_CXXFLAGS: &[&str] = &[
    "-Wno-c99-extensions",
    "-Wno-deprecated-copy",
    "-Wno-gnu-anonymous-struct",
    "-Wno-missing-field-initializers",
    "-Wno-non-c-typedef-for-linkage",
    "-Wno-vla-extension",
];

/// Make `libc++.so` a plain symlink with libc++abi linked in statically, so
/// users never need an explicit `-lc++abi`.
fn set_static_abi_library(defines: &mut Defines) {
    defines.set("LIBCXX_ENABLE_ABI_LINKER_SCRIPT", "OFF");
    defines.set("LIBCXX_ENABLE_STATIC_ABI_LIBRARY", "ON");
}

fn set_policy_defaults(defines: &mut Defines) {
    defines.set("CMAKE_POLICY_DEFAULT_CMP0114", "OLD");
    defines.set("CMAKE_POLICY_DEFAULT_CMP0116", "OLD");
}

/// The bootstrap compiler.
pub struct Stage1Builder {
    common: BuilderCommon,
    /// Also build llvm-config and friends (needed by instrumented/debug stage2).
    pub build_llvm_tools: bool,
    /// Generate code for every Android target, not just the host.
    pub build_all_targets: bool,
}

impl Stage1Builder {
    pub fn new(paths: &Paths, toolchain: Arc<ToolchainRef>) -> Self {
        Stage1Builder {
            common: BuilderCommon::new("stage1", vec![host_config(paths)], toolchain),
            build_llvm_tools: false,
            build_all_targets: false,
        }
    }

    /// The compiler this stage leaves in `out/stage1-install`.
    pub fn installed_toolchain(&self, paths: &Paths) -> ToolchainRef {
        llvm::installed_toolchain(self, paths)
    }
}

impl Builder for Stage1Builder {
    fn common(&self) -> &BuilderCommon {
        &self.common
    }

    fn ldflags(&self, cx: &ActiveConfig<'_>) -> Result<Vec<String>> {
        let mut ldflags = base::ldflags(self, cx)?;
        // Keep loading the prebuilt libc++.so, not the one being built.
        ldflags.push(format!("-Wl,-rpath,{}", self.toolchain().lib_dir().display()));
        Ok(ldflags)
    }

    fn build_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
        llvm::build_config(self, cx)
    }

    fn as_cmake(&self) -> Option<&dyn CMakeBuilder> {
        Some(self)
    }
}

impl CMakeBuilder for Stage1Builder {
    fn src_dir(&self, cx: &ActiveConfig<'_>) -> PathBuf {
        cx.paths().llvm_path("llvm")
    }

    fn output_dir(&self, cx: &ActiveConfig<'_>) -> PathBuf {
        llvm::project_output_dir(self, cx.paths())
    }

    fn install_dir(&self, cx: &ActiveConfig<'_>) -> Result<PathBuf> {
        Ok(llvm::project_install_dir(self, cx.paths()))
    }

    fn cmake_defines(&self, cx: &ActiveConfig<'_>) -> Result<Defines> {
        let mut defines = llvm::project_defines(self, cx)?;
        defines.set("CLANG_ENABLE_ARCMT", "OFF");
        defines.set("CLANG_ENABLE_STATIC_ANALYZER", "OFF");
        defines.set("LLVM_BUILD_TOOLS", if self.build_llvm_tools { "ON" } else { "OFF" });
        set_static_abi_library(&mut defines);
        // libFuzzer comes from stage2
        defines.set("COMPILER_RT_BUILD_LIBFUZZER", "OFF");
        set_policy_defaults(&mut defines);
        Ok(defines)
    }

    fn install_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
        llvm::install_config(self, cx)
    }
}

impl LlvmBuilder for Stage1Builder {}

impl LlvmProject for Stage1Builder {
    fn llvm_projects(&self) -> BTreeSet<&'static str> {
        ["clang", "lld"].into_iter().collect()
    }

    fn llvm_runtimes(&self) -> BTreeSet<&'static str> {
        RUNTIMES.iter().copied().collect()
    }

    fn llvm_targets(&self) -> BTreeSet<&'static str> {
        if self.build_all_targets {
            ANDROID_TARGETS.iter().copied().collect()
        } else {
            BASE_TARGETS.iter().copied().collect()
        }
    }
}

/// Knobs for the release compiler.
#[derive(Debug, Clone)]
pub struct Stage2Options {
    pub debug_build: bool,
    pub enable_assertions: bool,
    pub lto: bool,
    pub build_instrumented: bool,
    /// PGO profile to optimize with.
    pub profdata_file: Option<PathBuf>,
    /// Present when LLDB is built.
    pub lldb: Option<LldbDeps>,
}

impl Default for Stage2Options {
    fn default() -> Self {
        Stage2Options {
            debug_build: false,
            enable_assertions: false,
            lto: true,
            build_instrumented: false,
            profdata_file: None,
            lldb: None,
        }
    }
}

/// The release compiler, built with stage1.
pub struct Stage2Builder {
    common: BuilderCommon,
    options: Stage2Options,
}

impl Stage2Builder {
    pub fn new(paths: &Paths, toolchain: Arc<ToolchainRef>, options: Stage2Options) -> Self {
        Stage2Builder {
            common: BuilderCommon::new("stage2", vec![host_config(paths)], toolchain),
            options,
        }
    }

    pub fn options(&self) -> &Stage2Options {
        &self.options
    }

    /// The compiler this stage leaves in `out/stage2-install`.
    pub fn installed_toolchain(&self, paths: &Paths) -> ToolchainRef {
        llvm::installed_toolchain(self, paths)
    }
}

impl Builder for Stage2Builder {
    fn common(&self) -> &BuilderCommon {
        &self.common
    }

    fn cflags(&self, cx: &ActiveConfig<'_>) -> Result<Vec<String>> {
        let mut cflags = base::cflags(self, cx)?;
        if self.options.profdata_file.is_some() {
            cflags.push("-Wno-profile-instr-out-of-date".to_string());
            cflags.push("-Wno-profile-instr-unprofiled".to_string());
        }
        Ok(cflags)
    }

    fn ldflags(&self, cx: &ActiveConfig<'_>) -> Result<Vec<String>> {
        let mut ldflags = base::ldflags(self, cx)?;
        if self.options.build_instrumented {
            // libcxx/libcxxabi link with -nodefaultlibs, which drops the
            // profile runtime's libc dependencies otherwise.
            let profile = self.toolchain().resource_dir()?.join("libclang_rt.profile-x86_64.a");
            ldflags.push(profile.display().to_string());
        }
        Ok(ldflags)
    }

    fn env(&self, cx: &ActiveConfig<'_>) -> Result<BTreeMap<String, String>> {
        let mut env = base::env(self, cx)?;
        // stage1's libc++ for the freshly built tools run during the build
        env.insert(
            "LD_LIBRARY_PATH".to_string(),
            self.toolchain().lib_dir().display().to_string(),
        );
        Ok(env)
    }

    fn build_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
        llvm::build_config(self, cx)
    }

    fn as_cmake(&self) -> Option<&dyn CMakeBuilder> {
        Some(self)
    }
}

impl CMakeBuilder for Stage2Builder {
    fn src_dir(&self, cx: &ActiveConfig<'_>) -> PathBuf {
        cx.paths().llvm_path("llvm")
    }

    fn output_dir(&self, cx: &ActiveConfig<'_>) -> PathBuf {
        llvm::project_output_dir(self, cx.paths())
    }

    fn install_dir(&self, cx: &ActiveConfig<'_>) -> Result<PathBuf> {
        Ok(llvm::project_install_dir(self, cx.paths()))
    }

    fn remove_install_dir(&self) -> bool {
        true
    }

    fn cmake_defines(&self, cx: &ActiveConfig<'_>) -> Result<Defines> {
        let opts = &self.options;
        let mut defines = llvm::project_defines(self, cx)?;

        defines.set("SANITIZER_ALLOW_CXXABI", "OFF");
        defines.set("OPENMP_ENABLE_OMPT_TOOLS", "FALSE");
        defines.set("LIBOMP_ENABLE_SHARED", "FALSE");
        defines.set("LLVM_POLLY_LINK_INTO_TOOLS", "ON");
        defines.set("CLANG_DEFAULT_LINKER", "lld");
        defines.set("CLANG_PYTHON_BINDINGS_VERSIONS", "3");
        set_policy_defaults(&mut defines);

        if opts.lto && !opts.build_instrumented && !opts.debug_build {
            defines.set("LLVM_ENABLE_LTO", "Thin");
        }

        // exported for host fuzzer builds
        defines.set("COMPILER_RT_BUILD_LIBFUZZER", "ON");

        if opts.debug_build {
            defines.set("CMAKE_BUILD_TYPE", "Debug");
        }

        if opts.build_instrumented {
            defines.set("LLVM_BUILD_INSTRUMENTED", "ON");
            // only needed to finish configuring perf-training
            defines.set(
                "LLVM_PROFDATA",
                self.toolchain().llvm_profdata().display().to_string(),
            );
        } else if let Some(profdata) = &opts.profdata_file {
            defines.set("LLVM_PROFDATA_FILE", profdata.display().to_string());
        }

        defines.set("LIBOMP_CXXFLAGS", OPENMP_CXXFLAGS.join(" "));
        set_static_abi_library(&mut defines);

        defines.set("LLVM_INCLUDE_TESTS", "OFF");
        for tool in UNUSED_TOOLS {
            defines.set(format!("LLVM_TOOL_LLVM_{}_BUILD", tool), "OFF");
        }

        Ok(defines)
    }

    fn install_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
        llvm::install_config(self, cx)
    }
}

impl LlvmBuilder for Stage2Builder {
    fn enable_assertions(&self) -> bool {
        self.options.enable_assertions
    }
}

impl LlvmProject for Stage2Builder {
    fn llvm_projects(&self) -> BTreeSet<&'static str> {
        let mut projects: BTreeSet<&'static str> =
            ["clang", "lld", "clang-tools-extra", "openmp", "polly"]
                .into_iter()
                .collect();
        if self.options.lldb.is_some() {
            projects.insert("lldb");
        }
        projects
    }

    fn llvm_runtimes(&self) -> BTreeSet<&'static str> {
        RUNTIMES.iter().copied().collect()
    }

    fn llvm_targets(&self) -> BTreeSet<&'static str> {
        ANDROID_TARGETS.iter().copied().collect()
    }

    fn lldb(&self) -> Option<&LldbDeps> {
        self.options.lldb.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use crate::test_support::fixtures::fake_toolchain;
    use crate::test_support::{test_context, MockExecutor};

    fn stage1_toolchain(root: &Path) -> Arc<ToolchainRef> {
        let path = fake_toolchain(&root.join("out/stage1-install"), "12.0.5");
        Arc::new(ToolchainRef::from_install_path(path, None))
    }

    #[test]
    fn test_stage1_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ctx = test_context(tmp.path(), MockExecutor::new());
        let stage1 = Stage1Builder::new(ctx.paths(), Arc::new(ToolchainRef::prebuilt(ctx.paths())));
        let cx = ActiveConfig::new(&ctx, &stage1.configs()[0], 0);

        let d = stage1.cmake_defines(&cx).unwrap();
        assert_eq!(d.get("LLVM_TARGETS_TO_BUILD"), Some("X86"));
        assert_eq!(d.get("LLVM_ENABLE_PROJECTS"), Some("clang;lld"));
        assert_eq!(d.get("LLVM_BUILD_TOOLS"), Some("OFF"));
        assert_eq!(d.get("COMPILER_RT_BUILD_LIBFUZZER"), Some("OFF"));

        let rpath = format!("-Wl,-rpath,{}", ToolchainRef::prebuilt(ctx.paths()).lib_dir().display());
        assert!(d.get("CMAKE_EXE_LINKER_FLAGS").unwrap().contains(&rpath));

        let install = tmp.path().join("out/stage1-install");
        assert_eq!(stage1.installed_toolchain(ctx.paths()).install_path(), install);
    }

    #[test]
    fn test_stage1_debug_targets_everything() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ctx = test_context(tmp.path(), MockExecutor::new());
        let mut stage1 =
            Stage1Builder::new(ctx.paths(), Arc::new(ToolchainRef::prebuilt(ctx.paths())));
        stage1.build_all_targets = true;
        stage1.build_llvm_tools = true;
        let cx = ActiveConfig::new(&ctx, &stage1.configs()[0], 0);

        let d = stage1.cmake_defines(&cx).unwrap();
        assert_eq!(d.get("LLVM_TARGETS_TO_BUILD"), Some("AArch64;ARM;BPF;X86"));
        assert_eq!(d.get("LLVM_BUILD_TOOLS"), Some("ON"));
    }

    #[test]
    fn test_stage2_release_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ctx = test_context(tmp.path(), MockExecutor::new());
        let tc = stage1_toolchain(tmp.path());
        let stage2 = Stage2Builder::new(ctx.paths(), Arc::clone(&tc), Stage2Options::default());
        let cx = ActiveConfig::new(&ctx, &stage2.configs()[0], 0);

        let d = stage2.cmake_defines(&cx).unwrap();
        assert_eq!(d.get("LLVM_ENABLE_LTO"), Some("Thin"));
        assert_eq!(d.get("CMAKE_BUILD_TYPE"), Some("Release"));
        assert_eq!(d.get("LLVM_TOOL_LLVM_XRAY_BUILD"), Some("OFF"));
        assert_eq!(
            d.get("LLVM_ENABLE_PROJECTS"),
            Some("clang;clang-tools-extra;lld;openmp;polly")
        );
        assert!(!d.contains("LLVM_PROFDATA_FILE"));

        let env = stage2.env(&cx).unwrap();
        assert_eq!(
            env.get("LD_LIBRARY_PATH").map(String::as_str),
            Some(tc.lib_dir().to_str().unwrap())
        );
    }

    #[test]
    fn test_stage2_instrumented_disables_lto() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ctx = test_context(tmp.path(), MockExecutor::new());
        let tc = stage1_toolchain(tmp.path());
        let options = Stage2Options {
            build_instrumented: true,
            profdata_file: Some(PathBuf::from("/p/r1.profdata")),
            enable_assertions: true,
            ..Stage2Options::default()
        };
        let stage2 = Stage2Builder::new(ctx.paths(), tc, options);
        let cx = ActiveConfig::new(&ctx, &stage2.configs()[0], 0);

        let d = stage2.cmake_defines(&cx).unwrap();
        assert!(!d.contains("LLVM_ENABLE_LTO"));
        assert_eq!(d.get("LLVM_BUILD_INSTRUMENTED"), Some("ON"));
        assert!(d.get("LLVM_PROFDATA").unwrap().ends_with("bin/llvm-profdata"));
        // instrumentation wins over the profile
        assert!(!d.contains("LLVM_PROFDATA_FILE"));
        assert_eq!(d.get("LLVM_ENABLE_ASSERTIONS"), Some("ON"));

        let ldflags = stage2.ldflags(&cx).unwrap();
        assert!(ldflags
            .last()
            .unwrap()
            .ends_with("lib64/clang/12.0.5/lib/linux/libclang_rt.profile-x86_64.a"));
        let cflags = stage2.cflags(&cx).unwrap();
        assert!(cflags.contains(&"-Wno-profile-instr-unprofiled".to_string()));
    }

    #[test]
    fn test_stage2_debug_build() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ctx = test_context(tmp.path(), MockExecutor::new());
        let options = Stage2Options {
            debug_build: true,
            ..Stage2Options::default()
        };
        let stage2 = Stage2Builder::new(ctx.paths(), stage1_toolchain(tmp.path()), options);
        let cx = ActiveConfig::new(&ctx, &stage2.configs()[0], 0);

        let d = stage2.cmake_defines(&cx).unwrap();
        assert_eq!(d.get("CMAKE_BUILD_TYPE"), Some("Debug"));
        assert!(!d.contains("LLVM_ENABLE_LTO"));
    }
}
