//! LLVM layers on top of the CMake strategy.
//!
//! [`LlvmBuilder`] covers everything built from the LLVM monorepo (vendor
//! stamping, assertions, job counts). [`LlvmProject`] is a full LLVM build:
//! project, runtime and target selection plus the LLDB dependency wiring.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::builder::cmake::{self, CMakeBuilder};
use crate::builder::context::ActiveConfig;
use crate::builder::defines::Defines;
use crate::builder::libs::ResolvedLib;
use crate::builder::toolchain::ToolchainRef;
use crate::core::config::TargetOs;
use crate::util::config::Paths;
use crate::util::fs::{copy_dir_all, copy_file, ensure_dir};

/// Target architectures for host-only builds.
pub const BASE_TARGETS: &[&str] = &["X86"];

/// Target architectures for builds that must generate Android code.
pub const ANDROID_TARGETS: &[&str] = &["AArch64", "ARM", "BPF", "X86"];

/// Anything built from the LLVM source tree.
pub trait LlvmBuilder: CMakeBuilder {
    fn enable_assertions(&self) -> bool {
        false
    }
}

/// Defines shared by every LLVM-tree build.
pub fn base_defines<B: LlvmBuilder + ?Sized>(b: &B, cx: &ActiveConfig<'_>) -> Result<Defines> {
    let mut defines = cmake::defines(b, cx)?;
    let ctx = cx.ctx;
    let paths = cx.paths();

    let assertions = if b.enable_assertions() { "ON" } else { "OFF" };
    defines.set("LLVM_ENABLE_ASSERTIONS", assertions);
    defines.set("LLVM_PARALLEL_COMPILE_JOBS", ctx.num_jobs().to_string());
    if let Some(link_jobs) = ctx.link_jobs {
        defines.set("LLVM_PARALLEL_LINK_JOBS", link_jobs.to_string());
    }

    // no libtinfo dependency
    defines.set("LLVM_ENABLE_TERMINFO", "OFF");
    defines.set("LLVM_ENABLE_THREADS", "ON");

    let vendor = &ctx.vendor;
    if let Some(patch) = &vendor.patch_level {
        defines.set("LLVM_VERSION_PATCH", patch);
    }
    defines.set("LLVM_VERSION_SUFFIX", "");
    defines.set("PACKAGE_VENDOR", &vendor.name);
    defines.set("PACKAGE_REPOSITORY", &vendor.repository);
    defines.set("PACKAGE_REVISION", &vendor.svn_revision);

    defines.set("COMPILER_RT_BUILD_XRAY", "OFF");
    // skips CMake's libstdc++ version check
    defines.set("LLVM_ENABLE_LIBCXX", "ON");
    defines.set("LLVM_ENABLE_LLD", "ON");
    defines.set("LLVM_INCLUDE_BENCHMARKS", "OFF");
    defines.set("LLVM_INCLUDE_EXAMPLES", "OFF");

    if cx.config.target_os() != TargetOs::Android {
        let lib = paths.python_lib().display().to_string();
        let include = paths.python_include_dir().display().to_string();
        defines.set("Python3_LIBRARY", &lib);
        defines.set("Python3_LIBRARIES", &lib);
        defines.set("Python3_INCLUDE_DIR", &include);
        defines.set("Python3_INCLUDE_DIRS", &include);
    }
    defines.set(
        "Python3_EXECUTABLE",
        paths.python_executable().display().to_string(),
    );

    Ok(defines)
}

/// Host libraries LLDB links against, already built and resolved.
#[derive(Debug, Clone, Default)]
pub struct LldbDeps {
    pub swig: Option<PathBuf>,
    pub libedit: Option<ResolvedLib>,
    pub libncurses: Option<ResolvedLib>,
}

impl LldbDeps {
    fn libs(&self) -> impl Iterator<Item = &ResolvedLib> {
        self.libedit.iter().chain(self.libncurses.iter())
    }

    /// Copy the shared libraries into `lib_dir`.
    pub fn install_into(&self, lib_dir: &Path) -> Result<()> {
        ensure_dir(lib_dir)?;
        for lib in self.libs() {
            for file in &lib.install_libraries {
                if let Some(name) = file.file_name() {
                    copy_file(file, &lib_dir.join(name))?;
                }
            }
        }
        Ok(())
    }
}

/// A complete LLVM build (stage1, stage2).
pub trait LlvmProject: LlvmBuilder {
    fn llvm_projects(&self) -> BTreeSet<&'static str>;

    fn llvm_runtimes(&self) -> BTreeSet<&'static str> {
        BTreeSet::new()
    }

    fn llvm_targets(&self) -> BTreeSet<&'static str>;

    /// Present when LLDB is being built.
    fn lldb(&self) -> Option<&LldbDeps> {
        None
    }
}

/// `out/<name>`
pub fn project_output_dir<B: LlvmProject + ?Sized>(b: &B, paths: &Paths) -> PathBuf {
    paths.out_dir.join(b.name())
}

/// `out/<name>-install`
pub fn project_install_dir<B: LlvmProject + ?Sized>(b: &B, paths: &Paths) -> PathBuf {
    paths.out_dir.join(format!("{}-install", b.name()))
}

/// The toolchain a finished project build leaves behind.
pub fn installed_toolchain<B: LlvmProject + ?Sized>(b: &B, paths: &Paths) -> ToolchainRef {
    ToolchainRef::from_install_path(
        project_install_dir(b, paths),
        Some(project_output_dir(b, paths)),
    )
}

fn joined(set: &BTreeSet<&str>) -> String {
    set.iter().copied().collect::<Vec<_>>().join(";")
}

fn set_lldb_defines(defines: &mut Defines, lldb: &LldbDeps) {
    defines.set("LLDB_ENABLE_LUA", "OFF");

    match &lldb.swig {
        Some(swig) => {
            defines.set("SWIG_EXECUTABLE", swig.display().to_string());
            defines.set("LLDB_ENABLE_PYTHON", "ON");
            defines.set("LLDB_EMBED_PYTHON_HOME", "OFF");
        }
        None => defines.set("LLDB_ENABLE_PYTHON", "OFF"),
    }

    defines.set("LLDB_ENABLE_LZMA", "OFF");
    defines.set("LLDB_ENABLE_LIBXML2", "OFF");

    match lldb.libedit.as_ref().and_then(|l| Some((l, l.link_libraries.first()?))) {
        Some((libedit, lib)) => {
            defines.set("LLDB_ENABLE_LIBEDIT", "ON");
            defines.set("LibEdit_INCLUDE_DIRS", libedit.include_dir.display().to_string());
            defines.set("LibEdit_LIBRARIES", lib.display().to_string());
        }
        None => defines.set("LLDB_ENABLE_LIBEDIT", "OFF"),
    }

    match &lldb.libncurses {
        Some(ncurses) => {
            defines.set("LLDB_ENABLE_CURSES", "ON");
            defines.set(
                "CURSES_INCLUDE_DIRS",
                format!(
                    "{};{}",
                    ncurses.include_dir.display(),
                    ncurses.include_dir.join("ncurses").display()
                ),
            );
            let libs = ncurses
                .link_libraries
                .iter()
                .map(|l| l.display().to_string())
                .collect::<Vec<_>>()
                .join(";");
            defines.set("CURSES_LIBRARIES", &libs);
            defines.set("PANEL_LIBRARIES", &libs);
        }
        None => defines.set("LLDB_ENABLE_CURSES", "OFF"),
    }

    defines.set("LLVM_ENABLE_ZSTD", "OFF");
    defines.set("LLDB_INCLUDE_TESTS", "OFF");
}

/// Flags propagated into the runtimes sub-build for each host triple.
const RUNTIMES_PASSTHROUGH: &[&str] = &[
    "CMAKE_C_FLAGS",
    "CMAKE_CXX_FLAGS",
    "CMAKE_SHARED_LINKER_FLAGS",
    "CMAKE_EXE_LINKER_FLAGS",
    "CMAKE_MODULE_LINKER_FLAGS",
    "LLVM_ENABLE_LIBCXX",
];

/// Defines for a full LLVM build.
pub fn project_defines<B: LlvmProject + ?Sized>(b: &B, cx: &ActiveConfig<'_>) -> Result<Defines> {
    let mut defines = base_defines(b, cx)?;

    defines.set("LLVM_ENABLE_PROJECTS", joined(&b.llvm_projects()));
    defines.set("LLVM_ENABLE_RUNTIMES", joined(&b.llvm_runtimes()));
    defines.set("LLVM_TARGETS_TO_BUILD", joined(&b.llvm_targets()));
    defines.set("LLVM_BUILD_LLVM_DYLIB", "ON");
    defines.set("LLVM_BUILD_RUNTIME", "ON");
    defines.set("LLVM_INCLUDE_GO_TESTS", "OFF");
    defines.set("LLVM_ENABLE_BINDINGS", "OFF");

    if let Some(lldb) = b.lldb() {
        set_lldb_defines(&mut defines, lldb);
    }

    defines.set("CLANG_DEFAULT_LINKER", "lld");
    defines.set("CLANG_DEFAULT_OBJCOPY", "llvm-objcopy");

    let vendor = &cx.ctx.vendor;
    defines.set("CLANG_REPOSITORY_STRING", vendor.repository_string());
    defines.set("TOOLCHAIN_REVISION_STRING", &vendor.svn_revision);

    if cx.config.target_os() == TargetOs::Linux {
        let triple = cx.config.llvm_triple();
        defines.set("LLVM_RUNTIME_TARGETS", &triple);
        for key in RUNTIMES_PASSTHROUGH {
            if let Some(value) = defines.get(key).map(str::to_string) {
                defines.set(format!("RUNTIMES_{}_{}", triple, key), value);
            }
        }
        let runtime = |key: &str| format!("RUNTIMES_{}_{}", triple, key);

        // no dependency on the host libatomic
        defines.set(runtime("LIBCXX_HAS_ATOMIC_LIB"), "NO");
        // libc++.so as a symlink with libc++abi linked in statically
        defines.set(runtime("LIBCXX_ENABLE_ABI_LINKER_SCRIPT"), "OFF");
        defines.set(runtime("LIBCXX_ENABLE_STATIC_ABI_LIBRARY"), "ON");

        let cxx_flags = defines.get("CMAKE_CXX_FLAGS").unwrap_or_default().to_string();
        let exe_flags = defines
            .get("CMAKE_EXE_LINKER_FLAGS")
            .unwrap_or_default()
            .to_string();
        defines.set(runtime("LIBCXX_TEST_COMPILER_FLAGS"), cxx_flags);
        defines.set(runtime("LIBCXX_TEST_LINKER_FLAGS"), exe_flags);
        defines.set(runtime("SANITIZER_ALLOW_CXXABI"), "OFF");
    }

    Ok(defines)
}

/// Host-built tools load the LLDB dependencies from `<output>/lib`, so they
/// must be in place before the build starts.
pub fn build_config<B: LlvmProject + ?Sized>(b: &B, cx: &ActiveConfig<'_>) -> Result<()> {
    if cx.config.target_os() == TargetOs::Linux {
        let output_dir = b.output_dir(cx);
        ensure_dir(&output_dir.join("bin"))?;
        if let Some(lldb) = b.lldb() {
            lldb.install_into(&output_dir.join("lib"))?;
        }
    }
    cmake::build_config(b, cx)
}

/// `ninja install`, then ship the LLDB dependencies next to the tools.
pub fn install_config<B: LlvmProject + ?Sized>(b: &B, cx: &ActiveConfig<'_>) -> Result<()> {
    cmake::install_config(b, cx)?;

    let install_dir = b.install_dir(cx)?;
    if let Some(lldb) = b.lldb() {
        if lldb.swig.is_some() {
            let python = cx.paths().python_dir();
            if python.is_dir() {
                copy_dir_all(&python, &install_dir.join("python3"))?;
            }
        }
        lldb.install_into(&install_dir.join("lib"))?;
    }
    Ok(())
}
