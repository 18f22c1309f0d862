//! Android sysroots assembled from the NDK prebuilt.
//!
//! The NDK sysroot ships copies of libraries this toolchain builds itself
//! (libunwind, the compiler-rt extras and, for the platform, libc++). Those
//! copies are deleted so the freshly built ones are picked up instead, and
//! the tree is then scanned to prove none survived.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use walkdir::WalkDir;

use crate::builder::base::{self, Builder, BuilderCommon};
use crate::builder::context::ActiveConfig;
use crate::builder::toolchain::ToolchainRef;
use crate::core::config::{device_configs, Arch};
use crate::core::errors::BuildError;
use crate::util::config::Paths;
use crate::util::fs::{
    copy_dir_all, ensure_dir, remove_dir_all_if_exists, remove_file_if_exists, write_string,
};
use crate::util::process::ProcessBuilder;

/// Symbols the platform libc++ stub must provide.
const LIBCXX_STUB: &str = "\
void __cxa_atexit() {}
void __cxa_demangle() {}
void __cxa_finalize() {}
void __dynamic_cast() {}
void _ZTIN10__cxxabiv117__class_type_infoE() {}
void _ZTIN10__cxxabiv120__si_class_type_infoE() {}
void _ZTIN10__cxxabiv121__vmi_class_type_infoE() {}
void _ZTISt9type_info() {}
";

pub struct SysrootsBuilder {
    common: BuilderCommon,
}

impl SysrootsBuilder {
    pub fn new(paths: &Paths, toolchain: Arc<ToolchainRef>) -> Self {
        let mut configs = device_configs(paths, true, None);
        configs.extend(device_configs(paths, false, None));
        SysrootsBuilder {
            common: BuilderCommon::new("sysroots", configs, toolchain),
        }
    }

    /// Copy headers and the per-triple library directory out of the NDK.
    fn copy_ndk_sysroot(&self, cx: &ActiveConfig<'_>, sysroot: &Path) -> Result<PathBuf> {
        let src = cx.paths().ndk_sysroot();
        let triple = cx.arch().ndk_triple();

        copy_dir_all(&src.join("usr/include"), &sysroot.join("usr/include"))?;
        if cx.config.is_platform() {
            remove_dir_all_if_exists(&sysroot.join("usr/include/c++"))?;
        } else {
            // android_support headers
            copy_dir_all(
                &src.join("usr/local/include"),
                &sysroot.join("usr/local/include"),
            )?;
        }

        let dest_lib = sysroot.join("usr/lib").join(triple);
        copy_dir_all(&src.join("usr/lib").join(triple), &dest_lib)?;
        Ok(dest_lib)
    }

    fn remove_prebuilt_runtimes(&self, cx: &ActiveConfig<'_>, lib_dir: &Path) -> Result<()> {
        let platform = cx.config.is_platform();

        let mut doomed = vec!["libcompiler_rt-extras.a"];
        if cx.arch() == Arch::Arm {
            doomed.push("libunwind.a");
        }
        if platform {
            doomed.extend(["libc++abi.a", "libc++_static.a", "libc++_shared.so"]);
        }
        for name in doomed {
            remove_file_if_exists(&lib_dir.join(name))?;
        }

        for api_dir in api_level_dirs(lib_dir)? {
            remove_file_if_exists(&api_dir.join("libcompiler_rt-extras.a"))?;
            if platform {
                remove_file_if_exists(&api_dir.join("libc++.a"))?;
                remove_file_if_exists(&api_dir.join("libc++.so"))?;
            }
        }
        Ok(())
    }

    /// Build a `libc++.so` exposing just the ABI symbols the platform links
    /// against.
    fn build_libcxx_stub(&self, cx: &ActiveConfig<'_>, sysroot: &Path) -> Result<()> {
        let arch = cx.arch();
        let stub_dir = cx.out_dir().join("platform_stubs").join(arch.ndk_arch());
        let source = stub_dir.join("libc++.c");
        write_string(&source, LIBCXX_STUB)?;

        let lib = if arch == Arch::X86_64 { "lib64" } else { "lib" };
        let lib_dir = sysroot.join("usr").join(lib);
        ensure_dir(&lib_dir)?;

        let cmd = ProcessBuilder::new(self.toolchain().cc())
            .arg(format!("--target={}", arch.ndk_triple()))
            .args(["-fuse-ld=lld", "-nostdlib", "-shared", "-Wl,-soname,libc++.so"])
            .arg(format!("-o{}", lib_dir.join("libc++.so").display()))
            .arg(&source);
        cx.ctx.runner().run(&cmd)
    }
}

impl Builder for SysrootsBuilder {
    fn common(&self) -> &BuilderCommon {
        &self.common
    }

    fn build_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
        let sysroot = base::sysroot(self, cx)?;
        remove_dir_all_if_exists(&sysroot)?;
        ensure_dir(&sysroot)?;

        let lib_dir = self.copy_ndk_sysroot(cx, &sysroot)?;
        self.remove_prebuilt_runtimes(cx, &lib_dir)?;
        verify_removed(&sysroot, &stale_names(cx.config.is_platform()))?;

        if cx.config.is_platform() {
            self.build_libcxx_stub(cx, &sysroot)?;
        }
        Ok(())
    }
}

/// Files that must not exist anywhere in a finished sysroot.
fn stale_names(platform: bool) -> Vec<&'static str> {
    let mut names = vec!["libcompiler_rt-extras.a", "libunwind.a"];
    if platform {
        names.extend([
            "libc++abi.a",
            "libc++_static.a",
            "libc++_shared.so",
            "libc++.a",
            "libc++.so",
        ]);
    }
    names
}

/// Numeric per-API-level subdirectories of `lib_dir`. Symlinks are skipped.
fn api_level_dirs(lib_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(lib_dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        let is_api = entry
            .file_name()
            .to_str()
            .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));
        if entry.file_type().is_dir() && is_api {
            dirs.push(entry.into_path());
        }
    }
    Ok(dirs)
}

fn verify_removed(sysroot: &Path, names: &[&str]) -> Result<()> {
    for entry in WalkDir::new(sysroot) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }
        let stale = entry.file_name().to_str().is_some_and(|n| names.contains(&n));
        if stale {
            return Err(BuildError::StaleArtifact {
                path: entry.into_path(),
            }
            .into());
        }
    }
    Ok(())
}
