//! CMake-style builders.
//!
//! The CMake layer turns the resolved flag lists into a full define set
//! (compilers, binutils, flags, sysroot, cross-compilation settings) and
//! drives `cmake -G Ninja`, `ninja` and `ninja install`.

use std::path::PathBuf;

use anyhow::Result;

use crate::builder::base::{lib_output_dir, sibling, Builder};
use crate::builder::context::ActiveConfig;
use crate::builder::defines::Defines;
use crate::core::config::TargetOs;
use crate::util::fs::{ensure_dir, remove_dir_all_if_exists, remove_named};
use crate::util::process::{write_invocation_script, ProcessBuilder};

/// Appended to every compile flag string; per-config flags are not all
/// used by every compile action.
const NO_UNUSED_CFLAG: &str = " -Wno-unused-command-line-argument";

/// A builder driven by CMake and Ninja.
pub trait CMakeBuilder: Builder {
    /// The CMake source directory.
    fn src_dir(&self, cx: &ActiveConfig<'_>) -> PathBuf;

    /// Intermediate build directory for the active configuration.
    fn output_dir(&self, cx: &ActiveConfig<'_>) -> PathBuf {
        output_dir(self, cx)
    }

    /// Install prefix for the active configuration.
    fn install_dir(&self, cx: &ActiveConfig<'_>) -> Result<PathBuf> {
        install_dir(self, cx)
    }

    fn cmake_defines(&self, cx: &ActiveConfig<'_>) -> Result<Defines> {
        defines(self, cx)
    }

    /// Ninja targets built before `ninja install`. Empty means the default.
    fn ninja_targets(&self) -> Vec<String> {
        Vec::new()
    }

    /// Drop `CMakeCache.txt`/`CMakeFiles` before configuring.
    fn remove_cmake_cache(&self) -> bool {
        false
    }

    /// Delete the install prefix before configuring.
    fn remove_install_dir(&self) -> bool {
        false
    }

    fn install_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
        install_config(self, cx)
    }
}

pub fn output_dir<B: CMakeBuilder + ?Sized>(b: &B, cx: &ActiveConfig<'_>) -> PathBuf {
    lib_output_dir(b, cx)
}

pub fn install_dir<B: CMakeBuilder + ?Sized>(b: &B, cx: &ActiveConfig<'_>) -> Result<PathBuf> {
    Ok(sibling(&b.output_dir(cx), "-install"))
}

/// Base CMake defines for the active configuration.
pub fn defines<B: CMakeBuilder + ?Sized>(b: &B, cx: &ActiveConfig<'_>) -> Result<Defines> {
    let config = cx.config;
    let tc = b.toolchain();

    let mut cflags = config.cflags().to_vec();
    cflags.extend(b.cflags(cx)?);
    let mut cxxflags = config.cxxflags().to_vec();
    cxxflags.extend(b.cxxflags(cx)?);
    let mut ldflags = config.ldflags().to_vec();
    ldflags.extend(b.ldflags(cx)?);
    if let Some(sysroot) = config.sysroot() {
        let flag = format!("--sysroot={}", sysroot.display());
        cflags.push(flag.clone());
        cxxflags.push(flag.clone());
        ldflags.push(flag);
    }
    let cflags_str = cflags.join(" ");
    let cxxflags_str = cxxflags.join(" ");
    let ldflags_str = ldflags.join(" ");

    let mut defines = Defines::new();
    defines.set("CMAKE_C_COMPILER", config.c_compiler(tc).display().to_string());
    defines.set("CMAKE_CXX_COMPILER", config.cxx_compiler(tc).display().to_string());

    defines.set("CMAKE_ADDR2LINE", tc.addr2line().display().to_string());
    defines.set("CMAKE_AR", tc.ar().display().to_string());
    defines.set("CMAKE_NM", tc.nm().display().to_string());
    defines.set("CMAKE_OBJCOPY", tc.objcopy().display().to_string());
    defines.set("CMAKE_OBJDUMP", tc.objdump().display().to_string());
    defines.set("CMAKE_RANLIB", tc.ranlib().display().to_string());
    defines.set("CMAKE_READELF", tc.readelf().display().to_string());
    defines.set("CMAKE_STRIP", tc.strip().display().to_string());

    defines.set("CMAKE_ASM_FLAGS", format!("{}{}", cflags_str, NO_UNUSED_CFLAG));
    defines.set("CMAKE_C_FLAGS", format!("{}{}", cflags_str, NO_UNUSED_CFLAG));
    defines.set("CMAKE_CXX_FLAGS", format!("{}{}", cxxflags_str, NO_UNUSED_CFLAG));

    defines.set("CMAKE_EXE_LINKER_FLAGS", &ldflags_str);
    defines.set("CMAKE_SHARED_LINKER_FLAGS", &ldflags_str);
    defines.set("CMAKE_MODULE_LINKER_FLAGS", &ldflags_str);

    defines.set("CMAKE_BUILD_TYPE", "Release");
    defines.set(
        "CMAKE_INSTALL_PREFIX",
        b.install_dir(cx)?.display().to_string(),
    );
    defines.set("CMAKE_MAKE_PROGRAM", cx.paths().ninja.display().to_string());

    defines.set("CMAKE_FIND_ROOT_PATH_MODE_INCLUDE", "ONLY");
    defines.set("CMAKE_FIND_ROOT_PATH_MODE_LIBRARY", "ONLY");
    defines.set("CMAKE_FIND_ROOT_PATH_MODE_PACKAGE", "ONLY");
    defines.set("CMAKE_FIND_ROOT_PATH_MODE_PROGRAM", "NEVER");

    defines.set("CMAKE_POSITION_INDEPENDENT_CODE", "ON");

    if let Some(linker) = config.linker(tc) {
        defines.set("CMAKE_LINKER", linker.display().to_string());
    }
    if let Some(sysroot) = config.sysroot() {
        defines.set("CMAKE_SYSROOT", sysroot.display().to_string());
    }
    if config.target_os() == TargetOs::Android {
        defines.set("ANDROID", "1");
        // keep CMake's own NDK handling out of the way
        defines.set("CMAKE_SYSTEM_VERSION", "1");
    }
    if config.is_cross_compiling() {
        defines.set("CMAKE_SYSTEM_NAME", config.target_os().cmake_system_name());
        defines.set("CMAKE_SYSTEM_PROCESSOR", config.target_arch().as_str());
    }
    defines.extend(config.cmake_defines().iter().cloned());

    Ok(defines)
}

/// Run `ninja` in the output directory.
pub fn ninja<B: CMakeBuilder + ?Sized>(
    b: &B,
    cx: &ActiveConfig<'_>,
    targets: &[String],
) -> Result<()> {
    let cmd = ProcessBuilder::new(&cx.paths().ninja)
        .args(targets)
        .envs(&b.env(cx)?)
        .cwd(b.output_dir(cx));
    cx.ctx.runner().run(&cmd)
}

/// Configure, build and install the active configuration.
pub fn build_config<B: CMakeBuilder + ?Sized>(b: &B, cx: &ActiveConfig<'_>) -> Result<()> {
    let output_dir = b.output_dir(cx);

    if b.remove_cmake_cache() {
        remove_named(&output_dir, &["CMakeCache.txt", "CMakeFiles"])?;
    }
    if b.remove_install_dir() {
        remove_dir_all_if_exists(&b.install_dir(cx)?)?;
    }

    let defines = b.cmake_defines(cx)?;
    let cmake = ProcessBuilder::new(&cx.paths().cmake)
        .args(["-G", "Ninja", "-Wno-dev"])
        .args(defines.to_args())
        .arg(b.src_dir(cx))
        .envs(&b.env(cx)?)
        .cwd(&output_dir);

    ensure_dir(&output_dir)?;
    write_invocation_script(&output_dir.join("cmake_invocation.sh"), &cmake)?;
    cx.ctx.runner().run(&cmake)?;

    ninja(b, cx, &b.ninja_targets())?;
    b.install_config(cx)
}

/// `ninja install`
pub fn install_config<B: CMakeBuilder + ?Sized>(b: &B, cx: &ActiveConfig<'_>) -> Result<()> {
    ninja(b, cx, &["install".to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::builder::base::BuilderCommon;
    use crate::builder::toolchain::ToolchainRef;
    use crate::core::config::{device_configs, host_config, Configuration};
    use crate::test_support::{test_context, MockExecutor};

    struct Plain {
        common: BuilderCommon,
    }

    impl Builder for Plain {
        fn common(&self) -> &BuilderCommon {
            &self.common
        }

        fn build_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
            build_config(self, cx)
        }
    }

    impl CMakeBuilder for Plain {
        fn src_dir(&self, cx: &ActiveConfig<'_>) -> PathBuf {
            cx.paths().llvm_path("plain")
        }
    }

    fn plain(configs: Vec<Configuration>) -> Plain {
        Plain {
            common: BuilderCommon::new(
                "plain",
                configs,
                Arc::new(ToolchainRef::from_install_path("/tc", None)),
            ),
        }
    }

    #[test]
    fn test_cross_defines() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ctx = test_context(tmp.path(), MockExecutor::new());
        let b = plain(device_configs(ctx.paths(), false, None));
        let cx = ActiveConfig::new(&ctx, &b.configs()[1], 1);

        let d = b.cmake_defines(&cx).unwrap();
        assert_eq!(d.get("CMAKE_C_COMPILER"), Some("/tc/bin/clang"));
        assert_eq!(d.get("CMAKE_SYSTEM_NAME"), Some("Android"));
        assert_eq!(d.get("CMAKE_SYSTEM_PROCESSOR"), Some("aarch64"));
        assert_eq!(d.get("ANDROID"), Some("1"));
        assert!(d.get("CMAKE_LINKER").is_none());

        let sysroot = ctx.paths().sysroot(crate::core::config::Arch::Aarch64, false);
        assert_eq!(d.get("CMAKE_SYSROOT"), Some(sysroot.display().to_string().as_str()));
        let c_flags = d.get("CMAKE_C_FLAGS").unwrap();
        assert!(c_flags.starts_with("-fdebug-prefix-map="));
        assert!(c_flags.contains("--target=aarch64-linux-android"));
        assert!(c_flags.ends_with("-Wno-unused-command-line-argument"));

        let install = tmp.path().join("out/lib/plain-aarch64-ndk-cxx-install");
        assert_eq!(
            d.get("CMAKE_INSTALL_PREFIX"),
            Some(install.display().to_string().as_str())
        );
    }

    #[test]
    fn test_host_defines_are_not_cross() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ctx = test_context(tmp.path(), MockExecutor::new());
        let b = plain(vec![host_config(ctx.paths())]);
        let cx = ActiveConfig::new(&ctx, &b.configs()[0], 0);

        let d = b.cmake_defines(&cx).unwrap();
        assert!(!d.contains("CMAKE_SYSTEM_NAME"));
        assert!(!d.contains("ANDROID"));
        assert_eq!(d.get("CMAKE_LINKER"), Some("/tc/bin/ld.lld"));
        assert!(d.get("CMAKE_EXE_LINKER_FLAGS").unwrap().contains("-L/tc/lib64"));
    }

    #[test]
    fn test_build_config_runs_cmake_ninja_install() {
        let tmp = tempfile::TempDir::new().unwrap();
        let exec = Arc::new(MockExecutor::new());
        let ctx = test_context(tmp.path(), Arc::clone(&exec));
        let b = plain(vec![host_config(ctx.paths())]);
        let cx = ActiveConfig::new(&ctx, &b.configs()[0], 0);

        build_config(&b, &cx).unwrap();

        let calls = exec.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[0].contains("cmake -G Ninja -Wno-dev"));
        assert!(calls[0].ends_with("toolchain/llvm-project/plain"));
        assert!(calls[1].ends_with("ninja"));
        assert!(calls[2].ends_with("ninja install"));

        let script = tmp.path().join("out/lib/plain/cmake_invocation.sh");
        assert!(script.exists());
    }

    #[test]
    fn test_configuration_defines_and_env_reach_cmake() {
        let tmp = tempfile::TempDir::new().unwrap();
        let exec = Arc::new(MockExecutor::new());
        let ctx = test_context(tmp.path(), Arc::clone(&exec));
        let config = host_config(ctx.paths())
            .with_cmake_define("LLVM_PARALLEL_LINK_JOBS", "1")
            .with_cmake_define("CMAKE_POSITION_INDEPENDENT_CODE", "OFF")
            .with_env("CCACHE_DIR", "/cache")
            .with_env("PATH", "/opt/tools/bin");
        let b = plain(vec![config]);
        let cx = ActiveConfig::new(&ctx, &b.configs()[0], 0);

        let d = b.cmake_defines(&cx).unwrap();
        assert_eq!(d.get("LLVM_PARALLEL_LINK_JOBS"), Some("1"));
        // target-level defines win over the strategy's
        assert_eq!(d.get("CMAKE_POSITION_INDEPENDENT_CODE"), Some("OFF"));

        let env = b.env(&cx).unwrap();
        assert_eq!(env.get("CCACHE_DIR").map(String::as_str), Some("/cache"));
        let python_bin = ctx.paths().python_dir().join("bin");
        assert!(env["PATH"].starts_with(&format!("/opt/tools/bin:{}", python_bin.display())));

        build_config(&b, &cx).unwrap();
        assert!(exec.calls()[0].contains("-DLLVM_PARALLEL_LINK_JOBS=1"));
        let script =
            std::fs::read_to_string(tmp.path().join("out/lib/plain/cmake_invocation.sh")).unwrap();
        assert!(script.contains("export CCACHE_DIR=\"/cache\"\n"));
        assert!(script.contains("\ncd "));
    }
}
