//! Target configurations.
//!
//! A [`Configuration`] describes one target a builder compiles for: OS,
//! architecture, API level, sysroot and the base compiler/linker flags that
//! target always needs. Builders fan out over a list of configurations, one
//! per architecture and platform variant.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::builder::toolchain::ToolchainRef;
use crate::core::errors::BuildError;
use crate::util::config::Paths;

/// Variant discriminators attached to a configuration (e.g. `is_shared`).
pub type ExtraConfig = BTreeMap<String, toml::Value>;

/// Target CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Arch {
    Arm,
    Aarch64,
    X86,
    X86_64,
}

impl Arch {
    /// Every device architecture, in enumeration order.
    pub const ALL: [Arch; 4] = [Arch::Arm, Arch::Aarch64, Arch::X86, Arch::X86_64];

    /// Canonical name, also used as the CMake system processor.
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Arm => "arm",
            Arch::Aarch64 => "aarch64",
            Arch::X86 => "i386",
            Arch::X86_64 => "x86_64",
        }
    }

    /// Architecture as spelled in compiler-rt library names.
    pub fn llvm_arch(&self) -> &'static str {
        match self {
            Arch::X86 => "i686",
            other => other.as_str(),
        }
    }

    /// Architecture as spelled in NDK directory names.
    pub fn ndk_arch(&self) -> &'static str {
        match self {
            Arch::Arm => "arm",
            Arch::Aarch64 => "arm64",
            Arch::X86 => "x86",
            Arch::X86_64 => "x86_64",
        }
    }

    /// Android target triple.
    pub fn ndk_triple(&self) -> &'static str {
        match self {
            Arch::Arm => "arm-linux-androideabi",
            Arch::Aarch64 => "aarch64-linux-android",
            Arch::X86 => "i686-linux-android",
            Arch::X86_64 => "x86_64-linux-android",
        }
    }

    pub fn is_64bit(&self) -> bool {
        matches!(self, Arch::Aarch64 | Arch::X86_64)
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetOs {
    Linux,
    Android,
    Darwin,
    Windows,
}

impl TargetOs {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetOs::Linux => "linux",
            TargetOs::Android => "android",
            TargetOs::Darwin => "darwin",
            TargetOs::Windows => "windows",
        }
    }

    /// Value for `CMAKE_SYSTEM_NAME`.
    pub fn cmake_system_name(&self) -> &'static str {
        match self {
            TargetOs::Linux => "Linux",
            TargetOs::Android => "Android",
            TargetOs::Darwin => "Darwin",
            TargetOs::Windows => "Windows",
        }
    }

    /// Subdirectory of the clang resource dir holding this OS's runtimes.
    pub fn crt_dir(&self) -> &'static str {
        match self {
            TargetOs::Linux | TargetOs::Android => "linux",
            TargetOs::Darwin => "darwin",
            TargetOs::Windows => "windows",
        }
    }

    /// The OS this process is running on.
    pub fn build_host() -> TargetOs {
        if cfg!(target_os = "macos") {
            TargetOs::Darwin
        } else if cfg!(windows) {
            TargetOs::Windows
        } else {
            TargetOs::Linux
        }
    }
}

impl fmt::Display for TargetOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One build target. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    target_os: TargetOs,
    target_arch: Arch,
    api_level: u32,
    platform: bool,
    sysroot: Option<PathBuf>,
    cflags: Vec<String>,
    cxxflags: Vec<String>,
    ldflags: Vec<String>,
    cmake_defines: Vec<(String, String)>,
    env: BTreeMap<String, String>,
    output_suffix: String,
    extra: ExtraConfig,
}

impl Configuration {
    /// Android configuration for `arch`, targeting either the platform image
    /// or the NDK.
    pub fn android(paths: &Paths, arch: Arch, platform: bool) -> Self {
        let api_level = android_api(arch, platform);
        let macro_api_level = if platform { 10000 } else { api_level };

        let mut cflags = vec![
            debug_prefix_flag(&paths.root),
            format!("--target={}", arch.ndk_triple()),
            format!("-D__ANDROID_API__={}", macro_api_level),
            "-ffunction-sections".to_string(),
            "-fdata-sections".to_string(),
        ];
        match arch {
            Arch::Arm => cflags.push("-march=armv7-a".to_string()),
            Arch::X86 => cflags.push("-m32".to_string()),
            _ => {}
        }

        let mut ldflags = vec![
            "-Wl,-z,defs".to_string(),
            "-fuse-ld=lld".to_string(),
            "-Wl,--gc-sections".to_string(),
            "-Wl,--build-id=sha1".to_string(),
            "-pie".to_string(),
        ];
        if !platform {
            let libcxx_libs = paths
                .ndk_sysroot()
                .join("usr")
                .join("lib")
                .join(arch.ndk_triple());
            ldflags.push(format!("-L{}", libcxx_libs.join(api_level.to_string()).display()));
            ldflags.push(format!("-L{}", libcxx_libs.display()));
        }

        let mut output_suffix = format!("-{}", arch.as_str());
        if !platform {
            output_suffix.push_str("-ndk-cxx");
        }

        Configuration {
            target_os: TargetOs::Android,
            target_arch: arch,
            api_level,
            platform,
            sysroot: Some(paths.sysroot(arch, platform)),
            cxxflags: cflags.clone(),
            cflags,
            ldflags,
            cmake_defines: Vec::new(),
            env: BTreeMap::new(),
            output_suffix,
            extra: ExtraConfig::new(),
        }
    }

    /// Linux host configuration. Only x86 flavors are supported.
    pub fn linux(paths: &Paths, arch: Arch) -> Result<Self, BuildError> {
        match arch {
            Arch::X86_64 => Ok(Self::linux_x86(paths, false)),
            Arch::X86 => Ok(Self::linux_x86(paths, true)),
            other => Err(unsupported(TargetOs::Linux, other)),
        }
    }

    fn linux_x86(paths: &Paths, is_32_bit: bool) -> Self {
        let gcc_root = paths.gcc_root();
        let gcc_triple = "x86_64-linux";
        let gcc_version = "4.8.3";

        let cflags = vec![
            debug_prefix_flag(&paths.root),
            format!("--gcc-toolchain={}", gcc_root.display()),
            format!("-B{}", gcc_root.join(gcc_triple).join("bin").display()),
        ];

        let mut gcc_lib_dir = gcc_root.join("lib").join("gcc").join(gcc_triple).join(gcc_version);
        let mut gcc_builtin_dir = gcc_root.join(gcc_triple).join("lib64");
        if is_32_bit {
            gcc_lib_dir = gcc_lib_dir.join("32");
            gcc_builtin_dir = gcc_root.join(gcc_triple).join("lib32");
        }
        let ldflags = vec![
            format!("-B{}", gcc_lib_dir.display()),
            format!("-L{}", gcc_lib_dir.display()),
            format!("-B{}", gcc_builtin_dir.display()),
            format!("-L{}", gcc_builtin_dir.display()),
            "-fuse-ld=lld".to_string(),
        ];

        let output_suffix = if is_32_bit { "-i386" } else { "" }.to_string();

        Configuration {
            target_os: TargetOs::Linux,
            target_arch: if is_32_bit { Arch::X86 } else { Arch::X86_64 },
            api_level: 0,
            platform: false,
            sysroot: Some(paths.host_sysroot()),
            cxxflags: cflags.clone(),
            cflags,
            ldflags,
            cmake_defines: Vec::new(),
            env: BTreeMap::new(),
            output_suffix,
            extra: ExtraConfig::new(),
        }
    }

    /// Configuration for an arbitrary OS/arch pair.
    pub fn for_target(
        paths: &Paths,
        os: TargetOs,
        arch: Arch,
        platform: bool,
    ) -> Result<Self, BuildError> {
        match os {
            TargetOs::Android => Ok(Self::android(paths, arch, platform)),
            TargetOs::Linux => Self::linux(paths, arch),
            other => Err(unsupported(other, arch)),
        }
    }

    /// Attach variant discriminators. Existing keys are overwritten.
    pub fn with_extra(mut self, extra: &ExtraConfig) -> Self {
        self.extra
            .extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Append target-level CMake defines.
    pub fn with_cmake_define(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.cmake_defines.push((key.into(), value.into()));
        self
    }

    /// Set an environment variable for every tool run against this target.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn target_os(&self) -> TargetOs {
        self.target_os
    }

    pub fn target_arch(&self) -> Arch {
        self.target_arch
    }

    pub fn api_level(&self) -> u32 {
        self.api_level
    }

    /// Whether this targets the platform image rather than the NDK.
    pub fn is_platform(&self) -> bool {
        self.platform
    }

    pub fn sysroot(&self) -> Option<&Path> {
        self.sysroot.as_deref()
    }

    pub fn cflags(&self) -> &[String] {
        &self.cflags
    }

    pub fn cxxflags(&self) -> &[String] {
        &self.cxxflags
    }

    pub fn ldflags(&self) -> &[String] {
        &self.ldflags
    }

    pub fn cmake_defines(&self) -> &[(String, String)] {
        &self.cmake_defines
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Suffix appended to a builder's output directory name.
    pub fn output_suffix(&self) -> &str {
        &self.output_suffix
    }

    pub fn extra(&self) -> &ExtraConfig {
        &self.extra
    }

    /// Boolean discriminator, if present.
    pub fn extra_bool(&self, key: &str) -> Option<bool> {
        self.extra.get(key).and_then(toml::Value::as_bool)
    }

    pub fn is_cross_compiling(&self) -> bool {
        self.target_os != TargetOs::build_host()
    }

    /// LLVM target triple.
    pub fn llvm_triple(&self) -> String {
        match self.target_os {
            TargetOs::Android => self.target_arch.ndk_triple().to_string(),
            os => format!("{}-unknown-{}-gnu", self.target_arch.as_str(), os.as_str()),
        }
    }

    /// C compiler for this target.
    pub fn c_compiler(&self, toolchain: &ToolchainRef) -> PathBuf {
        toolchain.cc()
    }

    /// C++ compiler for this target.
    pub fn cxx_compiler(&self, toolchain: &ToolchainRef) -> PathBuf {
        toolchain.cxx()
    }

    /// Explicit linker, when the target needs one set.
    pub fn linker(&self, toolchain: &ToolchainRef) -> Option<PathBuf> {
        match self.target_os {
            TargetOs::Linux => Some(toolchain.lld()),
            _ => None,
        }
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.target_os, self.target_arch)?;
        if self.target_os == TargetOs::Android {
            let kind = if self.platform { "platform" } else { "ndk" };
            write!(f, " ({}, api {})", kind, self.api_level)?;
        }
        for (key, value) in &self.extra {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}

/// One Android configuration per device architecture, in [`Arch::ALL`] order.
pub fn device_configs(
    paths: &Paths,
    platform: bool,
    extra: Option<&ExtraConfig>,
) -> Vec<Configuration> {
    Arch::ALL
        .iter()
        .map(|&arch| {
            let config = Configuration::android(paths, arch, platform);
            match extra {
                Some(extra) => config.with_extra(extra),
                None => config,
            }
        })
        .collect()
}

/// The build-host configuration.
pub fn host_config(paths: &Paths) -> Configuration {
    Configuration::linux_x86(paths, false)
}

/// The 32-bit flavor of the build-host configuration.
pub fn host_config_i386(paths: &Paths) -> Configuration {
    Configuration::linux_x86(paths, true)
}

/// Build a single-entry discriminator map.
pub fn extra_flag(key: &str, value: bool) -> ExtraConfig {
    let mut extra = ExtraConfig::new();
    extra.insert(key.to_string(), toml::Value::Boolean(value));
    extra
}

fn unsupported(os: TargetOs, arch: Arch) -> BuildError {
    BuildError::UnsupportedTarget {
        os: os.to_string(),
        arch: arch.to_string(),
    }
}

fn android_api(arch: Arch, platform: bool) -> u32 {
    if platform {
        29
    } else if matches!(arch, Arch::Arm | Arch::X86) {
        16
    } else {
        21
    }
}

fn debug_prefix_flag(root: &Path) -> String {
    format!("-fdebug-prefix-map={}=", root.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> Paths {
        Paths::from_root("/src")
    }

    #[test]
    fn test_device_configs_order_is_stable() {
        let configs = device_configs(&paths(), true, None);
        let archs: Vec<Arch> = configs.iter().map(Configuration::target_arch).collect();
        assert_eq!(archs, Arch::ALL.to_vec());

        let again = device_configs(&paths(), true, None);
        assert_eq!(configs, again);
    }

    #[test]
    fn test_platform_and_ndk_differ_only_in_platform_fields() {
        let platform = device_configs(&paths(), true, None);
        let ndk = device_configs(&paths(), false, None);

        for (p, n) in platform.iter().zip(&ndk) {
            // architecture-dependent fields are shared
            assert_eq!(p.target_os(), n.target_os());
            assert_eq!(p.target_arch(), n.target_arch());
            assert_eq!(p.llvm_triple(), n.llvm_triple());
            assert!(p.cflags().contains(&format!("--target={}", p.target_arch().ndk_triple())));
            assert!(n.cflags().contains(&format!("--target={}", n.target_arch().ndk_triple())));

            // platform-dependent fields are not
            assert!(p.is_platform());
            assert!(!n.is_platform());
            assert_ne!(p.api_level(), n.api_level());
            assert_ne!(p.sysroot(), n.sysroot());
            assert_ne!(p.output_suffix(), n.output_suffix());
        }
    }

    #[test]
    fn test_extra_config_is_merged() {
        let extra = extra_flag("is_shared", true);
        let configs = device_configs(&paths(), false, Some(&extra));
        assert!(configs.iter().all(|c| c.extra_bool("is_shared") == Some(true)));
        assert!(configs.iter().all(|c| c.extra_bool("is_exported").is_none()));
    }

    #[test]
    fn test_android_api_levels() {
        let ndk = device_configs(&paths(), false, None);
        let levels: Vec<u32> = ndk.iter().map(Configuration::api_level).collect();
        assert_eq!(levels, vec![16, 21, 16, 21]);

        let platform = device_configs(&paths(), true, None);
        assert!(platform.iter().all(|c| c.api_level() == 29));
        assert!(platform[0].cflags().contains(&"-D__ANDROID_API__=10000".to_string()));
    }

    #[test]
    fn test_unsupported_targets() {
        let err = Configuration::linux(&paths(), Arch::Aarch64).unwrap_err();
        assert!(matches!(err, BuildError::UnsupportedTarget { .. }));

        let err =
            Configuration::for_target(&paths(), TargetOs::Darwin, Arch::X86_64, false).unwrap_err();
        assert_eq!(err.to_string(), "unsupported target: darwin on x86_64");
    }

    #[test]
    fn test_host_config() {
        let host = host_config(&paths());
        assert_eq!(host.target_os(), TargetOs::Linux);
        assert_eq!(host.target_arch(), Arch::X86_64);
        assert_eq!(host.output_suffix(), "");
        assert_eq!(host.llvm_triple(), "x86_64-unknown-linux-gnu");
        assert!(host.ldflags().contains(&"-fuse-ld=lld".to_string()));

        let i386 = Configuration::linux(&paths(), Arch::X86).unwrap();
        assert_eq!(i386.output_suffix(), "-i386");
        assert!(i386.ldflags().iter().any(|f| f.ends_with("/32")));
    }

    #[test]
    fn test_display() {
        let config = Configuration::android(&paths(), Arch::Aarch64, false)
            .with_extra(&extra_flag("is_shared", false));
        assert_eq!(config.to_string(), "android-aarch64 (ndk, api 21) is_shared=false");
    }
}
