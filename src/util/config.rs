//! Configuration file support for the stager.
//!
//! Settings are read from `stager.toml` (at `--config` or the source root).
//! Every section is optional; missing values fall back to the layout of an
//! Android-style source checkout rooted at `[paths] root`.
//!
//! The `OUT_DIR` and `DIST_DIR` environment variables override the output
//! and distribution directories.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::config::Arch;
use crate::core::version::VendorInfo;

/// Default prebuilt clang directory name under `prebuilts/clang/host/linux-x86`.
pub const DEFAULT_CLANG_PREBUILT_VERSION: &str = "clang-r416183b";

/// Default NDK version under `toolchain/prebuilts/ndk`.
pub const DEFAULT_NDK_VERSION: &str = "r21";

/// Host tag used for every prebuilt directory.
pub const HOST_TAG: &str = "linux-x86";

/// Stager configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source tree and tool locations
    pub paths: PathsConfig,

    /// Vendor and version stamping
    pub vendor: VendorConfig,

    /// Build settings
    pub build: BuildConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the source checkout (defaults to the current directory)
    pub root: Option<PathBuf>,

    /// Output directory (defaults to `<root>/out`)
    pub out_dir: Option<PathBuf>,

    /// Directory receiving the packaged archive (defaults to the output directory)
    pub dist_dir: Option<PathBuf>,

    /// LLVM monorepo checkout (defaults to `<root>/toolchain/llvm-project`)
    pub llvm_project: Option<PathBuf>,

    /// Prebuilts directory (defaults to `<root>/prebuilts`)
    pub prebuilts: Option<PathBuf>,

    /// Name of the bootstrap clang under `prebuilts/clang/host/linux-x86`
    pub clang_prebuilt_version: Option<String>,

    /// NDK version under `toolchain/prebuilts/ndk`
    pub ndk_version: Option<String>,

    /// Explicit cmake binary
    pub cmake: Option<PathBuf>,

    /// Explicit ninja binary
    pub ninja: Option<PathBuf>,

    /// Explicit make binary
    pub make: Option<PathBuf>,
}

/// `[vendor]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorConfig {
    /// Vendor name stamped into PACKAGE_VENDOR and the VERSION file
    pub name: String,

    /// Repository URL stamped into PACKAGE_REPOSITORY
    pub repository: String,

    /// svn-style revision (e.g. `r416183b`)
    pub revision: String,

    /// Patch level, ignored when `llvm_next` is set
    pub patch_level: String,

    /// Whether this is an llvm-next build (no patch level)
    pub llvm_next: bool,
}

impl Default for VendorConfig {
    fn default() -> Self {
        VendorConfig {
            name: "benzoClang".to_string(),
            repository: "https://github.com/benzoClang/llvm-project".to_string(),
            revision: "r480375".to_string(),
            patch_level: "0".to_string(),
            llvm_next: true,
        }
    }
}

impl VendorConfig {
    /// Convert into the vendor stamp used by builders.
    pub fn to_vendor_info(&self) -> VendorInfo {
        VendorInfo {
            name: self.name.clone(),
            repository: self.repository.clone(),
            svn_revision: self.revision.clone(),
            patch_level: if self.llvm_next {
                None
            } else {
                Some(self.patch_level.clone())
            },
        }
    }
}

/// `[build]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Parallel compile jobs passed to LLVM (defaults to the CPU count)
    pub jobs: Option<usize>,

    /// Parallel link jobs passed to LLVM
    pub link_jobs: Option<usize>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    /// Load configuration, falling back to defaults if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("no config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }
}

/// Resolved filesystem layout.
///
/// Every builder locates its inputs and outputs through this struct; stages
/// find each other's trees purely by naming convention under `out_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub root: PathBuf,
    pub out_dir: PathBuf,
    pub dist_dir: PathBuf,
    pub llvm_project: PathBuf,
    pub prebuilts: PathBuf,
    pub clang_prebuilt: PathBuf,
    pub ndk: PathBuf,
    pub cmake: PathBuf,
    pub ninja: PathBuf,
    pub make: PathBuf,
}

impl Paths {
    /// Derive the layout from a source root with no overrides.
    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        Self::new(root, &PathsConfig::default())
    }

    /// Derive the layout from a source root and the `[paths]` section.
    pub fn new(root: impl Into<PathBuf>, cfg: &PathsConfig) -> Self {
        let root = cfg.root.clone().unwrap_or_else(|| root.into());
        let out_dir = cfg.out_dir.clone().unwrap_or_else(|| root.join("out"));
        let dist_dir = cfg.dist_dir.clone().unwrap_or_else(|| out_dir.clone());
        let llvm_project = cfg
            .llvm_project
            .clone()
            .unwrap_or_else(|| root.join("toolchain").join("llvm-project"));
        let prebuilts = cfg.prebuilts.clone().unwrap_or_else(|| root.join("prebuilts"));

        let clang_version = cfg
            .clang_prebuilt_version
            .as_deref()
            .unwrap_or(DEFAULT_CLANG_PREBUILT_VERSION);
        let clang_prebuilt = prebuilts
            .join("clang")
            .join("host")
            .join(HOST_TAG)
            .join(clang_version);

        let ndk_version = cfg.ndk_version.as_deref().unwrap_or(DEFAULT_NDK_VERSION);
        let ndk = root
            .join("toolchain")
            .join("prebuilts")
            .join("ndk")
            .join(ndk_version);

        let cmake_bin = prebuilts.join("cmake").join(HOST_TAG).join("bin");
        let cmake = cfg.cmake.clone().unwrap_or_else(|| cmake_bin.join("cmake"));
        let ninja = cfg.ninja.clone().unwrap_or_else(|| cmake_bin.join("ninja"));
        let make = cfg.make.clone().unwrap_or_else(|| {
            prebuilts
                .join("build-tools")
                .join(HOST_TAG)
                .join("bin")
                .join("make")
        });

        Paths {
            root,
            out_dir,
            dist_dir,
            llvm_project,
            prebuilts,
            clang_prebuilt,
            ndk,
            cmake,
            ninja,
            make,
        }
    }

    /// Apply `OUT_DIR` / `DIST_DIR` environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(out) = std::env::var("OUT_DIR") {
            if !out.is_empty() {
                // dist follows out unless it was set separately
                if self.dist_dir == self.out_dir {
                    self.dist_dir = PathBuf::from(&out);
                }
                self.out_dir = PathBuf::from(out);
            }
        }
        if let Ok(dist) = std::env::var("DIST_DIR") {
            if !dist.is_empty() {
                self.dist_dir = PathBuf::from(dist);
            }
        }
        self
    }

    /// Fall back to `PATH` lookups for build tools missing from prebuilts.
    pub fn with_host_tools(mut self) -> Self {
        for (path, name) in [
            (&mut self.cmake, "cmake"),
            (&mut self.ninja, "ninja"),
            (&mut self.make, "make"),
        ] {
            if !path.exists() {
                if let Ok(found) = which::which(name) {
                    tracing::debug!("using {} from PATH: {}", name, found.display());
                    *path = found;
                }
            }
        }
        self
    }

    /// Path inside the LLVM monorepo.
    pub fn llvm_path(&self, sub: impl AsRef<Path>) -> PathBuf {
        self.llvm_project.join(sub)
    }

    /// Path under the `toolchain/` checkout (swig, libedit, ...).
    pub fn toolchain_path(&self, sub: impl AsRef<Path>) -> PathBuf {
        self.root.join("toolchain").join(sub)
    }

    /// Directory holding per-library intermediate trees.
    pub fn lib_out_dir(&self) -> PathBuf {
        self.out_dir.join("lib")
    }

    /// Sysroot assembled for an Android architecture.
    pub fn sysroot(&self, arch: Arch, platform: bool) -> PathBuf {
        let kind = if platform { "platform" } else { "ndk" };
        self.out_dir.join("sysroots").join(kind).join(arch.ndk_arch())
    }

    /// NDK prebuilt sysroot the Android sysroots are assembled from.
    pub fn ndk_sysroot(&self) -> PathBuf {
        self.ndk
            .join("toolchains")
            .join("llvm")
            .join("prebuilt")
            .join("linux-x86_64")
            .join("sysroot")
    }

    /// Root of the host GCC toolchain used for glibc headers and crt objects.
    pub fn gcc_root(&self) -> PathBuf {
        self.prebuilts
            .join("gcc")
            .join(HOST_TAG)
            .join("host")
            .join("x86_64-linux-glibc2.17-4.8")
    }

    /// Host sysroot shipped with the GCC prebuilt.
    pub fn host_sysroot(&self) -> PathBuf {
        self.gcc_root().join("sysroot")
    }

    /// Python prebuilt root.
    pub fn python_dir(&self) -> PathBuf {
        self.prebuilts.join("python").join(HOST_TAG)
    }

    /// Python interpreter used by LLVM's CMake.
    pub fn python_executable(&self) -> PathBuf {
        self.python_dir().join("bin").join("python3.9")
    }

    /// Python headers for LLDB bindings.
    pub fn python_include_dir(&self) -> PathBuf {
        self.python_dir().join("include").join("python3.9")
    }

    /// Python shared library for LLDB bindings.
    pub fn python_lib(&self) -> PathBuf {
        self.python_dir().join("lib").join("libpython3.9.so")
    }

    /// PGO profile for a revision, if one is checked in.
    pub fn pgo_profile(&self, profdata_name: &str) -> Option<PathBuf> {
        let profile = self
            .prebuilts
            .join("clang")
            .join("host")
            .join(HOST_TAG)
            .join("profiles")
            .join(profdata_name);
        profile.exists().then_some(profile)
    }
}
