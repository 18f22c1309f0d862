//! Toolchain references.
//!
//! A [`ToolchainRef`] is a read-only handle to a compiler install tree,
//! either the bootstrap prebuilt or the output of a finished stage. Tool
//! accessors only join paths; nothing is checked until a tool is run.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};

use crate::core::errors::BuildError;
use crate::core::version::ClangVersion;
use crate::util::config::Paths;

/// Handle to a compiler install tree.
#[derive(Debug)]
pub struct ToolchainRef {
    install_path: PathBuf,
    output_path: Option<PathBuf>,
    version: OnceLock<ClangVersion>,
}

impl ToolchainRef {
    /// Reference an install tree. `output_path` is the build directory that
    /// produced it, consulted for generated headers.
    pub fn from_install_path(install_path: impl Into<PathBuf>, output_path: Option<PathBuf>) -> Self {
        ToolchainRef {
            install_path: install_path.into(),
            output_path,
            version: OnceLock::new(),
        }
    }

    /// The bootstrap toolchain this codebase did not build itself.
    pub fn prebuilt(paths: &Paths) -> Self {
        Self::from_install_path(&paths.clang_prebuilt, None)
    }

    pub fn install_path(&self) -> &Path {
        &self.install_path
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.install_path.join("bin")
    }

    fn bin(&self, name: &str) -> PathBuf {
        self.bin_dir().join(name)
    }

    pub fn cc(&self) -> PathBuf {
        self.bin("clang")
    }

    pub fn cxx(&self) -> PathBuf {
        self.bin("clang++")
    }

    pub fn ar(&self) -> PathBuf {
        self.bin("llvm-ar")
    }

    pub fn nm(&self) -> PathBuf {
        self.bin("llvm-nm")
    }

    pub fn objcopy(&self) -> PathBuf {
        self.bin("llvm-objcopy")
    }

    pub fn objdump(&self) -> PathBuf {
        self.bin("llvm-objdump")
    }

    pub fn ranlib(&self) -> PathBuf {
        self.bin("llvm-ranlib")
    }

    pub fn readelf(&self) -> PathBuf {
        self.bin("llvm-readelf")
    }

    pub fn strip(&self) -> PathBuf {
        self.bin("llvm-strip")
    }

    pub fn addr2line(&self) -> PathBuf {
        self.bin("llvm-addr2line")
    }

    pub fn lld(&self) -> PathBuf {
        self.bin("ld.lld")
    }

    pub fn llvm_config(&self) -> PathBuf {
        self.bin("llvm-config")
    }

    pub fn llvm_profdata(&self) -> PathBuf {
        self.bin("llvm-profdata")
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.install_path.join("lib64")
    }

    pub fn include_dir(&self) -> PathBuf {
        self.install_path.join("include")
    }

    /// `lib64/clang/<X.Y.Z>`
    pub fn clang_lib_dir(&self) -> Result<PathBuf> {
        let version = self.version()?;
        Ok(self.lib_dir().join("clang").join(version.long_version()))
    }

    /// Directory holding per-arch runtime libraries.
    pub fn resource_dir(&self) -> Result<PathBuf> {
        Ok(self.clang_lib_dir()?.join("lib").join("linux"))
    }

    /// Clang version, parsed on first access and cached afterwards.
    pub fn version(&self) -> Result<&ClangVersion> {
        if let Some(version) = self.version.get() {
            return Ok(version);
        }
        let parsed = self.read_version()?;
        Ok(self.version.get_or_init(|| parsed))
    }

    fn read_version(&self) -> Result<ClangVersion> {
        let header = Path::new("include/clang/Basic/Version.inc");
        let installed = self.install_path.join(header);
        if installed.is_file() {
            return ClangVersion::from_version_inc(&installed);
        }
        if let Some(output) = &self.output_path {
            let generated = output.join("tools/clang").join(header);
            if generated.is_file() {
                return ClangVersion::from_version_inc(&generated);
            }
        }

        // Prebuilt trees ship no headers; the resource dir is named after
        // the version.
        let clang_dir = self.lib_dir().join("clang");
        let entries = fs::read_dir(&clang_dir)
            .with_context(|| format!("failed to read {}", clang_dir.display()))?;
        let mut versions = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str().and_then(|n| n.parse().ok()));
        match (versions.next(), versions.next()) {
            (Some(version), None) => Ok(version),
            _ => Err(BuildError::InvalidVersion { path: clang_dir }.into()),
        }
    }

    /// Resolve the toolchain before a stage consumes it: the compiler must
    /// exist and the version must parse.
    pub fn validate(&self) -> Result<&ClangVersion> {
        let cc = self.cc();
        if !cc.exists() {
            return Err(BuildError::missing(cc, "compiler").into());
        }
        self.version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixtures::fake_toolchain;

    #[test]
    fn test_accessors_are_pure() {
        let a = ToolchainRef::from_install_path("/out/stage2-install", None);
        let b = ToolchainRef::from_install_path("/out/stage2-install", Some("/out/stage2".into()));

        let accessors: [fn(&ToolchainRef) -> PathBuf; 12] = [
            ToolchainRef::cc,
            ToolchainRef::cxx,
            ToolchainRef::ar,
            ToolchainRef::nm,
            ToolchainRef::objcopy,
            ToolchainRef::objdump,
            ToolchainRef::ranlib,
            ToolchainRef::readelf,
            ToolchainRef::strip,
            ToolchainRef::lld,
            ToolchainRef::llvm_config,
            ToolchainRef::lib_dir,
        ];
        for accessor in accessors {
            assert_eq!(accessor(&a), accessor(&b));
        }
        assert_eq!(a.cc(), PathBuf::from("/out/stage2-install/bin/clang"));
        assert_eq!(a.ar(), PathBuf::from("/out/stage2-install/bin/llvm-ar"));
    }

    #[test]
    fn test_version_from_header() {
        let tmp = tempfile::TempDir::new().unwrap();
        let install = fake_toolchain(tmp.path(), "12.0.5");
        let tc = ToolchainRef::from_install_path(&install, None);

        assert_eq!(tc.version().unwrap().long_version(), "12.0.5");
        assert_eq!(
            tc.resource_dir().unwrap(),
            install.join("lib64/clang/12.0.5/lib/linux")
        );
        assert!(tc.validate().is_ok());
    }

    #[test]
    fn test_version_is_cached() {
        let tmp = tempfile::TempDir::new().unwrap();
        let install = fake_toolchain(tmp.path(), "12.0.5");
        let tc = ToolchainRef::from_install_path(&install, None);
        assert_eq!(tc.version().unwrap().major(), 12);

        fs::remove_file(install.join("include/clang/Basic/Version.inc")).unwrap();
        assert_eq!(tc.version().unwrap().major(), 12);
    }

    #[test]
    fn test_version_from_build_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        let output = tmp.path().join("stage1");
        let header = output.join("tools/clang/include/clang/Basic");
        fs::create_dir_all(&header).unwrap();
        fs::write(header.join("Version.inc"), "#define CLANG_VERSION 11.0.2\n").unwrap();

        let tc = ToolchainRef::from_install_path(tmp.path().join("stage1-install"), Some(output));
        assert_eq!(tc.version().unwrap().long_version(), "11.0.2");
    }

    #[test]
    fn test_version_from_prebuilt_layout() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("lib64/clang/12.0.4")).unwrap();

        let tc = ToolchainRef::from_install_path(tmp.path(), None);
        assert_eq!(tc.version().unwrap().short_version(), "12.0");
    }

    #[test]
    fn test_validate_missing_compiler() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("lib64/clang/12.0.4")).unwrap();

        let tc = ToolchainRef::from_install_path(tmp.path(), None);
        let err = tc.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingArtifact { .. })
        ));
    }
}
