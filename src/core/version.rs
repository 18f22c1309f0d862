//! Clang version and vendor stamping metadata.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use semver::Version;

use crate::core::errors::BuildError;

static VERSION_DEFINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^#define\s+(CLANG_VERSION(?:_MAJOR|_MINOR|_PATCHLEVEL)?)\s+(\S+)")
        .expect("valid regex")
});

static SVN_REVISION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^r(\d+)([a-z]\d*)?$").expect("valid regex"));

/// Version of a clang install tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClangVersion(Version);

impl ClangVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        ClangVersion(Version::new(major, minor, patch))
    }

    /// Parse a `Version.inc` header.
    ///
    /// Accepts either the split `CLANG_VERSION_MAJOR`/`_MINOR`/`_PATCHLEVEL`
    /// defines or a single `CLANG_VERSION X.Y.Z` define.
    pub fn from_version_inc(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse_header(&text).ok_or_else(|| {
            BuildError::InvalidVersion {
                path: path.to_path_buf(),
            }
            .into()
        })
    }

    fn parse_header(text: &str) -> Option<Self> {
        let (mut major, mut minor, mut patch) = (None, None, None);
        let mut combined = None;
        for caps in VERSION_DEFINE.captures_iter(text) {
            let value = &caps[2];
            match &caps[1] {
                "CLANG_VERSION_MAJOR" => major = value.parse().ok(),
                "CLANG_VERSION_MINOR" => minor = value.parse().ok(),
                "CLANG_VERSION_PATCHLEVEL" => patch = value.parse().ok(),
                _ => combined = Some(value.trim_matches('"').to_string()),
            }
        }

        match (major, minor, patch) {
            (Some(major), Some(minor), Some(patch)) => Some(Self::new(major, minor, patch)),
            _ => combined.and_then(|v| v.parse().ok()),
        }
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    /// `X.Y.Z`
    pub fn long_version(&self) -> String {
        format!("{}.{}.{}", self.0.major, self.0.minor, self.0.patch)
    }

    /// `X.Y`
    pub fn short_version(&self) -> String {
        format!("{}.{}", self.0.major, self.0.minor)
    }
}

impl std::str::FromStr for ClangVersion {
    type Err = semver::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s).map(ClangVersion)
    }
}

impl fmt::Display for ClangVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.long_version())
    }
}

/// Vendor identity stamped into the built compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorInfo {
    pub name: String,
    pub repository: String,
    /// svn-style revision, e.g. `r383902b1`.
    pub svn_revision: String,
    /// `None` for llvm-next builds.
    pub patch_level: Option<String>,
}

impl VendorInfo {
    /// Numeric part of the revision: `r383902b1` yields `383902`.
    pub fn svn_revision_number(&self) -> Result<u64, BuildError> {
        SVN_REVISION
            .captures(&self.svn_revision)
            .and_then(|caps| caps[1].parse().ok())
            .ok_or_else(|| BuildError::InvalidRevision {
                revision: self.svn_revision.clone(),
            })
    }

    /// Name of the checked-in PGO profile for this revision.
    pub fn profdata_file_name(&self) -> Result<String, BuildError> {
        Ok(format!("r{}.profdata", self.svn_revision_number()?))
    }

    /// Value for `LLVM_REPOSITORY`/`CLANG_REPOSITORY_STRING` style stamps.
    pub fn repository_string(&self) -> String {
        match &self.patch_level {
            Some(patch) => format!("{} {}, based on {}", self.repository, patch, self.svn_revision),
            None => format!("{} based on {}", self.repository, self.svn_revision),
        }
    }
}
