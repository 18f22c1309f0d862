//! Error taxonomy for the build orchestrator.
//!
//! Every variant is fatal. Errors propagate to the top-level driver, which
//! reports them and exits; partially written output directories are left in
//! place for inspection.

use std::path::PathBuf;

use thiserror::Error;

/// A fatal orchestration error.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The requested OS/architecture combination has no configuration.
    #[error("unsupported target: {os} on {arch}")]
    UnsupportedTarget { os: String, arch: String },

    /// A builder needed a field its configuration did not provide.
    #[error("builder `{builder}` requires configuration field `{field}`")]
    MissingField { builder: String, field: String },

    /// An external tool exited with a nonzero status.
    #[error("command failed with exit code {}: {command}", code.map_or_else(|| "<signal>".to_string(), |c| c.to_string()))]
    ToolFailed { command: String, code: Option<i32> },

    /// An external tool could not be started at all.
    #[error("failed to spawn `{command}`")]
    ToolSpawn { command: String },

    /// A file that a completed step should have produced is absent.
    #[error("required {context} not found: {}", path.display())]
    MissingArtifact { path: PathBuf, context: String },

    /// A file that a completed step should have deleted is still present.
    #[error("file should have been removed: {}", path.display())]
    StaleArtifact { path: PathBuf },

    /// The orchestrator was started on a host it cannot build from.
    #[error("building on {os} is not supported; only Linux hosts are supported")]
    UnsupportedHost { os: String },

    /// A version header could not be parsed.
    #[error("cannot determine clang version from {}", path.display())]
    InvalidVersion { path: PathBuf },

    /// A configured revision string is malformed.
    #[error("invalid svn revision: {revision}")]
    InvalidRevision { revision: String },
}

impl BuildError {
    /// Shorthand for a missing-artifact error.
    pub fn missing(path: impl Into<PathBuf>, context: impl Into<String>) -> Self {
        BuildError::MissingArtifact {
            path: path.into(),
            context: context.into(),
        }
    }
}
