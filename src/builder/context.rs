//! Build context - paths, process runner, vendor stamp and builder gate.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::builder::registry::BuilderRegistry;
use crate::core::config::{Arch, Configuration};
use crate::core::version::VendorInfo;
use crate::util::config::{Config, Paths};
use crate::util::process::{CommandRunner, SystemRunner};

/// Process-wide state shared by every builder in a pipeline run.
///
/// Configured once before the first builder runs and read-only afterwards.
#[derive(Clone)]
pub struct BuildContext {
    /// Filesystem layout
    pub paths: Arc<Paths>,

    /// Runs every external tool
    pub runner: Arc<dyn CommandRunner>,

    /// Which builders actually execute
    pub registry: BuilderRegistry,

    /// Vendor identity stamped into LLVM builds
    pub vendor: VendorInfo,

    /// Parallel compile jobs (defaults to the CPU count)
    pub jobs: Option<usize>,

    /// Parallel link jobs
    pub link_jobs: Option<usize>,
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("paths", &self.paths)
            .field("registry", &self.registry)
            .field("vendor", &self.vendor)
            .field("jobs", &self.jobs)
            .field("link_jobs", &self.link_jobs)
            .finish_non_exhaustive()
    }
}

impl BuildContext {
    /// Create a context that runs commands on the real system.
    pub fn new(paths: Paths, config: &Config) -> Self {
        BuildContext {
            paths: Arc::new(paths),
            runner: Arc::new(SystemRunner),
            registry: BuilderRegistry::new(),
            vendor: config.vendor.to_vendor_info(),
            jobs: config.build.jobs,
            link_jobs: config.build.link_jobs,
        }
    }

    /// Replace the command runner.
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Replace the builder gate.
    pub fn with_registry(mut self, registry: BuilderRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    /// Compile jobs handed to the build tools.
    pub fn num_jobs(&self) -> usize {
        self.jobs.unwrap_or_else(num_cpus::get)
    }
}

/// The configuration a builder is currently working on.
///
/// Flag and define resolution only happens through this handle, so it is
/// impossible to ask for flags with no configuration active.
#[derive(Debug, Clone, Copy)]
pub struct ActiveConfig<'a> {
    pub ctx: &'a BuildContext,
    pub config: &'a Configuration,
    /// Position in the builder's configuration list.
    pub index: usize,
}

impl<'a> ActiveConfig<'a> {
    pub fn new(ctx: &'a BuildContext, config: &'a Configuration, index: usize) -> Self {
        ActiveConfig { ctx, config, index }
    }

    pub fn paths(&self) -> &'a Paths {
        &self.ctx.paths
    }

    pub fn arch(&self) -> Arch {
        self.config.target_arch()
    }

    pub fn out_dir(&self) -> &'a Path {
        &self.ctx.paths.out_dir
    }
}
