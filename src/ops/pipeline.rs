//! Implementation of `stager build`.
//!
//! Stages run strictly in sequence. Each stage's install tree becomes the
//! toolchain handed to the next: prebuilt → stage1 → stage2 → runtimes →
//! package.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::builder::base::{self, BuildOutcome, Builder};
use crate::builder::context::BuildContext;
use crate::builder::libs::{self, LibNcursesBuilder, SwigBuilder};
use crate::builder::registry::BuilderRegistry;
use crate::builder::runtimes::{self, runtime_builders};
use crate::builder::stages::{Stage1Builder, Stage2Builder, Stage2Options};
use crate::builder::toolchain::ToolchainRef;
use crate::core::config::TargetOs;
use crate::core::errors::BuildError;
use crate::ops::package::package_toolchain;

/// Options for the build command.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Build only these builders
    pub build: Vec<String>,

    /// Build everything except these builders
    pub skip: Vec<String>,

    /// Build nothing; package whatever is already installed
    pub skip_build: bool,

    /// Stop after stage2
    pub skip_runtimes: bool,

    /// Leave the install tree unpackaged
    pub skip_package: bool,

    /// Strip packaged binaries
    pub strip: bool,

    /// ThinLTO for stage2
    pub lto: bool,

    /// Debug stage2 (implies no strip and no LTO)
    pub debug: bool,

    pub enable_assertions: bool,

    /// Instrumented stage2 for profile collection
    pub build_instrumented: bool,

    /// Fail if the PGO profile for this revision is missing
    pub check_pgo_profile: bool,

    /// Build LLDB and its host dependencies
    pub build_lldb: bool,

    /// Host components not to build (`linux`)
    pub no_build: Vec<String>,

    /// Name stamped into the package directory and archive
    pub build_name: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            build: Vec::new(),
            skip: Vec::new(),
            skip_build: false,
            skip_runtimes: false,
            skip_package: false,
            strip: true,
            lto: true,
            debug: false,
            enable_assertions: false,
            build_instrumented: false,
            check_pgo_profile: false,
            build_lldb: false,
            no_build: Vec::new(),
            build_name: "benzo".to_string(),
        }
    }
}

impl PipelineOptions {
    fn need_host(&self) -> bool {
        !self.no_build.iter().any(|c| c == "linux")
    }
}

/// What a pipeline run did.
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Every builder the pipeline reached, in order.
    pub outcomes: Vec<(String, BuildOutcome)>,
    /// The distributable archive, if packaging ran.
    pub archive: Option<PathBuf>,
}

impl PipelineReport {
    /// Names of the builders that actually ran.
    pub fn built(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, BuildOutcome::Built { .. }))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    fn record(&mut self, name: &str, outcome: BuildOutcome) {
        self.outcomes.push((name.to_string(), outcome));
    }
}

/// The builder gate implied by the command line.
pub fn registry_from(opts: &PipelineOptions) -> BuilderRegistry {
    let mut registry = BuilderRegistry::new();
    if opts.skip_build {
        registry.skip_all();
    } else if !opts.skip.is_empty() {
        registry.add_skips(opts.skip.iter().cloned());
    } else if !opts.build.is_empty() {
        registry.add_builds(opts.build.iter().cloned());
    }
    registry
}

/// Run the whole pipeline.
///
/// `ctx` carries the registry; use [`registry_from`] to derive it from the
/// options.
pub fn run(ctx: &BuildContext, opts: &PipelineOptions) -> Result<PipelineReport> {
    let host = TargetOs::build_host();
    if host != TargetOs::Linux {
        return Err(BuildError::UnsupportedHost {
            os: host.to_string(),
        }
        .into());
    }

    let paths = ctx.paths();
    tracing::info!(
        "Building {} {} ({}) into {}",
        ctx.vendor.name,
        ctx.vendor.svn_revision,
        opts.build_name,
        paths.out_dir.display()
    );

    let mut report = PipelineReport::default();
    let instrumented = opts.debug || opts.build_instrumented;

    let mut stage1 = Stage1Builder::new(paths, Arc::new(ToolchainRef::prebuilt(paths)));
    stage1.build_llvm_tools = instrumented;
    stage1.build_all_targets = instrumented;
    report.record(stage1.name(), base::build(&stage1, ctx)?);
    let stage1_tc = Arc::new(stage1.installed_toolchain(paths));

    let mut stage2_install = None;
    if opts.need_host() {
        let profdata_file = find_profile(ctx, opts)?;

        if ctx.registry.should_build("stage2") {
            stage1_tc.validate()?;
        }

        let lldb = if opts.build_lldb {
            Some(libs::build_lldb_deps(ctx, Arc::clone(&stage1_tc))?)
        } else {
            None
        };

        let options = Stage2Options {
            debug_build: opts.debug,
            enable_assertions: opts.enable_assertions,
            lto: opts.lto,
            build_instrumented: opts.build_instrumented,
            profdata_file,
            lldb,
        };
        let stage2 = Stage2Builder::new(paths, Arc::clone(&stage1_tc), options);
        report.record(stage2.name(), base::build(&stage2, ctx)?);
        let stage2_tc = Arc::new(stage2.installed_toolchain(paths));

        if !opts.skip_runtimes {
            // instrumented and debug compilers are too slow for the runtimes
            let runtime_tc = if instrumented {
                Arc::clone(&stage1_tc)
            } else {
                Arc::clone(&stage2_tc)
            };
            if any_runtime_enabled(ctx, &runtime_tc, &stage2_tc) {
                runtime_tc.validate()?;
                stage2_tc.validate()?;
            }
            report
                .outcomes
                .extend(runtimes::build_runtimes(ctx, &runtime_tc, &stage2_tc)?);
        }

        stage2_install = Some(stage2_tc.install_path().to_path_buf());
    }

    if !opts.skip_package {
        if let Some(install) = stage2_install {
            let strip = opts.strip && !opts.debug;
            let archive = package_toolchain(ctx, &install, &opts.build_name, strip)?;
            report.archive = Some(archive);
        }
    }

    Ok(report)
}

fn find_profile(ctx: &BuildContext, opts: &PipelineOptions) -> Result<Option<PathBuf>> {
    if opts.build_instrumented {
        return Ok(None);
    }
    let name = ctx.vendor.profdata_file_name()?;
    match ctx.paths().pgo_profile(&name) {
        Some(profile) => {
            tracing::info!("Using PGO profile {}", profile.display());
            Ok(Some(profile))
        }
        None if opts.check_pgo_profile => {
            Err(BuildError::missing(ctx.paths().prebuilts.join(&name), "PGO profile").into())
        }
        None => {
            tracing::warn!("No PGO profile {} found", name);
            Ok(None)
        }
    }
}

fn any_runtime_enabled(
    ctx: &BuildContext,
    toolchain: &Arc<ToolchainRef>,
    output_toolchain: &Arc<ToolchainRef>,
) -> bool {
    runtime_builders(ctx.paths(), toolchain, output_toolchain)
        .iter()
        .any(|b| ctx.registry.should_build(b.name()))
}

/// Every builder name the pipeline knows, in pipeline order.
pub fn builder_names(ctx: &BuildContext) -> Vec<String> {
    let prebuilt = Arc::new(ToolchainRef::prebuilt(ctx.paths()));
    let mut names = vec![
        "stage1".to_string(),
        "swig".to_string(),
        "libncurses".to_string(),
        "libedit".to_string(),
        "stage2".to_string(),
    ];
    names.extend(
        runtime_builders(ctx.paths(), &prebuilt, &prebuilt)
            .iter()
            .map(|b| b.name().to_string()),
    );
    names
}

/// Construct a builder by name the way the pipeline would, for inspection.
///
/// Stage2 and the host libraries are built with stage1; runtimes compile
/// with and install into stage2. `libedit` is absent because it cannot be
/// configured before ncurses is built.
pub fn make_builder(ctx: &BuildContext, name: &str) -> Option<Box<dyn Builder>> {
    let paths = ctx.paths();
    let stage1 = Stage1Builder::new(paths, Arc::new(ToolchainRef::prebuilt(paths)));
    let stage1_tc = Arc::new(stage1.installed_toolchain(paths));

    match name {
        "stage1" => return Some(Box::new(stage1)),
        "swig" => return Some(Box::new(SwigBuilder::new(paths, stage1_tc))),
        "libncurses" => return Some(Box::new(LibNcursesBuilder::new(paths, stage1_tc))),
        _ => {}
    }

    let stage2 = Stage2Builder::new(paths, Arc::clone(&stage1_tc), Stage2Options::default());
    let stage2_tc = Arc::new(stage2.installed_toolchain(paths));
    if name == "stage2" {
        return Some(Box::new(stage2));
    }

    runtime_builders(paths, &stage2_tc, &stage2_tc)
        .into_iter()
        .find(|b| b.name() == name)
}
