//! The builder lifecycle and the base layer of flag resolution.
//!
//! Every builder is a [`Builder`]. Flag-producing methods default to the
//! free functions in this module; more specific layers (autoconf, cmake,
//! llvm, runtime) call the layer below them explicitly and then append, so
//! the composition order of every flag list is spelled out in code.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::builder::autoconf::AutoconfBuilder;
use crate::builder::cmake::CMakeBuilder;
use crate::builder::context::{ActiveConfig, BuildContext};
use crate::builder::toolchain::ToolchainRef;
use crate::core::config::Configuration;
use crate::core::errors::BuildError;

/// State shared by every builder.
#[derive(Debug, Clone)]
pub struct BuilderCommon {
    pub name: String,
    pub configs: Vec<Configuration>,
    /// Compiler used to build.
    pub toolchain: Arc<ToolchainRef>,
    /// Toolchain whose resource tree receives installed runtimes.
    pub output_toolchain: Arc<ToolchainRef>,
}

impl BuilderCommon {
    /// The output toolchain defaults to the build toolchain.
    pub fn new(
        name: impl Into<String>,
        configs: Vec<Configuration>,
        toolchain: Arc<ToolchainRef>,
    ) -> Self {
        BuilderCommon {
            name: name.into(),
            configs,
            output_toolchain: Arc::clone(&toolchain),
            toolchain,
        }
    }

    pub fn with_output_toolchain(mut self, output_toolchain: Arc<ToolchainRef>) -> Self {
        self.output_toolchain = output_toolchain;
        self
    }
}

/// A named unit of work built once per configuration.
pub trait Builder {
    fn common(&self) -> &BuilderCommon;

    fn name(&self) -> &str {
        &self.common().name
    }

    fn configs(&self) -> &[Configuration] {
        &self.common().configs
    }

    fn toolchain(&self) -> &ToolchainRef {
        &self.common().toolchain
    }

    fn output_toolchain(&self) -> &ToolchainRef {
        &self.common().output_toolchain
    }

    /// Extra C flags, appended after the configuration's own.
    fn cflags(&self, cx: &ActiveConfig<'_>) -> Result<Vec<String>> {
        cflags(self, cx)
    }

    /// Extra C++ flags, appended after the configuration's own.
    fn cxxflags(&self, cx: &ActiveConfig<'_>) -> Result<Vec<String>> {
        cxxflags(self, cx)
    }

    /// Extra linker flags, appended after the configuration's own.
    fn ldflags(&self, cx: &ActiveConfig<'_>) -> Result<Vec<String>> {
        ldflags(self, cx)
    }

    /// Environment overrides for every tool invocation.
    fn env(&self, cx: &ActiveConfig<'_>) -> Result<BTreeMap<String, String>> {
        env(self, cx)
    }

    /// Configure, build and install the active configuration.
    fn build_config(&self, cx: &ActiveConfig<'_>) -> Result<()>;

    /// Post-processing run once after every configuration is built.
    fn install(&self, _ctx: &BuildContext) -> Result<()> {
        Ok(())
    }

    fn as_cmake(&self) -> Option<&dyn CMakeBuilder> {
        None
    }

    fn as_autoconf(&self) -> Option<&dyn AutoconfBuilder> {
        None
    }
}

/// Base C flags: none.
pub fn cflags<B: Builder + ?Sized>(_b: &B, _cx: &ActiveConfig<'_>) -> Result<Vec<String>> {
    Ok(Vec::new())
}

/// Base C++ flags: whatever the builder's C flags resolve to.
pub fn cxxflags<B: Builder + ?Sized>(b: &B, cx: &ActiveConfig<'_>) -> Result<Vec<String>> {
    b.cflags(cx)
}

/// Base linker flags. Native builds link against the toolchain's libc++.
pub fn ldflags<B: Builder + ?Sized>(b: &B, cx: &ActiveConfig<'_>) -> Result<Vec<String>> {
    let mut ldflags = Vec::new();
    if !cx.config.is_cross_compiling() {
        ldflags.push(format!("-L{}", b.toolchain().lib_dir().display()));
    }
    Ok(ldflags)
}

/// Base environment: the configuration's variables plus the prebuilt
/// python on `PATH`.
pub fn env<B: Builder + ?Sized>(
    _b: &B,
    cx: &ActiveConfig<'_>,
) -> Result<BTreeMap<String, String>> {
    let mut env = cx.config.env().clone();
    let python_bin = cx.paths().python_dir().join("bin");
    let path: Vec<String> = [
        env.get("PATH").cloned(),
        Some(python_bin.display().to_string()),
        std::env::var("PATH").ok(),
    ]
    .into_iter()
    .flatten()
    .filter(|p| !p.is_empty())
    .collect();
    env.insert("PATH".to_string(), path.join(":"));
    Ok(env)
}

/// `out/lib/<name><suffix>`, the default per-config intermediate directory.
pub fn lib_output_dir<B: Builder + ?Sized>(b: &B, cx: &ActiveConfig<'_>) -> PathBuf {
    cx.paths()
        .lib_out_dir()
        .join(format!("{}{}", b.name(), cx.config.output_suffix()))
}

/// Append `suffix` to the last component of `dir`.
pub fn sibling(dir: &std::path::Path, suffix: &str) -> PathBuf {
    let mut name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(suffix);
    dir.with_file_name(name)
}

/// Runtime directory of the build toolchain for the active OS.
pub fn resource_dir<B: Builder + ?Sized>(b: &B, cx: &ActiveConfig<'_>) -> Result<PathBuf> {
    Ok(b.toolchain()
        .clang_lib_dir()?
        .join("lib")
        .join(cx.config.target_os().crt_dir()))
}

/// Runtime directory of the output toolchain for the active OS.
pub fn output_resource_dir<B: Builder + ?Sized>(
    b: &B,
    cx: &ActiveConfig<'_>,
) -> Result<PathBuf> {
    Ok(b.output_toolchain()
        .clang_lib_dir()?
        .join("lib")
        .join(cx.config.target_os().crt_dir()))
}

/// Sysroot of the active configuration. Builders that write into the sysroot
/// cannot run against a configuration without one.
pub fn sysroot<B: Builder + ?Sized>(b: &B, cx: &ActiveConfig<'_>) -> Result<PathBuf> {
    match cx.config.sysroot() {
        Some(sysroot) => Ok(sysroot.to_path_buf()),
        None => Err(BuildError::MissingField {
            builder: b.name().to_string(),
            field: "sysroot".to_string(),
        }
        .into()),
    }
}

/// Lifecycle of one builder run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Pending,
    Building(usize),
    Installed,
}

/// What a call to [`build`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The registry filtered the builder out; nothing ran.
    Skipped,
    /// Every configuration was built and the install hook ran.
    Built { configs: usize },
}

/// Build every configuration of `builder` in order, then run its install
/// hook. Does nothing if the registry filters the builder out.
pub fn build<B: Builder + ?Sized>(builder: &B, ctx: &BuildContext) -> Result<BuildOutcome> {
    let name = builder.name();
    if !ctx.registry.should_build(name) {
        tracing::info!("Skipping {}", name);
        return Ok(BuildOutcome::Skipped);
    }

    let mut state = BuildState::Pending;
    for (index, config) in builder.configs().iter().enumerate() {
        state = advance(name, state, BuildState::Building(index));
        tracing::info!("Building {} for {}", name, config);

        let cx = ActiveConfig::new(ctx, config, index);
        builder
            .build_config(&cx)
            .with_context(|| format!("failed to build {} for {}", name, config))?;
    }

    builder
        .install(ctx)
        .with_context(|| format!("failed to install {}", name))?;
    advance(name, state, BuildState::Installed);

    Ok(BuildOutcome::Built {
        configs: builder.configs().len(),
    })
}

fn advance(name: &str, from: BuildState, to: BuildState) -> BuildState {
    tracing::debug!("{}: {:?} -> {:?}", name, from, to);
    to
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{device_configs, host_config, Arch};
    use crate::test_support::{test_context, MockExecutor};
    use crate::util::process::ProcessBuilder;
    use std::sync::Mutex;

    /// Records the configurations it was asked to build and runs one
    /// `configure <config>` command for each.
    struct Recording {
        common: BuilderCommon,
        seen: Mutex<Vec<(usize, Arch)>>,
        installed: Mutex<bool>,
    }

    impl Builder for Recording {
        fn common(&self) -> &BuilderCommon {
            &self.common
        }

        fn build_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
            self.seen.lock().unwrap().push((cx.index, cx.arch()));
            let cmd = ProcessBuilder::new("configure").arg(cx.config.to_string());
            cx.ctx.runner().run(&cmd)
        }

        fn install(&self, _ctx: &BuildContext) -> Result<()> {
            *self.installed.lock().unwrap() = true;
            Ok(())
        }
    }

    fn recording(ctx: &BuildContext) -> Recording {
        let tc = Arc::new(ToolchainRef::prebuilt(ctx.paths()));
        Recording {
            common: BuilderCommon::new("recording", device_configs(ctx.paths(), true, None), tc),
            seen: Mutex::new(Vec::new()),
            installed: Mutex::new(false),
        }
    }

    #[test]
    fn test_build_visits_configs_in_order_then_installs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ctx = test_context(tmp.path(), MockExecutor::new());
        let builder = recording(&ctx);

        let outcome = build(&builder, &ctx).unwrap();

        assert_eq!(outcome, BuildOutcome::Built { configs: 4 });
        let seen = builder.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                (0, Arch::Arm),
                (1, Arch::Aarch64),
                (2, Arch::X86),
                (3, Arch::X86_64)
            ]
        );
        assert!(*builder.installed.lock().unwrap());
    }

    #[test]
    fn test_build_aborts_on_first_failed_config() {
        let tmp = tempfile::TempDir::new().unwrap();
        let exec = Arc::new(MockExecutor::new());
        exec.fail_on("android-arm", 2);
        let ctx = test_context(tmp.path(), Arc::clone(&exec));
        let builder = recording(&ctx);

        let err = build(&builder, &ctx).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::ToolFailed { code: Some(2), .. })
        ));
        assert!(format!("{:#}", err).starts_with("failed to build recording for android-arm"));
        assert_eq!(exec.calls().len(), 1);
        assert_eq!(builder.seen.lock().unwrap().len(), 1);
        assert!(!*builder.installed.lock().unwrap());
    }

    #[test]
    fn test_filtered_builder_does_nothing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut ctx = test_context(tmp.path(), MockExecutor::new());
        ctx.registry.add_skips(["recording"]);
        let builder = recording(&ctx);

        assert_eq!(build(&builder, &ctx).unwrap(), BuildOutcome::Skipped);
        assert!(builder.seen.lock().unwrap().is_empty());
        assert!(!*builder.installed.lock().unwrap());
    }

    #[test]
    fn test_base_ldflags_only_for_native_builds() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ctx = test_context(tmp.path(), MockExecutor::new());
        let builder = recording(&ctx);

        let android = &builder.configs()[0];
        let cx = ActiveConfig::new(&ctx, android, 0);
        assert!(builder.ldflags(&cx).unwrap().is_empty());

        let host = host_config(ctx.paths());
        let cx = ActiveConfig::new(&ctx, &host, 0);
        let ldflags = builder.ldflags(&cx).unwrap();
        assert_eq!(ldflags.len(), 1);
        assert!(ldflags[0].starts_with("-L") && ldflags[0].ends_with("lib64"));
    }

    #[test]
    fn test_sibling() {
        let dir = PathBuf::from("/out/lib/libomp-aarch64-ndk-cxx");
        assert_eq!(
            sibling(&dir, "-install"),
            PathBuf::from("/out/lib/libomp-aarch64-ndk-cxx-install")
        );
    }
}
