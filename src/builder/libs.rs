//! Host libraries and tools LLDB depends on.
//!
//! These are only built when LLDB is requested. Each one is an autoconf
//! project built for the host; the libraries additionally report where their
//! headers and shared objects ended up so the LLVM project layer can point
//! CMake at them.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use regex::Regex;

use crate::builder::autoconf::{self, AutoconfBuilder};
use crate::builder::base::{self, Builder, BuilderCommon};
use crate::builder::context::{ActiveConfig, BuildContext};
use crate::builder::llvm::LldbDeps;
use crate::builder::toolchain::ToolchainRef;
use crate::core::config::host_config;
use crate::core::errors::BuildError;
use crate::util::config::Paths;
use crate::util::process::ProcessBuilder;

/// Headers and libraries of a built host library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLib {
    pub name: String,
    pub include_dir: PathBuf,
    /// Libraries handed to the linker, in link order.
    pub link_libraries: Vec<PathBuf>,
    /// Libraries that must ship next to the tools using them.
    pub install_libraries: Vec<PathBuf>,
}

/// A host library that can describe its installed artifacts.
pub trait LibInfo: AutoconfBuilder {
    /// Library file stems, `lib` prefix included.
    fn lib_names(&self) -> Vec<&'static str>;

    fn static_lib(&self) -> bool {
        false
    }
}

/// Read the SONAME version of `<install>/lib/<name>.so`.
pub fn lib_version<B: LibInfo + ?Sized>(b: &B, cx: &ActiveConfig<'_>) -> Result<String> {
    let lib = b.install_dir(cx).join("lib").join(format!("{}.so", b.name()));
    if !lib.exists() {
        return Err(BuildError::missing(lib, "shared library").into());
    }

    let cmd = ProcessBuilder::new(b.toolchain().objdump()).arg("-p").arg(&lib);
    let output = cx.ctx.runner().output(&cmd)?;

    let pattern = format!(r"SONAME\s*{}\.so\.([0-9.]*)", regex::escape(b.name()));
    let re = Regex::new(&pattern)?;
    match re.captures(&output).and_then(|c| c.get(1)) {
        Some(version) => Ok(version.as_str().to_string()),
        None => {
            tracing::debug!("objdump output:\n{}", output);
            anyhow::bail!("cannot find SONAME of {} in objdump output", lib.display())
        }
    }
}

/// Resolve the installed artifacts for the builder's first configuration.
pub fn resolve<B: LibInfo + ?Sized>(b: &B, ctx: &BuildContext) -> Result<ResolvedLib> {
    let config = b.configs().first().ok_or_else(|| BuildError::MissingField {
        builder: b.name().to_string(),
        field: "configs".to_string(),
    })?;
    let cx = ActiveConfig::new(ctx, config, 0);
    let install_dir = b.install_dir(&cx);

    let suffix = if b.static_lib() {
        ".a".to_string()
    } else {
        format!(".so.{}", lib_version(b, &cx)?)
    };
    let link_libraries: Vec<PathBuf> = b
        .lib_names()
        .iter()
        .map(|name| install_dir.join("lib").join(format!("{}{}", name, suffix)))
        .collect();
    let install_libraries = if b.static_lib() {
        Vec::new()
    } else {
        link_libraries.clone()
    };

    Ok(ResolvedLib {
        name: b.name().to_string(),
        include_dir: install_dir.join("include"),
        link_libraries,
        install_libraries,
    })
}

/// SWIG, for LLDB's python bindings.
pub struct SwigBuilder {
    common: BuilderCommon,
}

impl SwigBuilder {
    pub fn new(paths: &Paths, toolchain: Arc<ToolchainRef>) -> Self {
        SwigBuilder {
            common: BuilderCommon::new("swig", vec![host_config(paths)], toolchain),
        }
    }

    /// The installed `swig` binary.
    pub fn executable(&self, ctx: &BuildContext) -> PathBuf {
        let cx = ActiveConfig::new(ctx, &self.configs()[0], 0);
        self.install_dir(&cx).join("bin").join("swig")
    }
}

impl Builder for SwigBuilder {
    fn common(&self) -> &BuilderCommon {
        &self.common
    }

    fn ldflags(&self, cx: &ActiveConfig<'_>) -> Result<Vec<String>> {
        let mut ldflags = base::ldflags(self, cx)?;
        // find the toolchain's libc++.so at run time
        ldflags.push(format!("-Wl,-rpath,{}", self.toolchain().lib_dir().display()));
        Ok(ldflags)
    }

    fn build_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
        autoconf::build_config(self, cx)
    }

    fn as_autoconf(&self) -> Option<&dyn AutoconfBuilder> {
        Some(self)
    }
}

impl AutoconfBuilder for SwigBuilder {
    fn src_dir(&self, cx: &ActiveConfig<'_>) -> PathBuf {
        cx.paths().toolchain_path("swig")
    }

    fn config_flags(&self, _cx: &ActiveConfig<'_>) -> Result<Vec<String>> {
        Ok(vec!["--without-pcre".to_string()])
    }
}

/// ncurses with its form and panel libraries.
pub struct LibNcursesBuilder {
    common: BuilderCommon,
}

impl LibNcursesBuilder {
    pub fn new(paths: &Paths, toolchain: Arc<ToolchainRef>) -> Self {
        LibNcursesBuilder {
            common: BuilderCommon::new("libncurses", vec![host_config(paths)], toolchain),
        }
    }
}

impl Builder for LibNcursesBuilder {
    fn common(&self) -> &BuilderCommon {
        &self.common
    }

    fn build_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
        autoconf::build_config(self, cx)
    }

    fn as_autoconf(&self) -> Option<&dyn AutoconfBuilder> {
        Some(self)
    }
}

impl AutoconfBuilder for LibNcursesBuilder {
    fn src_dir(&self, cx: &ActiveConfig<'_>) -> PathBuf {
        cx.paths().toolchain_path("ncurses")
    }

    fn config_flags(&self, _cx: &ActiveConfig<'_>) -> Result<Vec<String>> {
        Ok(vec![
            "--with-shared".to_string(),
            "--with-default-terminfo-dir=/usr/share/terminfo".to_string(),
        ])
    }
}

impl LibInfo for LibNcursesBuilder {
    fn lib_names(&self) -> Vec<&'static str> {
        vec!["libncurses", "libform", "libpanel"]
    }
}

/// libedit, built against the ncurses from [`LibNcursesBuilder`].
pub struct LibEditBuilder {
    common: BuilderCommon,
    libncurses: ResolvedLib,
}

impl LibEditBuilder {
    pub fn new(paths: &Paths, toolchain: Arc<ToolchainRef>, libncurses: ResolvedLib) -> Self {
        LibEditBuilder {
            common: BuilderCommon::new("libedit", vec![host_config(paths)], toolchain),
            libncurses,
        }
    }
}

impl Builder for LibEditBuilder {
    fn common(&self) -> &BuilderCommon {
        &self.common
    }

    fn ldflags(&self, cx: &ActiveConfig<'_>) -> Result<Vec<String>> {
        let mut ldflags = base::ldflags(self, cx)?;
        if let Some(lib_dir) = self.libncurses.link_libraries.first().and_then(|l| l.parent()) {
            ldflags.push(format!("-L{}", lib_dir.display()));
        }
        Ok(ldflags)
    }

    fn build_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
        autoconf::build_config(self, cx)
    }

    fn as_autoconf(&self) -> Option<&dyn AutoconfBuilder> {
        Some(self)
    }
}

impl AutoconfBuilder for LibEditBuilder {
    fn src_dir(&self, cx: &ActiveConfig<'_>) -> PathBuf {
        cx.paths().toolchain_path("libedit")
    }

    fn autoconf_cflags(&self, cx: &ActiveConfig<'_>) -> Result<Vec<String>> {
        let mut cflags = autoconf::cflags(self, cx)?;
        let include = &self.libncurses.include_dir;
        cflags.push(format!("-I{}", include.display()));
        cflags.push(format!("-I{}", include.join("ncurses").display()));
        Ok(cflags)
    }
}

impl LibInfo for LibEditBuilder {
    fn lib_names(&self) -> Vec<&'static str> {
        vec!["libedit"]
    }
}

/// Build swig, ncurses and libedit with `toolchain` and resolve what LLDB
/// needs from them.
pub fn build_lldb_deps(ctx: &BuildContext, toolchain: Arc<ToolchainRef>) -> Result<LldbDeps> {
    let paths = ctx.paths();

    let swig = SwigBuilder::new(paths, Arc::clone(&toolchain));
    base::build(&swig, ctx)?;

    let ncurses = LibNcursesBuilder::new(paths, Arc::clone(&toolchain));
    base::build(&ncurses, ctx)?;
    let libncurses = resolve(&ncurses, ctx)?;

    let edit = LibEditBuilder::new(paths, toolchain, libncurses.clone());
    base::build(&edit, ctx)?;
    let libedit = resolve(&edit, ctx)?;

    Ok(LldbDeps {
        swig: Some(swig.executable(ctx)),
        libedit: Some(libedit),
        libncurses: Some(libncurses),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::test_support::{test_context, MockExecutor};

    const OBJDUMP: &str = "\nDynamic Section:\n  NEEDED               libc.so.6\n  SONAME               libncurses.so.6\n";

    #[test]
    fn test_resolve_reads_soname_version() {
        let tmp = tempfile::TempDir::new().unwrap();
        let exec = Arc::new(MockExecutor::new());
        exec.expect_contains("-p", OBJDUMP);
        let ctx = test_context(tmp.path(), Arc::clone(&exec));

        let ncurses = LibNcursesBuilder::new(
            ctx.paths(),
            Arc::new(ToolchainRef::from_install_path("/tc", None)),
        );
        let lib_dir = tmp.path().join("out/lib/libncurses-install/lib");
        fs::create_dir_all(&lib_dir).unwrap();
        fs::write(lib_dir.join("libncurses.so"), "").unwrap();

        let lib = resolve(&ncurses, &ctx).unwrap();
        assert_eq!(lib.name, "libncurses");
        assert_eq!(
            lib.link_libraries,
            vec![
                lib_dir.join("libncurses.so.6"),
                lib_dir.join("libform.so.6"),
                lib_dir.join("libpanel.so.6"),
            ]
        );
        assert_eq!(lib.install_libraries, lib.link_libraries);
        assert!(lib.include_dir.ends_with("libncurses-install/include"));
        assert!(exec.calls()[0].starts_with("/tc/bin/llvm-objdump -p"));
    }

    #[test]
    fn test_missing_library_is_fatal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ctx = test_context(tmp.path(), MockExecutor::new());
        let ncurses = LibNcursesBuilder::new(
            ctx.paths(),
            Arc::new(ToolchainRef::from_install_path("/tc", None)),
        );

        let err = resolve(&ncurses, &ctx).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingArtifact { .. })
        ));
    }

    #[test]
    fn test_libedit_sees_ncurses_headers() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ctx = test_context(tmp.path(), MockExecutor::new());
        let ncurses = ResolvedLib {
            name: "libncurses".to_string(),
            include_dir: PathBuf::from("/nc/include"),
            link_libraries: vec![PathBuf::from("/nc/lib/libncurses.so.6")],
            install_libraries: Vec::new(),
        };
        let edit = LibEditBuilder::new(
            ctx.paths(),
            Arc::new(ToolchainRef::from_install_path("/tc", None)),
            ncurses,
        );
        let cx = ActiveConfig::new(&ctx, &edit.configs()[0], 0);

        let cflags = edit.autoconf_cflags(&cx).unwrap();
        assert_eq!(cflags[0], "-fPIC");
        assert!(cflags.ends_with(&["-I/nc/include".to_string(), "-I/nc/include/ncurses".to_string()]));
        assert!(edit.ldflags(&cx).unwrap().contains(&"-L/nc/lib".to_string()));
        // cxxflags follow the most specific cflags
        assert!(edit
            .autoconf_cxxflags(&cx)
            .unwrap()
            .contains(&"-I/nc/include".to_string()));
    }

    #[test]
    fn test_lib_builders_inherit_autoconf_flags() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ctx = test_context(tmp.path(), MockExecutor::new());
        let tc = Arc::new(ToolchainRef::from_install_path("/tc", None));
        let swig = SwigBuilder::new(ctx.paths(), Arc::clone(&tc));
        let ncurses = LibNcursesBuilder::new(ctx.paths(), tc);

        let builders: [&dyn AutoconfBuilder; 2] = [&swig, &ncurses];
        for builder in builders {
            let cx = ActiveConfig::new(&ctx, &builder.configs()[0], 0);
            let cflags = builder.autoconf_cflags(&cx).unwrap();
            assert!(cflags.contains(&"-fPIC".to_string()), "{}", builder.name());
            assert!(cflags.last().unwrap().starts_with("--sysroot="));
            let cxxflags = builder.autoconf_cxxflags(&cx).unwrap();
            assert_eq!(cxxflags.last().map(String::as_str), Some("-stdlib=libc++"));
        }
    }
}
