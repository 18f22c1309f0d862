//! Autoconf-style builders (`configure && make && make install`).

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::builder::base::{lib_output_dir, sibling, Builder};
use crate::builder::context::ActiveConfig;
use crate::util::fs::{ensure_dir, remove_dir_all_if_exists, touch_matching, write_string};
use crate::util::process::{write_invocation_script, ProcessBuilder};

/// Generated files whose timestamps must stay newer than their inputs.
const AUTOCONF_OUTPUTS: &[&str] = &["aclocal.m4", "configure", "Makefile.am"];

/// A builder driven by a `configure` script and make.
pub trait AutoconfBuilder: Builder {
    fn src_dir(&self, cx: &ActiveConfig<'_>) -> PathBuf;

    fn output_dir(&self, cx: &ActiveConfig<'_>) -> PathBuf {
        lib_output_dir(self, cx)
    }

    fn install_dir(&self, cx: &ActiveConfig<'_>) -> PathBuf {
        sibling(&self.output_dir(cx), "-install")
    }

    /// C flags written to the `cflags` side file, on top of the
    /// configuration's own.
    fn autoconf_cflags(&self, cx: &ActiveConfig<'_>) -> Result<Vec<String>> {
        cflags(self, cx)
    }

    /// C++ flags written to the `cxxflags` side file.
    fn autoconf_cxxflags(&self, cx: &ActiveConfig<'_>) -> Result<Vec<String>> {
        cxxflags(self, cx)
    }

    /// Extra arguments to `configure`.
    fn config_flags(&self, _cx: &ActiveConfig<'_>) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn remove_install_dir(&self) -> bool {
        true
    }

    fn install_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
        install_config(self, cx)
    }
}

/// The builder's base flags plus PIC and the sysroot.
pub fn cflags<B: AutoconfBuilder + ?Sized>(b: &B, cx: &ActiveConfig<'_>) -> Result<Vec<String>> {
    let mut cflags = b.cflags(cx)?;
    cflags.push("-fPIC".to_string());
    cflags.push("-Wno-unused-command-line-argument".to_string());
    if let Some(sysroot) = cx.config.sysroot() {
        cflags.push(format!("--sysroot={}", sysroot.display()));
    }
    Ok(cflags)
}

/// The side-file C flags plus libc++.
pub fn cxxflags<B: AutoconfBuilder + ?Sized>(
    b: &B,
    cx: &ActiveConfig<'_>,
) -> Result<Vec<String>> {
    let mut cxxflags = b.autoconf_cflags(cx)?;
    cxxflags.push("-stdlib=libc++".to_string());
    Ok(cxxflags)
}

/// Keep make from rerunning autoreconf when only headers changed.
fn touch_autoconf_files(src_dir: &Path) -> Result<()> {
    touch_matching(src_dir, |path| {
        let at_top = path.parent() == Some(src_dir);
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        (at_top && AUTOCONF_OUTPUTS.contains(&name)) || name.ends_with(".in")
    })?;
    Ok(())
}

pub fn build_config<B: AutoconfBuilder + ?Sized>(b: &B, cx: &ActiveConfig<'_>) -> Result<()> {
    let output_dir = b.output_dir(cx);
    let install_dir = b.install_dir(cx);
    let src_dir = b.src_dir(cx);

    if b.remove_install_dir() {
        remove_dir_all_if_exists(&install_dir)?;
    }
    ensure_dir(&output_dir)?;
    touch_autoconf_files(&src_dir)?;

    // Flags go through response files; configure mangles quoting otherwise.
    let config = cx.config;
    let mut cflags = config.cflags().to_vec();
    cflags.extend(b.autoconf_cflags(cx)?);
    let mut cxxflags = config.cxxflags().to_vec();
    cxxflags.extend(b.autoconf_cxxflags(cx)?);
    let mut ldflags = config.ldflags().to_vec();
    ldflags.extend(b.ldflags(cx)?);

    let cflags_file = output_dir.join("cflags");
    let cxxflags_file = output_dir.join("cxxflags");
    write_string(&cflags_file, &[cflags, ldflags.clone()].concat().join(" "))?;
    write_string(&cxxflags_file, &[cxxflags, ldflags].concat().join(" "))?;

    let tc = b.toolchain();
    let mut env = b.env(cx)?;
    // CC carries the flags since autoconf's pre-checks ignore CFLAGS.
    env.insert(
        "CC".to_string(),
        format!("{} @{}", config.c_compiler(tc).display(), cflags_file.display()),
    );
    env.insert(
        "CXX".to_string(),
        format!("{} @{}", config.cxx_compiler(tc).display(), cxxflags_file.display()),
    );

    let configure = ProcessBuilder::new(src_dir.join("configure"))
        .arg(format!("--prefix={}", install_dir.display()))
        .args(b.config_flags(cx)?)
        .envs(&env)
        .cwd(&output_dir);
    write_invocation_script(&output_dir.join("config_invocation.sh"), &configure)?;
    cx.ctx.runner().run(&configure)?;

    let make = ProcessBuilder::new(&cx.paths().make)
        .arg(format!("-j{}", cx.ctx.num_jobs()))
        .envs(&b.env(cx)?)
        .cwd(&output_dir);
    cx.ctx.runner().run(&make)?;

    b.install_config(cx)
}

/// `make install`
pub fn install_config<B: AutoconfBuilder + ?Sized>(b: &B, cx: &ActiveConfig<'_>) -> Result<()> {
    let cmd = ProcessBuilder::new(&cx.paths().make)
        .arg("install")
        .envs(&b.env(cx)?)
        .cwd(b.output_dir(cx));
    cx.ctx.runner().run(&cmd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;

    use crate::builder::base::BuilderCommon;
    use crate::builder::toolchain::ToolchainRef;
    use crate::core::config::host_config;
    use crate::test_support::{test_context, MockExecutor};

    struct Tool {
        common: BuilderCommon,
    }

    impl Builder for Tool {
        fn common(&self) -> &BuilderCommon {
            &self.common
        }

        fn build_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
            build_config(self, cx)
        }
    }

    impl AutoconfBuilder for Tool {
        fn src_dir(&self, cx: &ActiveConfig<'_>) -> PathBuf {
            cx.paths().toolchain_path("tool")
        }

        fn config_flags(&self, _cx: &ActiveConfig<'_>) -> Result<Vec<String>> {
            Ok(vec!["--disable-docs".to_string()])
        }
    }

    #[test]
    fn test_cxxflags_extend_cflags() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ctx = test_context(tmp.path(), MockExecutor::new());
        let tool = Tool {
            common: BuilderCommon::new(
                "tool",
                vec![host_config(ctx.paths())],
                Arc::new(ToolchainRef::from_install_path("/tc", None)),
            ),
        };
        let cx = ActiveConfig::new(&ctx, &tool.configs()[0], 0);

        let cflags = tool.autoconf_cflags(&cx).unwrap();
        let cxxflags = tool.autoconf_cxxflags(&cx).unwrap();
        assert_eq!(cflags[0], "-fPIC");
        assert!(cflags.last().unwrap().starts_with("--sysroot="));
        assert_eq!(&cxxflags[..cflags.len()], &cflags[..]);
        assert_eq!(cxxflags.last().map(String::as_str), Some("-stdlib=libc++"));
    }

    #[test]
    fn test_build_config_sequence() {
        let tmp = tempfile::TempDir::new().unwrap();
        let exec = Arc::new(MockExecutor::new());
        let ctx = test_context(tmp.path(), Arc::clone(&exec));
        let src = ctx.paths().toolchain_path("tool");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("configure"), "#!/bin/sh\n").unwrap();

        let tool = Tool {
            common: BuilderCommon::new(
                "tool",
                vec![host_config(ctx.paths())],
                Arc::new(ToolchainRef::from_install_path("/tc", None)),
            ),
        };
        let cx = ActiveConfig::new(&ctx, &tool.configs()[0], 0);
        build_config(&tool, &cx).unwrap();

        let calls = exec.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[0].contains("configure --prefix="));
        assert!(calls[0].ends_with("--disable-docs"));
        assert!(calls[1].contains("make -j"));
        assert!(calls[2].ends_with("make install"));

        let out = tmp.path().join("out/lib/tool");
        let cflags = fs::read_to_string(out.join("cflags")).unwrap();
        assert!(cflags.contains("-fPIC"));
        assert!(cflags.contains("-fuse-ld=lld"));
        let cxxflags = fs::read_to_string(out.join("cxxflags")).unwrap();
        assert!(cxxflags.contains("-fPIC -Wno-unused-command-line-argument"));
        assert!(cxxflags.contains("-stdlib=libc++"));
        assert!(out.join("config_invocation.sh").exists());
    }
}
