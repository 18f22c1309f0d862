//! Trim, stamp and archive a finished install tree.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::builder::context::BuildContext;
use crate::builder::toolchain::ToolchainRef;
use crate::core::errors::BuildError;
use crate::util::config::HOST_TAG;
use crate::util::fs::{copy_dir_all, ensure_dir, glob_files, remove_dir_all_if_exists, write_string};
use crate::util::process::ProcessBuilder;

/// Binaries shipped besides `clang-<major>`.
const NECESSARY_BINARIES: &[&str] = &[
    "clang",
    "clang++",
    "clang-check",
    "clang-cl",
    "clang-format",
    "clang-tidy",
    "dsymutil",
    "git-clang-format",
    "ld.lld",
    "ld64.lld",
    "lld",
    "lld-link",
    "llvm-addr2line",
    "llvm-ar",
    "llvm-as",
    "llvm-cfi-verify",
    "llvm-config",
    "llvm-cov",
    "llvm-dis",
    "llvm-lib",
    "llvm-link",
    "llvm-modextract",
    "llvm-nm",
    "llvm-objcopy",
    "llvm-objdump",
    "llvm-profdata",
    "llvm-ranlib",
    "llvm-rc",
    "llvm-readelf",
    "llvm-readobj",
    "llvm-size",
    "llvm-strings",
    "llvm-strip",
    "llvm-symbolizer",
    "sancov",
    "sanstats",
    "scan-build",
    "scan-view",
];

/// Shipped binaries that are scripts and must not be stripped.
const SCRIPTS: &[&str] = &["git-clang-format", "scan-build", "scan-view"];

const NECESSARY_LIBRARIES: &[&str] = &["libc++.a", "libc++abi.a"];

/// Projects whose licenses make up `NOTICE`.
const LICENSED_PROJECTS: &[&str] = &[
    "llvm",
    "compiler-rt",
    "libcxx",
    "libcxxabi",
    "openmp",
    "clang",
    "clang-tools-extra",
    "lld",
    "polly",
];

/// Where the package for `build_name` is assembled.
pub fn package_dir(ctx: &BuildContext, build_name: &str) -> PathBuf {
    ctx.paths()
        .out_dir
        .join("install")
        .join(HOST_TAG)
        .join(format!("clang-{}", build_name))
}

/// Package the stage2 install tree at `install` and return the archive path.
pub fn package_toolchain(
    ctx: &BuildContext,
    install: &Path,
    build_name: &str,
    strip: bool,
) -> Result<PathBuf> {
    let toolchain = ToolchainRef::from_install_path(install, None);
    let version = toolchain.version()?;
    let package_name = format!("clang-{}", build_name);
    let package = package_dir(ctx, build_name);

    let host_dir = ctx.paths().out_dir.join("install").join(HOST_TAG);
    remove_dir_all_if_exists(&host_dir)?;
    tracing::info!("Installing {} into {}", install.display(), package.display());
    copy_dir_all(install, &package)?;

    let mut necessary: BTreeSet<String> =
        NECESSARY_BINARIES.iter().map(|s| s.to_string()).collect();
    necessary.insert(format!("clang-{}", version.major()));

    trim_binaries(ctx, &toolchain, &package.join("bin"), &necessary, strip)?;
    trim_static_libraries(&package.join("lib64"))?;

    write_notice(ctx, &package)?;
    write_string(
        &package.join("VERSION"),
        &format!(
            "{}-{}-{}\n",
            version.long_version(),
            ctx.vendor.svn_revision,
            ctx.vendor.name
        ),
    )?;

    let dist = &ctx.paths().dist_dir;
    ensure_dir(dist)?;
    let archive = dist.join(format!("{}-{}.tar.gz", package_name, HOST_TAG));
    tracing::info!("Packaging {}", archive.display());
    create_archive(&archive, &package_name, &package)?;
    Ok(archive)
}

fn trim_binaries(
    ctx: &BuildContext,
    toolchain: &ToolchainRef,
    bin_dir: &Path,
    necessary: &BTreeSet<String>,
    strip: bool,
) -> Result<()> {
    let entries = fs::read_dir(bin_dir)
        .with_context(|| format!("failed to read directory: {}", bin_dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let ty = entry.file_type()?;
        if ty.is_dir() {
            continue;
        }

        if !necessary.contains(&name) {
            tracing::debug!("Removing {}", path.display());
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove file: {}", path.display()))?;
        } else if strip && ty.is_file() && !SCRIPTS.contains(&name.as_str()) {
            let cmd = ProcessBuilder::new(toolchain.strip()).arg(&path);
            ctx.runner().run(&cmd)?;
        }
    }

    for name in necessary {
        let path = bin_dir.join(name);
        if !path.is_file() {
            return Err(BuildError::missing(path, "binary").into());
        }
    }
    Ok(())
}

fn trim_static_libraries(lib_dir: &Path) -> Result<()> {
    if lib_dir.is_dir() {
        for entry in fs::read_dir(lib_dir)
            .with_context(|| format!("failed to read directory: {}", lib_dir.display()))?
        {
            let path = entry?.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if name.ends_with(".a") && !NECESSARY_LIBRARIES.contains(&name) {
                fs::remove_file(&path)
                    .with_context(|| format!("failed to remove file: {}", path.display()))?;
            }
        }
    }

    for name in NECESSARY_LIBRARIES {
        let path = lib_dir.join(name);
        if !path.is_file() {
            return Err(BuildError::missing(path, "library").into());
        }
    }
    Ok(())
}

/// Concatenate every sub-project's `LICENSE.*` into `NOTICE`.
fn write_notice(ctx: &BuildContext, package: &Path) -> Result<()> {
    let mut notices = Vec::new();
    for project in LICENSED_PROJECTS {
        let dir = ctx.paths().llvm_path(project);
        for license in glob_files(&dir, &["LICENSE.*".to_string()])? {
            let text = fs::read_to_string(&license)
                .with_context(|| format!("failed to read {}", license.display()))?;
            notices.push(text);
        }
    }
    write_string(&package.join("NOTICE"), &notices.join("\n"))
}

fn create_archive(archive: &Path, package_name: &str, package: &Path) -> Result<()> {
    let file = fs::File::create(archive)
        .with_context(|| format!("failed to create {}", archive.display()))?;
    let mut tar = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    tar.follow_symlinks(false);
    tar.append_dir_all(package_name, package)
        .with_context(|| format!("failed to archive {}", package.display()))?;
    tar.into_inner()?
        .finish()
        .with_context(|| format!("failed to write {}", archive.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use flate2::read::GzDecoder;

    use crate::test_support::fixtures::fake_install_tree;
    use crate::test_support::{test_context, MockExecutor};

    fn all_binaries() -> Vec<&'static str> {
        let mut bins = NECESSARY_BINARIES.to_vec();
        bins.push("clang-12");
        bins
    }

    fn install_tree(root: &Path, extra: &[&str]) -> PathBuf {
        let mut bins = all_binaries();
        bins.extend_from_slice(extra);
        let install = fake_install_tree(&root.join("out/stage2-install"), "12.0.5", &bins);
        fs::write(install.join("lib64/libLLVMCore.a"), "").unwrap();
        install
    }

    fn licenses(root: &Path) {
        for project in ["llvm", "clang"] {
            let dir = root.join("toolchain/llvm-project").join(project);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("LICENSE.TXT"), format!("{} license", project)).unwrap();
        }
    }

    #[test]
    fn test_package_trims_stamps_and_archives() {
        let tmp = tempfile::TempDir::new().unwrap();
        let exec = Arc::new(MockExecutor::new());
        let ctx = test_context(tmp.path(), Arc::clone(&exec));
        let install = install_tree(tmp.path(), &["llvm-tblgen"]);
        licenses(tmp.path());

        let archive = package_toolchain(&ctx, &install, "benzo", true).unwrap();

        let package = package_dir(&ctx, "benzo");
        assert!(!package.join("bin/llvm-tblgen").exists());
        assert!(package.join("bin/clang-12").is_file());
        assert!(!package.join("lib64/libLLVMCore.a").exists());
        assert!(package.join("lib64/libc++.a").is_file());
        // the source tree is untouched
        assert!(install.join("bin/llvm-tblgen").exists());

        assert_eq!(
            fs::read_to_string(package.join("VERSION")).unwrap(),
            "12.0.5-r480375-benzoClang\n"
        );
        assert_eq!(
            fs::read_to_string(package.join("NOTICE")).unwrap(),
            "llvm license\nclang license"
        );

        let calls = exec.calls();
        assert_eq!(calls.len(), all_binaries().len() - SCRIPTS.len());
        assert!(calls.iter().all(|c| c.starts_with(&format!(
            "{}/bin/llvm-strip",
            install.display()
        ))));
        assert!(!calls.iter().any(|c| c.ends_with("scan-build")));

        assert_eq!(
            archive,
            tmp.path().join("out/clang-benzo-linux-x86.tar.gz")
        );
        let mut tar = tar::Archive::new(GzDecoder::new(fs::File::open(&archive).unwrap()));
        let names: Vec<PathBuf> = tar
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().into_owned())
            .collect();
        assert!(names.contains(&PathBuf::from("clang-benzo/VERSION")));
        assert!(names.contains(&PathBuf::from("clang-benzo/bin/clang-12")));
    }

    #[test]
    fn test_no_strip_runs_nothing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let exec = Arc::new(MockExecutor::new());
        let ctx = test_context(tmp.path(), Arc::clone(&exec));
        let install = install_tree(tmp.path(), &[]);

        package_toolchain(&ctx, &install, "dev", false).unwrap();

        assert!(exec.calls().is_empty());
        assert_eq!(
            fs::read_to_string(package_dir(&ctx, "dev").join("NOTICE")).unwrap(),
            ""
        );
    }

    #[test]
    fn test_missing_binary_is_fatal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ctx = test_context(tmp.path(), MockExecutor::new());
        let install =
            fake_install_tree(&tmp.path().join("out/stage2-install"), "12.0.5", &["clang"]);

        let err = package_toolchain(&ctx, &install, "benzo", false).unwrap_err();
        match err.downcast_ref::<BuildError>() {
            Some(BuildError::MissingArtifact { context, .. }) => assert_eq!(context, "binary"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_strip_failure_is_fatal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let exec = Arc::new(MockExecutor::new());
        exec.fail_on("bin/llvm-ar", 1);
        let ctx = test_context(tmp.path(), Arc::clone(&exec));
        let install = install_tree(tmp.path(), &[]);

        let err = package_toolchain(&ctx, &install, "benzo", true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::ToolFailed { code: Some(1), .. })
        ));
    }
}
