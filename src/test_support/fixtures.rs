//! On-disk fixtures: fake toolchain installs and NDK trees.

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::config::Arch;
use crate::util::config::Paths;

fn write(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

/// Lay down a minimal clang install at `root`: a compiler binary and a
/// `Version.inc` announcing `version` (`X.Y.Z`). Returns `root`.
pub fn fake_toolchain(root: &Path, version: &str) -> PathBuf {
    let mut parts = version.split('.');
    let major = parts.next().unwrap_or("0");
    let minor = parts.next().unwrap_or("0");
    let patch = parts.next().unwrap_or("0");

    write(&root.join("bin/clang"), "#!/bin/sh\n");
    write(
        &root.join("include/clang/Basic/Version.inc"),
        &format!(
            "#define CLANG_VERSION {version}\n\
             #define CLANG_VERSION_MAJOR {major}\n\
             #define CLANG_VERSION_MINOR {minor}\n\
             #define CLANG_VERSION_PATCHLEVEL {patch}\n"
        ),
    );
    root.to_path_buf()
}

/// Populate the NDK prebuilt sysroot the way NDK r21 lays it out, including
/// the runtime copies a sysroot build must delete. Returns the sysroot.
pub fn fake_ndk_sysroot(paths: &Paths) -> PathBuf {
    let sysroot = paths.ndk_sysroot();
    write(&sysroot.join("usr/include/stdio.h"), "");
    write(&sysroot.join("usr/include/c++/v1/vector"), "");
    write(&sysroot.join("usr/local/include/android/support.h"), "");

    for arch in Arch::ALL {
        let lib = sysroot.join("usr/lib").join(arch.ndk_triple());
        for name in [
            "libc.so",
            "libcompiler_rt-extras.a",
            "libc++abi.a",
            "libc++_static.a",
            "libc++_shared.so",
        ] {
            write(&lib.join(name), "");
        }
        if arch == Arch::Arm {
            write(&lib.join("libunwind.a"), "");
        }

        let ndk_api = if arch.is_64bit() { "21" } else { "16" };
        for api in [ndk_api, "29"] {
            for name in ["libc.a", "libc++.a", "libc++.so", "libcompiler_rt-extras.a"] {
                write(&lib.join(api).join(name), "");
            }
        }
    }
    sysroot
}

/// A prebuilt-style install tree with everything packaging expects.
pub fn fake_install_tree(root: &Path, version: &str, binaries: &[&str]) -> PathBuf {
    fake_toolchain(root, version);
    for bin in binaries {
        write(&root.join("bin").join(bin), "\x7fELF");
    }
    write(&root.join("lib64/libc++.a"), "archive");
    write(&root.join("lib64/libc++abi.a"), "archive");
    root.to_path_buf()
}
