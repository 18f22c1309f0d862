//! Version scripts for the shared sanitizer runtimes.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::builder::base::{Builder, BuilderCommon};
use crate::builder::context::ActiveConfig;
use crate::builder::toolchain::ToolchainRef;
use crate::core::config::{device_configs, Arch};
use crate::util::config::Paths;
use crate::util::fs::{ensure_dir, write_string};
use crate::util::process::ProcessBuilder;

/// `nm` symbol types exported through the version script.
const EXPORTED_TYPES: &[&str] = &["T", "W", "B", "i"];

pub struct AsanMapFileBuilder {
    common: BuilderCommon,
}

impl AsanMapFileBuilder {
    pub fn new(
        paths: &Paths,
        toolchain: Arc<ToolchainRef>,
        output_toolchain: Arc<ToolchainRef>,
    ) -> Self {
        AsanMapFileBuilder {
            common: BuilderCommon::new("asan-mapfile", device_configs(paths, true, None), toolchain)
                .with_output_toolchain(output_toolchain),
        }
    }

    fn write_map_file(&self, cx: &ActiveConfig<'_>, sanitizer: &str, lib_dir: &Path) -> Result<()> {
        let llvm_arch = cx.arch().llvm_arch();
        let lib = lib_dir.join(format!("libclang_rt.{}-{}-android.so", sanitizer, llvm_arch));
        let map = lib_dir.join(format!("libclang_rt.{}-{}-android.map.txt", sanitizer, llvm_arch));

        let cmd = ProcessBuilder::new(self.toolchain().nm())
            .args(["--extern-only", "--defined-only"])
            .arg(&lib);
        let symbols = cx.ctx.runner().output(&cmd)?;

        tracing::debug!("writing {}", map.display());
        write_string(&map, &render_map_file(&sanitizer.to_uppercase(), &symbols))
    }
}

impl Builder for AsanMapFileBuilder {
    fn common(&self) -> &BuilderCommon {
        &self.common
    }

    fn build_config(&self, cx: &ActiveConfig<'_>) -> Result<()> {
        // asan_test cannot be built with CMake; the platform build only
        // checks that it exists.
        let test_bin = self
            .output_toolchain()
            .install_path()
            .join("test")
            .join(cx.arch().llvm_arch())
            .join("bin");
        ensure_dir(&test_bin)?;
        let asan_test = test_bin.join("asan_test");
        if !asan_test.exists() {
            write_string(&asan_test, "")?;
        }

        let lib_dir = self.output_toolchain().resource_dir()?;
        self.write_map_file(cx, "asan", &lib_dir)?;
        self.write_map_file(cx, "ubsan_standalone", &lib_dir)?;
        if cx.arch() == Arch::Aarch64 {
            self.write_map_file(cx, "hwasan", &lib_dir)?;
        }
        Ok(())
    }
}

/// Render a version script from `nm --extern-only --defined-only` output.
pub fn render_map_file(section: &str, nm_output: &str) -> String {
    let mut out = String::from("# AUTO-GENERATED by stager. DO NOT EDIT.\n");
    out.push_str(&format!("LIBCLANG_RT_{} {{\n", section));
    out.push_str("  global:\n");
    for line in nm_output.lines() {
        let mut fields = line.splitn(3, ' ');
        let (Some(_), Some(kind), Some(name)) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        if EXPORTED_TYPES.contains(&kind) {
            out.push_str(&format!("    {};\n", name));
        }
    }
    out.push_str("  local:\n    *;\n};\n");
    out
}
