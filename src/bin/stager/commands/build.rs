//! `stager build` command

use anyhow::Result;

use super::GlobalArgs;
use crate::cli::BuildArgs;
use stager::ops::pipeline::{self, PipelineOptions};

pub fn execute(global: &GlobalArgs, args: BuildArgs) -> Result<()> {
    let opts = PipelineOptions {
        build: args.build,
        skip: args.skip,
        skip_build: args.skip_build,
        skip_runtimes: args.skip_runtimes,
        skip_package: args.skip_package,
        strip: !args.no_strip,
        lto: !args.no_lto,
        debug: args.debug,
        enable_assertions: args.enable_assertions,
        build_instrumented: args.build_instrumented,
        check_pgo_profile: args.check_pgo_profile,
        build_lldb: args.build_lldb,
        no_build: args.no_build,
        build_name: args.build_name,
    };

    let ctx = global
        .context(args.jobs)?
        .with_registry(pipeline::registry_from(&opts));
    let report = pipeline::run(&ctx, &opts)?;

    let built = report.built();
    if built.is_empty() {
        tracing::info!("Nothing was built");
    } else {
        tracing::info!("Built {}", built.join(", "));
    }
    if let Some(archive) = &report.archive {
        tracing::info!("Package: {}", archive.display());
    }

    Ok(())
}
