//! `stager flags` command
//!
//! Prints what a builder would hand to its build system for every
//! configuration, without running anything.

use anyhow::Result;

use super::GlobalArgs;
use crate::cli::FlagsArgs;
use stager::builder::ActiveConfig;
use stager::ops::pipeline::{builder_names, make_builder};

pub fn execute(global: &GlobalArgs, args: FlagsArgs) -> Result<()> {
    let ctx = global.context(None)?;

    let builder = make_builder(&ctx, &args.builder).ok_or_else(|| {
        anyhow::anyhow!(
            "unknown builder `{}`\n\
             available builders: {}",
            args.builder,
            builder_names(&ctx).join(", ")
        )
    })?;

    for (index, config) in builder.configs().iter().enumerate() {
        let cx = ActiveConfig::new(&ctx, config, index);
        println!("# {} for {}", builder.name(), config);

        let (cflags, cxxflags) = match builder.as_autoconf() {
            Some(autoconf) => (autoconf.autoconf_cflags(&cx)?, autoconf.autoconf_cxxflags(&cx)?),
            None => (builder.cflags(&cx)?, builder.cxxflags(&cx)?),
        };
        println!("cflags:   {}", cflags.join(" "));
        println!("cxxflags: {}", cxxflags.join(" "));
        println!("ldflags:  {}", builder.ldflags(&cx)?.join(" "));

        if args.no_defines {
            continue;
        }
        if let Some(cmake) = builder.as_cmake() {
            println!("defines:");
            for (key, value) in cmake.cmake_defines(&cx)?.iter() {
                println!("  -D{}={}", key, value);
            }
        } else if let Some(autoconf) = builder.as_autoconf() {
            println!("configure: {}", autoconf.config_flags(&cx)?.join(" "));
        }
        println!();
    }

    Ok(())
}
