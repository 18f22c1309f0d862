//! `stager configs` command

use anyhow::Result;

use super::GlobalArgs;
use crate::cli::ConfigsArgs;
use stager::ops::pipeline::{builder_names, make_builder};

pub fn execute(global: &GlobalArgs, args: ConfigsArgs) -> Result<()> {
    let ctx = global.context(None)?;

    let names = match args.builder {
        Some(name) => vec![name],
        None => builder_names(&ctx),
    };

    for name in names {
        let Some(builder) = make_builder(&ctx, &name) else {
            if name == "libedit" {
                println!("{}: 1 configuration (host, after libncurses)", name);
                continue;
            }
            anyhow::bail!(
                "unknown builder `{}`\n\
                 available builders: {}",
                name,
                builder_names(&ctx).join(", ")
            );
        };

        println!("{}:", builder.name());
        for (index, config) in builder.configs().iter().enumerate() {
            println!("  [{}] {}", index, config);
        }
    }

    Ok(())
}
